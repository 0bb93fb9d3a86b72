use serde::Deserialize;
use skyward_catalog::FareCalculator;
use skyward_core::booking::{Booking, BookingStatus, Passenger, PassengerDetails, TripType};
use skyward_core::clock::Clock;
use skyward_core::flight::{Flight, SeatClass};
use skyward_core::payment::Payment;
use skyward_core::repository::{BookingRepository, FlightRepository};
use skyward_core::{CoreError, CoreResult};
use skyward_shared::SeatEvent;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::events::SeatEvents;
use crate::reference::ReferenceGenerator;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    #[serde(skip)]
    pub user_id: Uuid,
    pub outbound_flight_id: Uuid,
    #[serde(default)]
    pub return_flight_id: Option<Uuid>,
    pub passengers: i32,
    pub seat_class: SeatClass,
    #[serde(default)]
    pub trip_type: TripType,
    /// Falls back to the account email when empty
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: String,
}

/// Manages booking records and their pending → confirmed → cancelled lifecycle
pub struct BookingLedger {
    bookings: Arc<dyn BookingRepository>,
    flights: Arc<dyn FlightRepository>,
    fares: FareCalculator,
    references: ReferenceGenerator,
    clock: Arc<dyn Clock>,
    events: SeatEvents,
}

impl BookingLedger {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        flights: Arc<dyn FlightRepository>,
        fares: FareCalculator,
        references: ReferenceGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            flights,
            fares,
            references,
            clock,
            events: SeatEvents::default(),
        }
    }

    pub fn with_events(mut self, events: SeatEvents) -> Self {
        self.events = events;
        self
    }

    /// Create a pending booking with its fare computed and a fresh reference
    pub async fn create(&self, req: CreateBooking) -> CoreResult<Booking> {
        if req.passengers < 1 {
            return Err(CoreError::ValidationError("At least one passenger is required".to_string()));
        }

        match (req.trip_type, req.return_flight_id) {
            (TripType::RoundTrip, None) => {
                return Err(CoreError::ValidationError(
                    "A round trip needs a return flight".to_string(),
                ))
            }
            (TripType::OneWay, Some(_)) => {
                return Err(CoreError::ValidationError(
                    "A one-way trip cannot have a return flight".to_string(),
                ))
            }
            _ => {}
        }

        let outbound = self.load_flight(req.outbound_flight_id).await?;
        let mut legs = vec![outbound];
        if let Some(return_id) = req.return_flight_id {
            legs.push(self.load_flight(return_id).await?);
        }

        for flight in &legs {
            let available = flight.available_seats(req.seat_class);
            if available < req.passengers {
                return Err(CoreError::Conflict(format!(
                    "Only {} {} seats left on {}",
                    available, req.seat_class, flight.flight_number
                )));
            }
        }

        let leg_refs: Vec<&Flight> = legs.iter().collect();
        let quote = self.fares.quote_trip(&leg_refs, req.seat_class, req.passengers)?;

        let mut booking = Booking {
            id: Uuid::new_v4(),
            reference: String::new(),
            user_id: req.user_id,
            trip_type: req.trip_type,
            outbound_flight_id: req.outbound_flight_id,
            return_flight_id: req.return_flight_id,
            seat_class: req.seat_class,
            passengers: req.passengers,
            total_amount: quote.total_amount,
            taxes: quote.taxes,
            service_fee: quote.service_fee,
            status: BookingStatus::Pending,
            contact_email: req.contact_email,
            contact_phone: req.contact_phone,
            booked_at: self.clock.now(),
            confirmed_at: None,
            cancelled_at: None,
        };

        self.references.insert_unique(&mut booking).await?;

        info!(
            "Booking {} created: {} x {} on {}, grand total {}",
            booking.reference,
            booking.passengers,
            booking.seat_class,
            legs[0].flight_number,
            booking.grand_total()
        );
        Ok(booking)
    }

    /// Record passenger details. Pending bookings only, one entry per passenger, once.
    pub async fn add_passengers(&self, booking: &Booking, details: Vec<PassengerDetails>) -> CoreResult<Vec<Passenger>> {
        if booking.status != BookingStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Passengers can only be added to a pending booking ({} is {})",
                booking.reference, booking.status
            )));
        }
        if details.len() != booking.passengers as usize {
            return Err(CoreError::ValidationError(format!(
                "Expected details for {} passengers, got {}",
                booking.passengers,
                details.len()
            )));
        }
        if let Some(missing) = details
            .iter()
            .position(|d| d.first_name.trim().is_empty() || d.last_name.trim().is_empty())
        {
            return Err(CoreError::ValidationError(format!(
                "Passenger {} needs a first and last name",
                missing + 1
            )));
        }
        if !self.bookings.list_passengers(booking.id).await?.is_empty() {
            return Err(CoreError::Conflict(format!(
                "Passengers already recorded for booking {}",
                booking.reference
            )));
        }

        let passengers: Vec<Passenger> = details
            .into_iter()
            .enumerate()
            .map(|(position, d)| Passenger::new(booking.id, position as i32, d))
            .collect();

        self.bookings.insert_passengers(&passengers).await?;
        info!("Recorded {} passengers for booking {}", passengers.len(), booking.reference);
        Ok(passengers)
    }

    /// pending → confirmed, with the payment stored and seat counters taken
    pub async fn confirm(&self, booking: &Booking, payment: &Payment) -> CoreResult<Booking> {
        let confirmed = self
            .bookings
            .confirm_booking(booking.id, payment, self.clock.now())
            .await?;

        info!(
            "Booking {} confirmed, {} {} seats taken per leg",
            confirmed.reference, confirmed.passengers, confirmed.seat_class
        );
        Ok(confirmed)
    }

    /// confirmed → cancelled, releasing every assigned seat and restoring counters
    pub async fn cancel(&self, booking: &Booking) -> CoreResult<Booking> {
        let (cancelled, released) = self.bookings.cancel_booking(booking.id, self.clock.now()).await?;

        let at = cancelled.cancelled_at.unwrap_or_else(|| self.clock.now());
        for seat in &released {
            self.events
                .publish(SeatEvent::released(seat.flight_id, &seat.seat_number, &cancelled.reference, at));
        }

        info!(
            "Booking {} cancelled, {} seats released",
            cancelled.reference,
            released.len()
        );
        Ok(cancelled)
    }

    /// Lookup scoped to the owner; other users' bookings are reported as missing.
    pub async fn find(&self, reference: &str, user_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .find_by_reference(reference, user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", reference)))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        self.bookings.list_for_user(user_id).await
    }

    pub async fn passengers(&self, booking: &Booking) -> CoreResult<Vec<Passenger>> {
        self.bookings.list_passengers(booking.id).await
    }

    pub async fn payment(&self, booking: &Booking) -> CoreResult<Option<Payment>> {
        self.bookings.find_payment(booking.id).await
    }

    async fn load_flight(&self, id: Uuid) -> CoreResult<Flight> {
        self.flights
            .get_flight(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Flight {} not found", id)))
    }
}
