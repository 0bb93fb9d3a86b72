use skyward_core::booking::{Booking, Leg, Passenger};
use skyward_core::clock::Clock;
use skyward_core::flight::Seat;
use skyward_core::repository::{BookingRepository, FlightRepository};
use skyward_core::{CoreError, CoreResult};
use skyward_shared::SeatEvent;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::SeatEvents;

/// Attaches seats to passengers and detaches them again.
///
/// The claim itself is a single repository call, so two requests racing for
/// one seat get exactly one winner and one `SeatUnavailable`.
pub struct SeatAllocator {
    bookings: Arc<dyn BookingRepository>,
    flights: Arc<dyn FlightRepository>,
    clock: Arc<dyn Clock>,
    events: SeatEvents,
}

impl SeatAllocator {
    pub fn new(bookings: Arc<dyn BookingRepository>, flights: Arc<dyn FlightRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            bookings,
            flights,
            clock,
            events: SeatEvents::default(),
        }
    }

    pub fn with_events(mut self, events: SeatEvents) -> Self {
        self.events = events;
        self
    }

    /// Outbound seat for the passenger at `passenger_index`
    pub async fn assign(&self, booking: &Booking, passenger_index: usize, seat_number: &str) -> CoreResult<Seat> {
        self.assign_leg(booking, passenger_index, Leg::Outbound, seat_number).await
    }

    pub async fn assign_leg(
        &self,
        booking: &Booking,
        passenger_index: usize,
        leg: Leg,
        seat_number: &str,
    ) -> CoreResult<Seat> {
        ensure_seats_editable(booking)?;
        let flight_id = flight_for(booking, leg)?;
        let passenger = self.passenger_at(booking, passenger_index).await?;
        let previous = passenger.seat_for(leg);

        let seat = self
            .bookings
            .assign_seat(passenger.id, leg, flight_id, seat_number)
            .await
            .inspect_err(|e| {
                if matches!(e, CoreError::SeatUnavailable(_)) {
                    warn!("Seat {} refused for booking {}", seat_number, booking.reference);
                }
            })?;

        if previous == Some(seat.id) {
            return Ok(seat);
        }

        let now = self.clock.now();
        if let Some(previous_id) = previous {
            // Reassignment freed the old seat in the same step
            let seats = self.flights.list_seats(flight_id, false).await?;
            if let Some(old) = seats.iter().find(|s| s.id == previous_id) {
                self.events
                    .publish(SeatEvent::released(flight_id, &old.seat_number, &booking.reference, now));
            }
        }
        self.events
            .publish(SeatEvent::assigned(flight_id, &seat.seat_number, &booking.reference, now));

        info!(
            "Seat {} ({}) assigned to {} on booking {}",
            seat.seat_number,
            leg.as_str(),
            passenger.full_name(),
            booking.reference
        );
        Ok(seat)
    }

    /// Frees the passenger's seat on `leg`. `None` when no seat was held.
    pub async fn release(&self, booking: &Booking, passenger_index: usize, leg: Leg) -> CoreResult<Option<Seat>> {
        let passenger = self.passenger_at(booking, passenger_index).await?;
        let released = self.bookings.release_seat(passenger.id, leg).await?;

        if let Some(seat) = &released {
            self.events.publish(SeatEvent::released(
                seat.flight_id,
                &seat.seat_number,
                &booking.reference,
                self.clock.now(),
            ));
            info!("Seat {} released on booking {}", seat.seat_number, booking.reference);
        }
        Ok(released)
    }

    /// Available seats of a flight ordered by seat number
    pub async fn available_seats(&self, flight_id: Uuid) -> CoreResult<Vec<Seat>> {
        if self.flights.get_flight(flight_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("Flight {} not found", flight_id)));
        }
        self.flights.list_seats(flight_id, true).await
    }

    async fn passenger_at(&self, booking: &Booking, index: usize) -> CoreResult<Passenger> {
        self.bookings
            .list_passengers(booking.id)
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| {
                CoreError::NotFound(format!("Passenger {} not found on booking {}", index, booking.reference))
            })
    }
}

/// Early refusal for the caller's copy. The store repeats the check under its lock.
fn ensure_seats_editable(booking: &Booking) -> CoreResult<()> {
    if booking.status.allows_seat_changes() {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Seats cannot be changed on a {} booking",
            booking.status
        )))
    }
}

fn flight_for(booking: &Booking, leg: Leg) -> CoreResult<Uuid> {
    booking.flight_for(leg).ok_or_else(|| {
        CoreError::ValidationError(format!("Booking {} has no return flight", booking.reference))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use skyward_shared::SeatEventKind;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_assign_then_release() {
        let fx = Fixture::new().await;
        let booking = fx.book_with_passengers(1).await;

        let seat = fx.seats.assign(&booking, 0, "12A").await.unwrap();
        assert!(!seat.is_available);
        assert_eq!(fx.store.seat_holders(seat.id).await.len(), 1);
        assert!(!fx.seats.available_seats(fx.flight.id).await.unwrap().iter().any(|s| s.id == seat.id));

        let released = fx.seats.release(&booking, 0, Leg::Outbound).await.unwrap().unwrap();
        assert!(released.is_available);
        assert!(fx.store.seat_holders(seat.id).await.is_empty());

        // Nothing held any more
        assert!(fx.seats.release(&booking, 0, Leg::Outbound).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_taken_seat_is_refused() {
        let fx = Fixture::new().await;
        let first = fx.book_with_passengers(1).await;
        let second = fx.book_with_passengers(1).await;

        fx.seats.assign(&first, 0, "11C").await.unwrap();
        let result = fx.seats.assign(&second, 0, "11C").await;
        assert!(matches!(result, Err(CoreError::SeatUnavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_assign_has_one_winner() {
        let fx = Fixture::new().await;
        let first = fx.book_with_passengers(1).await;
        let second = fx.book_with_passengers(1).await;
        let seats = Arc::new(fx.seats);

        let a = {
            let seats = seats.clone();
            tokio::spawn(async move { seats.assign(&first, 0, "12A").await })
        };
        let b = {
            let seats = seats.clone();
            tokio::spawn(async move { seats.assign(&second, 0, "12A").await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(CoreError::SeatUnavailable(_)))));

        let seat = fx.store.get_seat(fx.flight.id, "12A").await.unwrap().unwrap();
        assert!(!seat.is_available);
        assert_eq!(fx.store.seat_holders(seat.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reassign_publishes_release_and_assign() {
        let fx = Fixture::new().await;
        let (tx, mut rx) = broadcast::channel(16);
        let seats = SeatAllocator::new(fx.store.clone(), fx.store.clone(), fx.clock.clone())
            .with_events(SeatEvents::new(tx));
        let booking = fx.book_with_passengers(1).await;

        seats.assign(&booking, 0, "10A").await.unwrap();
        seats.assign(&booking, 0, "10B").await.unwrap();

        let kinds: Vec<(SeatEventKind, String)> = (0..3)
            .map(|_| rx.try_recv().unwrap())
            .map(|e| (e.kind, e.seat_number))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (SeatEventKind::Assigned, "10A".to_string()),
                (SeatEventKind::Released, "10A".to_string()),
                (SeatEventKind::Assigned, "10B".to_string()),
            ]
        );

        let old = fx.store.get_seat(fx.flight.id, "10A").await.unwrap().unwrap();
        assert!(old.is_available);
    }

    #[tokio::test]
    async fn test_return_leg_requires_round_trip() {
        let fx = Fixture::new().await;
        let booking = fx.book_with_passengers(1).await;

        let result = fx.seats.assign_leg(&booking, 0, Leg::Return, "10A").await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_cancelled_booking_cannot_pick_seats() {
        let fx = Fixture::new().await;
        let booking = fx.book_with_passengers(1).await;
        let confirmed = fx.ledger.confirm(&booking, &fx.payment_for(&booking)).await.unwrap();
        let cancelled = fx.ledger.cancel(&confirmed).await.unwrap();

        let result = fx.seats.assign(&cancelled, 0, "10A").await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_stale_snapshot_cannot_pick_seat_after_cancel() {
        let fx = Fixture::new().await;
        let booking = fx.book_with_passengers(1).await;
        let confirmed = fx.ledger.confirm(&booking, &fx.payment_for(&booking)).await.unwrap();
        fx.ledger.cancel(&confirmed).await.unwrap();

        // `confirmed` still says confirmed; the stored booking is cancelled
        let result = fx.seats.assign(&confirmed, 0, "12A").await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        let seat = fx.store.get_seat(fx.flight.id, "12A").await.unwrap().unwrap();
        assert!(seat.is_available);
        assert!(fx.store.seat_holders(seat.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_passenger_index() {
        let fx = Fixture::new().await;
        let booking = fx.book_with_passengers(1).await;

        let result = fx.seats.assign(&booking, 3, "10A").await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
