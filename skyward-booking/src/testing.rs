use chrono::Utc;
use rust_decimal::Decimal;
use skyward_catalog::FareCalculator;
use skyward_core::booking::{Booking, PassengerDetails, TripType};
use skyward_core::clock::ManualClock;
use skyward_core::flight::{ClassCounts, Flight, FlightStatus, SeatClass};
use skyward_core::payment::{Payment, PaymentMethod, PaymentStatus};
use skyward_core::repository::FlightRepository;
use skyward_store::memory::{seat_grid, MemoryStore};
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::{BookingLedger, CreateBooking};
use crate::payment::{PaymentRecorder, SimulatedGateway};
use crate::reference::ReferenceGenerator;
use crate::seats::SeatAllocator;

/// Economy-only flight with 18 seats, rows 10-12 lettered A-F
pub fn economy_flight(number: &str, price_cents: i64) -> Flight {
    Flight {
        id: Uuid::new_v4(),
        flight_number: number.to_string(),
        origin: "SIN".to_string(),
        destination: "BKK".to_string(),
        departure_time: Utc::now(),
        arrival_time: Utc::now(),
        status: FlightStatus::Scheduled,
        economy_price: Decimal::new(price_cents, 2),
        business_price: Decimal::new(price_cents * 4, 2),
        first_class_price: Decimal::new(price_cents * 8, 2),
        capacity: ClassCounts::new(18, 0, 0),
        available: ClassCounts::new(18, 0, 0),
    }
}

pub fn details(first: &str, last: &str) -> PassengerDetails {
    PassengerDetails {
        first_name: first.to_string(),
        last_name: last.to_string(),
        ..PassengerDetails::default()
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<BookingLedger>,
    pub seats: SeatAllocator,
    pub payments: PaymentRecorder,
    pub flight: Flight,
    pub user_id: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));

        let flight = economy_flight("SW101", 10000);
        store
            .add_flight(flight.clone(), seat_grid(flight.id, SeatClass::Economy, 10..=12, "ABCDEF"))
            .await;

        let ledger = Arc::new(BookingLedger::new(
            store.clone(),
            store.clone(),
            FareCalculator::default(),
            ReferenceGenerator::new(store.clone()),
            clock.clone(),
        ));
        let seats = SeatAllocator::new(store.clone(), store.clone(), clock.clone());
        let payments = PaymentRecorder::new(store.clone(), Arc::new(SimulatedGateway), ledger.clone(), clock.clone());

        Self {
            store,
            clock,
            ledger,
            seats,
            payments,
            flight,
            user_id: Uuid::new_v4(),
        }
    }

    pub fn request(&self, passengers: i32) -> CreateBooking {
        CreateBooking {
            user_id: self.user_id,
            outbound_flight_id: self.flight.id,
            return_flight_id: None,
            passengers,
            seat_class: SeatClass::Economy,
            trip_type: TripType::OneWay,
            contact_email: "traveller@example.com".to_string(),
            contact_phone: String::new(),
        }
    }

    pub async fn book(&self, passengers: i32) -> Booking {
        self.ledger.create(self.request(passengers)).await.unwrap()
    }

    pub async fn book_with_passengers(&self, passengers: i32) -> Booking {
        let booking = self.book(passengers).await;
        let people = (0..passengers).map(|i| details("Pax", &format!("No{}", i))).collect();
        self.ledger.add_passengers(&booking, people).await.unwrap();
        booking
    }

    pub fn payment_for(&self, booking: &Booking) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            amount: booking.grand_total(),
            method: PaymentMethod::CreditCard,
            status: PaymentStatus::Completed,
            transaction_id: format!("TXN_{}_TEST", booking.reference),
            gateway_response: String::new(),
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
        }
    }

    pub async fn economy_available(&self) -> i32 {
        self.store.get_flight(self.flight.id).await.unwrap().unwrap().available.economy
    }
}
