use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use skyward_core::flight::{ClassCounts, Flight, FlightStatus, SeatClass};
use skyward_store::memory::{seat_grid, MemoryStore};
use uuid::Uuid;

/// Seeds one scheduled flight into an in-memory store so a local run has something to book.
///
/// Business is rows 1-2 (ACDF), economy rows 10-19 (ABCDEF).
pub async fn seed_flight(store: &MemoryStore, departs: DateTime<Utc>) -> Flight {
    let id = Uuid::new_v4();
    let mut seats = seat_grid(id, SeatClass::Business, 1..=2, "ACDF");
    seats.extend(seat_grid(id, SeatClass::Economy, 10..=19, "ABCDEF"));

    let counts = ClassCounts::new(60, 8, 0);
    let flight = Flight {
        id,
        flight_number: "SW101".to_string(),
        origin: "SIN".to_string(),
        destination: "BKK".to_string(),
        departure_time: departs,
        arrival_time: departs + Duration::minutes(150),
        status: FlightStatus::Scheduled,
        economy_price: Decimal::new(10000, 2),
        business_price: Decimal::new(45000, 2),
        first_class_price: Decimal::new(90000, 2),
        capacity: counts,
        available: counts,
    };

    store.add_flight(flight.clone(), seats).await;
    tracing::info!("Seeded demo flight {} ({})", flight.flight_number, flight.id);
    flight
}
