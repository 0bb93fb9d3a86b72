use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use skyward_core::flight::{ClassCounts, Flight, Seat, SeatClass};
use skyward_core::repository::FlightRepository;
use skyward_core::{CoreError, CoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::internal;

pub struct PostgresFlightRepository {
    pool: PgPool,
}

impl PostgresFlightRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FlightRow {
    id: Uuid,
    flight_number: String,
    origin: String,
    destination: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    status: String,
    economy_price: Decimal,
    business_price: Decimal,
    first_class_price: Decimal,
    economy_capacity: i32,
    business_capacity: i32,
    first_capacity: i32,
    available_economy_seats: i32,
    available_business_seats: i32,
    available_first_seats: i32,
}

impl TryFrom<FlightRow> for Flight {
    type Error = CoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        Ok(Flight {
            id: row.id,
            flight_number: row.flight_number,
            origin: row.origin,
            destination: row.destination,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            status: row.status.parse()?,
            economy_price: row.economy_price,
            business_price: row.business_price,
            first_class_price: row.first_class_price,
            capacity: ClassCounts::new(row.economy_capacity, row.business_capacity, row.first_capacity),
            available: ClassCounts::new(
                row.available_economy_seats,
                row.available_business_seats,
                row.available_first_seats,
            ),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SeatRow {
    id: Uuid,
    flight_id: Uuid,
    seat_number: String,
    seat_class: String,
    is_available: bool,
    is_window: bool,
    is_aisle: bool,
}

impl TryFrom<SeatRow> for Seat {
    type Error = CoreError;

    fn try_from(row: SeatRow) -> Result<Self, Self::Error> {
        Ok(Seat {
            id: row.id,
            flight_id: row.flight_id,
            seat_number: row.seat_number,
            seat_class: row.seat_class.parse()?,
            is_available: row.is_available,
            is_window: row.is_window,
            is_aisle: row.is_aisle,
        })
    }
}

pub(crate) const SEAT_COLUMNS: &str = "id, flight_id, seat_number, seat_class, is_available, is_window, is_aisle";

/// Counter column for a class. Only these literals are ever spliced into SQL.
pub(crate) fn available_column(class: SeatClass) -> &'static str {
    match class {
        SeatClass::Economy => "available_economy_seats",
        SeatClass::Business => "available_business_seats",
        SeatClass::First => "available_first_seats",
    }
}

#[async_trait]
impl FlightRepository for PostgresFlightRepository {
    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<Flight>> {
        let row: Option<FlightRow> = sqlx::query_as(
            r#"
            SELECT id, flight_number, origin, destination, departure_time, arrival_time, status,
                   economy_price, business_price, first_class_price,
                   economy_capacity, business_capacity, first_capacity,
                   available_economy_seats, available_business_seats, available_first_seats
            FROM flights
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        row.map(Flight::try_from).transpose()
    }

    async fn list_seats(&self, flight_id: Uuid, only_available: bool) -> CoreResult<Vec<Seat>> {
        let sql = format!(
            "SELECT {} FROM seats WHERE flight_id = $1 AND ($2 = FALSE OR is_available) ORDER BY seat_number",
            SEAT_COLUMNS
        );
        let rows: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(flight_id)
            .bind(only_available)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> CoreResult<Option<Seat>> {
        let sql = format!("SELECT {} FROM seats WHERE flight_id = $1 AND seat_number = $2", SEAT_COLUMNS);
        let row: Option<SeatRow> = sqlx::query_as(&sql)
            .bind(flight_id)
            .bind(seat_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        row.map(Seat::try_from).transpose()
    }
}
