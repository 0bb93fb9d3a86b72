use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use skyward_core::booking::{Booking, BookingStatus, Leg, Passenger, PassengerDetails};
use skyward_core::flight::{Seat, SeatClass};
use skyward_core::payment::Payment;
use skyward_core::repository::BookingRepository;
use skyward_core::{CoreError, CoreResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::flight_repo::{available_column, SeatRow, SEAT_COLUMNS};
use crate::{internal, is_unique_violation};

/// Bookings, passengers, payments and the seat/counter mutations that go with them.
///
/// Each multi-row operation runs in one transaction. The guarding
/// `UPDATE ... WHERE <precondition>` decides the race: zero rows affected
/// means another request got there first.
pub struct PostgresBookingRepository {
    pool: PgPool,
}

impl PostgresBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    user_id: Uuid,
    trip_type: String,
    outbound_flight_id: Uuid,
    return_flight_id: Option<Uuid>,
    seat_class: String,
    passengers: i32,
    total_amount: Decimal,
    taxes: Decimal,
    service_fee: Decimal,
    status: String,
    contact_email: String,
    contact_phone: String,
    booked_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            trip_type: row.trip_type.parse()?,
            outbound_flight_id: row.outbound_flight_id,
            return_flight_id: row.return_flight_id,
            seat_class: row.seat_class.parse()?,
            passengers: row.passengers,
            total_amount: row.total_amount,
            taxes: row.taxes,
            service_fee: row.service_fee,
            status: row.status.parse()?,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            booked_at: row.booked_at,
            confirmed_at: row.confirmed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    booking_id: Uuid,
    position: i32,
    title: String,
    first_name: String,
    last_name: String,
    date_of_birth: Option<NaiveDate>,
    passport_number: String,
    nationality: String,
    meal_preference: String,
    special_assistance: String,
    outbound_seat_id: Option<Uuid>,
    return_seat_id: Option<Uuid>,
}

impl TryFrom<PassengerRow> for Passenger {
    type Error = CoreError;

    fn try_from(row: PassengerRow) -> Result<Self, Self::Error> {
        Ok(Passenger {
            id: row.id,
            booking_id: row.booking_id,
            position: row.position,
            details: PassengerDetails {
                title: row.title.parse()?,
                first_name: row.first_name,
                last_name: row.last_name,
                date_of_birth: row.date_of_birth,
                passport_number: row.passport_number,
                nationality: row.nationality,
                meal_preference: row.meal_preference,
                special_assistance: row.special_assistance,
            },
            outbound_seat: row.outbound_seat_id,
            return_seat: row.return_seat_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    amount: Decimal,
    method: String,
    status: String,
    transaction_id: String,
    gateway_response: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            method: row.method.parse()?,
            status: row.status.parse()?,
            transaction_id: row.transaction_id,
            gateway_response: row.gateway_response,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, reference, user_id, trip_type, outbound_flight_id, return_flight_id, \
     seat_class, passengers, total_amount, taxes, service_fee, status, contact_email, contact_phone, \
     booked_at, confirmed_at, cancelled_at";

const PASSENGER_COLUMNS: &str = "id, booking_id, position, title, first_name, last_name, date_of_birth, \
     passport_number, nationality, meal_preference, special_assistance, outbound_seat_id, return_seat_id";

fn seat_column(leg: Leg) -> &'static str {
    match leg {
        Leg::Outbound => "outbound_seat_id",
        Leg::Return => "return_seat_id",
    }
}

fn capacity_column(class: SeatClass) -> &'static str {
    match class {
        SeatClass::Economy => "economy_capacity",
        SeatClass::Business => "business_capacity",
        SeatClass::First => "first_capacity",
    }
}

fn seat_taken(seat_number: &str) -> CoreError {
    CoreError::SeatUnavailable(format!("Seat {} is not available.", seat_number))
}

/// Row-locks the booking for the rest of the transaction
async fn lock_booking(tx: &mut Transaction<'_, Postgres>, booking_id: Uuid) -> CoreResult<Booking> {
    let sql = format!("SELECT {} FROM bookings WHERE id = $1 FOR UPDATE", BOOKING_COLUMNS);
    let row: Option<BookingRow> = sqlx::query_as(&sql)
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(internal)?;

    row.ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking_id)))?
        .try_into()
}

async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    booking: &Booking,
    next: BookingStatus,
    at: DateTime<Utc>,
) -> CoreResult<Booking> {
    if !booking.status.can_transition_to(next) {
        return Err(CoreError::InvalidTransition {
            from: booking.status.to_string(),
            to: next.to_string(),
        });
    }

    let stamp = match next {
        BookingStatus::Cancelled => "cancelled_at",
        _ => "confirmed_at",
    };
    let sql = format!(
        "UPDATE bookings SET status = $2, {} = $3 WHERE id = $1 AND status = $4 RETURNING {}",
        stamp, BOOKING_COLUMNS
    );

    let row: Option<BookingRow> = sqlx::query_as(&sql)
        .bind(booking.id)
        .bind(next.as_str())
        .bind(at)
        .bind(booking.status.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(internal)?;

    row.ok_or_else(|| CoreError::InvalidTransition {
        from: booking.status.to_string(),
        to: next.to_string(),
    })?
    .try_into()
}

#[async_trait]
impl BookingRepository for PostgresBookingRepository {
    async fn reference_exists(&self, reference: &str) -> CoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bookings WHERE reference = $1)")
            .bind(reference)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
    }

    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, reference, user_id, trip_type, outbound_flight_id, return_flight_id,
                seat_class, passengers, total_amount, taxes, service_fee, status,
                contact_email, contact_phone, booked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.user_id)
        .bind(booking.trip_type.as_str())
        .bind(booking.outbound_flight_id)
        .bind(booking.return_flight_id)
        .bind(booking.seat_class.as_str())
        .bind(booking.passengers)
        .bind(booking.total_amount)
        .bind(booking.taxes)
        .bind(booking.service_fee)
        .bind(booking.status.as_str())
        .bind(&booking.contact_email)
        .bind(&booking.contact_phone)
        .bind(booking.booked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::Conflict(format!("Booking reference {} already exists", booking.reference))
            } else {
                internal(e)
            }
        })?;

        Ok(())
    }

    async fn find_by_reference(&self, reference: &str, user_id: Uuid) -> CoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE reference = $1 AND user_id = $2", BOOKING_COLUMNS);
        let row: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(reference)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY booked_at DESC",
            BOOKING_COLUMNS
        );
        let rows: Vec<BookingRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn insert_passengers(&self, passengers: &[Passenger]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        for passenger in passengers {
            let details = &passenger.details;
            sqlx::query(
                r#"
                INSERT INTO passengers (id, booking_id, position, title, first_name, last_name, date_of_birth,
                    passport_number, nationality, meal_preference, special_assistance)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(passenger.id)
            .bind(passenger.booking_id)
            .bind(passenger.position)
            .bind(details.title.as_str())
            .bind(&details.first_name)
            .bind(&details.last_name)
            .bind(details.date_of_birth)
            .bind(&details.passport_number)
            .bind(&details.nationality)
            .bind(&details.meal_preference)
            .bind(&details.special_assistance)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::Conflict("Passengers already recorded for this booking".to_string())
                } else {
                    internal(e)
                }
            })?;
        }

        tx.commit().await.map_err(internal)?;
        Ok(())
    }

    async fn list_passengers(&self, booking_id: Uuid) -> CoreResult<Vec<Passenger>> {
        let sql = format!(
            "SELECT {} FROM passengers WHERE booking_id = $1 ORDER BY position",
            PASSENGER_COLUMNS
        );
        let rows: Vec<PassengerRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

        rows.into_iter().map(Passenger::try_from).collect()
    }

    async fn find_payment(&self, booking_id: Uuid) -> CoreResult<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, amount, method, status, transaction_id, gateway_response, created_at, processed_at
            FROM payments
            WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        row.map(Payment::try_from).transpose()
    }

    async fn assign_seat(
        &self,
        passenger_id: Uuid,
        leg: Leg,
        flight_id: Uuid,
        seat_number: &str,
    ) -> CoreResult<Seat> {
        let column = seat_column(leg);
        let mut tx = self.pool.begin().await.map_err(internal)?;

        // Shared lock on the owning booking serializes the claim against a cancel
        let status: String = sqlx::query_scalar::<_, String>(
            r#"
            SELECT b.status
            FROM bookings b
            JOIN passengers p ON p.booking_id = b.id
            WHERE p.id = $1
            FOR SHARE OF b
            "#,
        )
        .bind(passenger_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?
        .ok_or_else(|| CoreError::NotFound(format!("Passenger {} not found", passenger_id)))?;

        let status: BookingStatus = status.parse()?;
        if !status.allows_seat_changes() {
            return Err(CoreError::Conflict(format!("Seats cannot be changed on a {} booking", status)));
        }

        let previous: Option<Uuid> =
            sqlx::query_scalar::<_, Option<Uuid>>(&format!("SELECT {} FROM passengers WHERE id = $1 FOR UPDATE", column))
                .bind(passenger_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?
                .ok_or_else(|| CoreError::NotFound(format!("Passenger {} not found", passenger_id)))?;

        let sql = format!("SELECT {} FROM seats WHERE flight_id = $1 AND seat_number = $2", SEAT_COLUMNS);
        let target: SeatRow = sqlx::query_as(&sql)
            .bind(flight_id)
            .bind(seat_number)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?
            .ok_or_else(|| seat_taken(seat_number))?;
        let target = Seat::try_from(target)?;

        if previous == Some(target.id) {
            tx.commit().await.map_err(internal)?;
            return Ok(target);
        }

        // Compare-and-set: only one concurrent claimant sees is_available = TRUE
        let sql = format!(
            "UPDATE seats SET is_available = FALSE WHERE id = $1 AND is_available RETURNING {}",
            SEAT_COLUMNS
        );
        let claimed: SeatRow = sqlx::query_as(&sql)
            .bind(target.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?
            .ok_or_else(|| seat_taken(seat_number))?;

        if let Some(previous_id) = previous {
            sqlx::query("UPDATE seats SET is_available = TRUE WHERE id = $1")
                .bind(previous_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
        }

        sqlx::query(&format!("UPDATE passengers SET {} = $2 WHERE id = $1", column))
            .bind(passenger_id)
            .bind(target.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| if is_unique_violation(&e) { seat_taken(seat_number) } else { internal(e) })?;

        tx.commit().await.map_err(internal)?;
        debug!("Seat {} claimed for passenger {}", seat_number, passenger_id);
        Seat::try_from(claimed)
    }

    async fn release_seat(&self, passenger_id: Uuid, leg: Leg) -> CoreResult<Option<Seat>> {
        let column = seat_column(leg);
        let mut tx = self.pool.begin().await.map_err(internal)?;

        let held: Option<Uuid> =
            sqlx::query_scalar::<_, Option<Uuid>>(&format!("SELECT {} FROM passengers WHERE id = $1 FOR UPDATE", column))
                .bind(passenger_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?
                .ok_or_else(|| CoreError::NotFound(format!("Passenger {} not found", passenger_id)))?;

        let Some(seat_id) = held else {
            tx.commit().await.map_err(internal)?;
            return Ok(None);
        };

        sqlx::query(&format!("UPDATE passengers SET {} = NULL WHERE id = $1", column))
            .bind(passenger_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        let sql = format!("UPDATE seats SET is_available = TRUE WHERE id = $1 RETURNING {}", SEAT_COLUMNS);
        let released: Option<SeatRow> = sqlx::query_as(&sql)
            .bind(seat_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        released.map(Seat::try_from).transpose()
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        payment: &Payment,
        confirmed_at: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(internal)?;
        let booking = lock_booking(&mut tx, booking_id).await?;

        // With the row locked, a payment that won the race is already committed
        let paid: bool = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM payments WHERE booking_id = $1)")
            .bind(booking_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
        if paid {
            return Err(CoreError::Conflict(format!(
                "Payment already recorded for booking {}",
                booking.reference
            )));
        }

        if !booking.status.can_transition_to(BookingStatus::Confirmed) {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Confirmed.to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, amount, method, status, transaction_id, gateway_response,
                created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.gateway_response)
        .bind(payment.created_at)
        .bind(payment.processed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::Conflict(format!("Payment already recorded for booking {}", booking.reference))
            } else {
                internal(e)
            }
        })?;

        let column = available_column(booking.seat_class);
        let sql = format!(
            "UPDATE flights SET {col} = {col} - $1 WHERE id = $2 AND {col} >= $1",
            col = column
        );
        for flight_id in booking.flight_ids() {
            let result = sqlx::query(&sql)
                .bind(booking.passengers)
                .bind(flight_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;

            if result.rows_affected() == 0 {
                return Err(CoreError::Conflict(format!(
                    "Not enough {} seats left on flight {}",
                    booking.seat_class, flight_id
                )));
            }
        }

        let confirmed = set_status(&mut tx, &booking, BookingStatus::Confirmed, confirmed_at).await?;
        tx.commit().await.map_err(internal)?;
        Ok(confirmed)
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> CoreResult<(Booking, Vec<Seat>)> {
        let mut tx = self.pool.begin().await.map_err(internal)?;
        let booking = lock_booking(&mut tx, booking_id).await?;

        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Cancelled.to_string(),
            });
        }

        let sql = format!(
            "UPDATE flights SET {col} = {col} + $1 WHERE id = $2 AND {col} + $1 <= {cap}",
            col = available_column(booking.seat_class),
            cap = capacity_column(booking.seat_class)
        );
        for flight_id in booking.flight_ids() {
            let result = sqlx::query(&sql)
                .bind(booking.passengers)
                .bind(flight_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;

            if result.rows_affected() == 0 {
                return Err(CoreError::InternalError(format!(
                    "Restoring {} seats on flight {} would exceed capacity",
                    booking.seat_class, flight_id
                )));
            }
        }

        let sql = format!(
            r#"
            UPDATE seats SET is_available = TRUE
            WHERE id IN (
                SELECT outbound_seat_id FROM passengers WHERE booking_id = $1 AND outbound_seat_id IS NOT NULL
                UNION
                SELECT return_seat_id FROM passengers WHERE booking_id = $1 AND return_seat_id IS NOT NULL
            )
            RETURNING {}
            "#,
            SEAT_COLUMNS
        );
        let released: Vec<SeatRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(internal)?;

        sqlx::query("UPDATE passengers SET outbound_seat_id = NULL, return_seat_id = NULL WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        let cancelled = set_status(&mut tx, &booking, BookingStatus::Cancelled, cancelled_at).await?;
        tx.commit().await.map_err(internal)?;

        let seats = released.into_iter().map(Seat::try_from).collect::<CoreResult<Vec<_>>>()?;
        Ok((cancelled, seats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leg_columns() {
        assert_eq!(seat_column(Leg::Outbound), "outbound_seat_id");
        assert_eq!(seat_column(Leg::Return), "return_seat_id");
        assert_eq!(capacity_column(SeatClass::Business), "business_capacity");
    }

    #[test]
    fn test_booking_row_conversion() {
        let row = BookingRow {
            id: Uuid::new_v4(),
            reference: "Q7X2PB".to_string(),
            user_id: Uuid::new_v4(),
            trip_type: "round_trip".to_string(),
            outbound_flight_id: Uuid::new_v4(),
            return_flight_id: Some(Uuid::new_v4()),
            seat_class: "business".to_string(),
            passengers: 1,
            total_amount: Decimal::new(90000, 2),
            taxes: Decimal::new(10800, 2),
            service_fee: Decimal::new(2500, 2),
            status: "confirmed".to_string(),
            contact_email: "a@example.com".to_string(),
            contact_phone: String::new(),
            booked_at: Utc::now(),
            confirmed_at: Some(Utc::now()),
            cancelled_at: None,
        };

        let booking = Booking::try_from(row).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.flight_ids().len(), 2);
        assert_eq!(booking.grand_total(), Decimal::new(103300, 2));
    }
}
