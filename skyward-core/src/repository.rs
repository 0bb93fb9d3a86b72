use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, Leg, Passenger};
use crate::flight::{Flight, Seat};
use crate::identity::{FlowToken, LoginAttempt, NewUser, OtpPurpose, OtpVerification, User, UserProfile};
use crate::payment::Payment;
use crate::CoreResult;

/// Repository trait for accounts, profiles and login audit
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `ValidationError` when the username or email is taken.
    async fn create_user(&self, user: NewUser) -> CoreResult<User>;

    async fn find_user(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> CoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    async fn update_user(&self, user: &User) -> CoreResult<()>;

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> CoreResult<()>;

    /// Existing profile, or a freshly inserted empty one.
    async fn get_or_init_profile(&self, user_id: Uuid) -> CoreResult<UserProfile>;

    async fn save_profile(&self, profile: &UserProfile) -> CoreResult<()>;

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> CoreResult<()>;
}

/// Repository trait for one-time codes
#[async_trait]
pub trait OtpRepository: Send + Sync {
    async fn insert_otp(&self, otp: &OtpVerification) -> CoreResult<()>;

    /// Most recent unverified code matching user, code and purpose.
    async fn find_unverified(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: OtpPurpose,
    ) -> CoreResult<Option<OtpVerification>>;

    /// Flips `is_verified` if it is still false. Returns whether this call won.
    async fn mark_verified(&self, otp_id: Uuid) -> CoreResult<bool>;
}

/// Repository trait for flight inventory
#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<Flight>>;

    /// Seats of a flight ordered by seat number.
    async fn list_seats(&self, flight_id: Uuid, only_available: bool) -> CoreResult<Vec<Seat>>;

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> CoreResult<Option<Seat>>;
}

/// Repository trait for bookings, passengers and payments.
///
/// The `assign_seat`, `release_seat`, `confirm_booking` and `cancel_booking`
/// operations are atomic: either every write lands or none does.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn reference_exists(&self, reference: &str) -> CoreResult<bool>;

    /// Fails with `Conflict` if the reference is already stored.
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()>;

    /// Lookup scoped to the owning user.
    async fn find_by_reference(&self, reference: &str, user_id: Uuid) -> CoreResult<Option<Booking>>;

    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>>;

    /// Fails with `Conflict` if the booking already has passengers.
    async fn insert_passengers(&self, passengers: &[Passenger]) -> CoreResult<()>;

    /// Ordered by position.
    async fn list_passengers(&self, booking_id: Uuid) -> CoreResult<Vec<Passenger>>;

    async fn find_payment(&self, booking_id: Uuid) -> CoreResult<Option<Payment>>;

    /// Claims the seat if available and points the passenger's leg at it,
    /// releasing whatever seat that leg held before.
    /// Fails with `Conflict` unless the passenger's booking, as stored at the
    /// time of the claim, still allows seat changes, and with `SeatUnavailable`
    /// when the seat is missing or taken.
    async fn assign_seat(
        &self,
        passenger_id: Uuid,
        leg: Leg,
        flight_id: Uuid,
        seat_number: &str,
    ) -> CoreResult<Seat>;

    /// Frees the passenger's seat on that leg. `None` when nothing was held.
    async fn release_seat(&self, passenger_id: Uuid, leg: Leg) -> CoreResult<Option<Seat>>;

    /// pending → confirmed, payment insert and counter decrement on every leg.
    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        payment: &Payment,
        confirmed_at: DateTime<Utc>,
    ) -> CoreResult<Booking>;

    /// confirmed → cancelled, seat release for every passenger and counter restore.
    /// Returns the released seats alongside the updated booking.
    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> CoreResult<(Booking, Vec<Seat>)>;
}

/// Token-keyed storage for multi-step flow state
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn put_flow(&self, flow: &FlowToken) -> CoreResult<()>;

    /// `None` when the token is unknown or expired.
    async fn get_flow(&self, token: &str) -> CoreResult<Option<FlowToken>>;

    async fn remove_flow(&self, token: &str) -> CoreResult<()>;
}
