use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skyward_catalog::SeatInventory;
use skyward_core::booking::{Booking, BookingStatus, Leg, Passenger};
use skyward_core::clock::Clock;
use skyward_core::flight::{Flight, Seat, SeatClass};
use skyward_core::identity::{FlowToken, LoginAttempt, NewUser, OtpPurpose, OtpVerification, User, UserProfile};
use skyward_core::payment::Payment;
use skyward_core::repository::{BookingRepository, FlightRepository, FlowStore, OtpRepository, UserRepository};
use skyward_core::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: Vec<User>,
    profiles: HashMap<Uuid, UserProfile>,
    login_attempts: Vec<LoginAttempt>,
    otps: Vec<OtpVerification>,
    flights: HashMap<Uuid, Flight>,
    seats: HashMap<Uuid, Seat>,
    bookings: Vec<Booking>,
    passengers: HashMap<Uuid, Passenger>,
    payments: HashMap<Uuid, Payment>,
    flows: HashMap<String, FlowToken>,
}

impl State {
    fn booking_index(&self, booking_id: Uuid) -> CoreResult<usize> {
        self.bookings
            .iter()
            .position(|b| b.id == booking_id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", booking_id)))
    }

    fn seat_id(&self, flight_id: Uuid, seat_number: &str) -> Option<Uuid> {
        self.seats
            .values()
            .find(|s| s.flight_id == flight_id && s.seat_number == seat_number)
            .map(|s| s.id)
    }
}

/// Every repository trait over one mutex-guarded state.
///
/// Each trait call holds the lock for its whole body, so the multi-row
/// operations are as atomic here as they are inside a Postgres transaction.
pub struct MemoryStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    pub async fn add_flight(&self, flight: Flight, seats: Vec<Seat>) {
        let mut state = self.state.lock().await;
        for seat in seats {
            state.seats.insert(seat.id, seat);
        }
        state.flights.insert(flight.id, flight);
    }

    pub async fn login_attempts(&self) -> Vec<LoginAttempt> {
        self.state.lock().await.login_attempts.clone()
    }

    /// Passengers currently pointing at the seat, on either leg.
    pub async fn seat_holders(&self, seat_id: Uuid) -> Vec<Uuid> {
        let state = self.state.lock().await;
        state
            .passengers
            .values()
            .filter(|p| p.outbound_seat == Some(seat_id) || p.return_seat == Some(seat_id))
            .map(|p| p.id)
            .collect()
    }
}

/// Rows `rows` of seats lettered by `letters`, e.g. `seat_grid(id, Economy, 10..=12, "ABCDEF")`
pub fn seat_grid(
    flight_id: Uuid,
    class: SeatClass,
    rows: std::ops::RangeInclusive<u32>,
    letters: &str,
) -> Vec<Seat> {
    rows.flat_map(|row| {
        letters
            .chars()
            .map(move |letter| Seat::new(flight_id, &format!("{}{}", row, letter), class))
    })
    .collect()
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, user: NewUser) -> CoreResult<User> {
        let mut state = self.state.lock().await;

        if state.users.iter().any(|u| u.username == user.username) {
            return Err(CoreError::ValidationError("Username already exists.".to_string()));
        }
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(CoreError::ValidationError("Email already registered.".to_string()));
        }

        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: false,
            created_at: self.clock.now(),
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn find_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let mut state = self.state.lock().await;

        if state.users.iter().any(|u| u.id != user.id && u.email == user.email) {
            return Err(CoreError::ValidationError("Email already registered.".to_string()));
        }

        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| CoreError::NotFound(format!("User {} not found", user.id)))?;
        stored.email = user.email.clone();
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        Ok(())
    }

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| CoreError::NotFound(format!("User {} not found", user_id)))?;
        stored.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn get_or_init_profile(&self, user_id: Uuid) -> CoreResult<UserProfile> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let profile = state
            .profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::empty(user_id, now));
        Ok(profile.clone())
    }

    async fn save_profile(&self, profile: &UserProfile) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        state.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> CoreResult<()> {
        self.state.lock().await.login_attempts.push(attempt.clone());
        Ok(())
    }
}

#[async_trait]
impl OtpRepository for MemoryStore {
    async fn insert_otp(&self, otp: &OtpVerification) -> CoreResult<()> {
        self.state.lock().await.otps.push(otp.clone());
        Ok(())
    }

    async fn find_unverified(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: OtpPurpose,
    ) -> CoreResult<Option<OtpVerification>> {
        let state = self.state.lock().await;
        // max_by_key keeps the last of equal maxima, i.e. the latest insert
        Ok(state
            .otps
            .iter()
            .filter(|o| o.user_id == user_id && o.code == code && o.purpose == purpose && !o.is_verified)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn mark_verified(&self, otp_id: Uuid) -> CoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.otps.iter_mut().find(|o| o.id == otp_id && !o.is_verified) {
            Some(otp) => {
                otp.is_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl FlightRepository for MemoryStore {
    async fn get_flight(&self, id: Uuid) -> CoreResult<Option<Flight>> {
        Ok(self.state.lock().await.flights.get(&id).cloned())
    }

    async fn list_seats(&self, flight_id: Uuid, only_available: bool) -> CoreResult<Vec<Seat>> {
        let state = self.state.lock().await;
        let mut seats: Vec<Seat> = state
            .seats
            .values()
            .filter(|s| s.flight_id == flight_id && (!only_available || s.is_available))
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }

    async fn get_seat(&self, flight_id: Uuid, seat_number: &str) -> CoreResult<Option<Seat>> {
        let state = self.state.lock().await;
        Ok(state.seat_id(flight_id, seat_number).and_then(|id| state.seats.get(&id).cloned()))
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn reference_exists(&self, reference: &str) -> CoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state.bookings.iter().any(|b| b.reference == reference))
    }

    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.bookings.iter().any(|b| b.reference == booking.reference) {
            return Err(CoreError::Conflict(format!(
                "Booking reference {} already exists",
                booking.reference
            )));
        }
        state.bookings.push(booking.clone());
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str, user_id: Uuid) -> CoreResult<Option<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .iter()
            .find(|b| b.reference == reference && b.user_id == user_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        // Reverse first so equal timestamps still come out newest first
        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .rev()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
        Ok(bookings)
    }

    async fn insert_passengers(&self, passengers: &[Passenger]) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        for passenger in passengers {
            let idx = state.booking_index(passenger.booking_id)?;
            if state.passengers.values().any(|p| p.booking_id == passenger.booking_id) {
                return Err(CoreError::Conflict(format!(
                    "Passengers already recorded for booking {}",
                    state.bookings[idx].reference
                )));
            }
        }
        for passenger in passengers {
            state.passengers.insert(passenger.id, passenger.clone());
        }
        Ok(())
    }

    async fn list_passengers(&self, booking_id: Uuid) -> CoreResult<Vec<Passenger>> {
        let state = self.state.lock().await;
        let mut passengers: Vec<Passenger> = state
            .passengers
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        passengers.sort_by_key(|p| p.position);
        Ok(passengers)
    }

    async fn find_payment(&self, booking_id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(&booking_id).cloned())
    }

    async fn assign_seat(
        &self,
        passenger_id: Uuid,
        leg: Leg,
        flight_id: Uuid,
        seat_number: &str,
    ) -> CoreResult<Seat> {
        let mut state = self.state.lock().await;

        let passenger = state
            .passengers
            .get(&passenger_id)
            .ok_or_else(|| CoreError::NotFound(format!("Passenger {} not found", passenger_id)))?;
        let previous = passenger.seat_for(leg);

        let booking = &state.bookings[state.booking_index(passenger.booking_id)?];
        if !booking.status.allows_seat_changes() {
            return Err(CoreError::Conflict(format!(
                "Seats cannot be changed on a {} booking",
                booking.status
            )));
        }

        let seat_id = state
            .seat_id(flight_id, seat_number)
            .ok_or_else(|| CoreError::SeatUnavailable(format!("Seat {} is not available.", seat_number)))?;

        if previous == Some(seat_id) {
            if let Some(seat) = state.seats.get(&seat_id) {
                return Ok(seat.clone());
            }
        }

        let seat = state
            .seats
            .get_mut(&seat_id)
            .filter(|s| s.is_available)
            .ok_or_else(|| CoreError::SeatUnavailable(format!("Seat {} is not available.", seat_number)))?;
        seat.is_available = false;
        let assigned = seat.clone();

        if let Some(previous_id) = previous {
            if let Some(old) = state.seats.get_mut(&previous_id) {
                old.is_available = true;
            }
        }

        if let Some(passenger) = state.passengers.get_mut(&passenger_id) {
            *passenger.seat_for_mut(leg) = Some(seat_id);
        }

        Ok(assigned)
    }

    async fn release_seat(&self, passenger_id: Uuid, leg: Leg) -> CoreResult<Option<Seat>> {
        let mut state = self.state.lock().await;

        let passenger = state
            .passengers
            .get_mut(&passenger_id)
            .ok_or_else(|| CoreError::NotFound(format!("Passenger {} not found", passenger_id)))?;

        let Some(seat_id) = passenger.seat_for_mut(leg).take() else {
            return Ok(None);
        };

        Ok(state.seats.get_mut(&seat_id).map(|seat| {
            seat.is_available = true;
            seat.clone()
        }))
    }

    async fn confirm_booking(
        &self,
        booking_id: Uuid,
        payment: &Payment,
        confirmed_at: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let mut state = self.state.lock().await;
        let idx = state.booking_index(booking_id)?;
        let booking = state.bookings[idx].clone();

        if state.payments.contains_key(&booking_id) {
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

        // Work on copies so a failure on any leg leaves every counter untouched
        let mut flights = Vec::new();
        for flight_id in booking.flight_ids() {
            let mut flight = state
                .flights
                .get(&flight_id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("Flight {} not found", flight_id)))?;
            SeatInventory::reserve(&mut flight, booking.seat_class, booking.passengers)?;
            flights.push(flight);
        }

        for flight in flights {
            state.flights.insert(flight.id, flight);
        }
        state.payments.insert(booking_id, payment.clone());

        let stored = &mut state.bookings[idx];
        stored.status = BookingStatus::Confirmed;
        stored.confirmed_at = Some(confirmed_at);
        Ok(stored.clone())
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> CoreResult<(Booking, Vec<Seat>)> {
        let mut state = self.state.lock().await;
        let idx = state.booking_index(booking_id)?;
        let booking = state.bookings[idx].clone();

        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(CoreError::InvalidTransition {
                from: booking.status.to_string(),
                to: BookingStatus::Cancelled.to_string(),
            });
        }

        let mut flights = Vec::new();
        for flight_id in booking.flight_ids() {
            let mut flight = state
                .flights
                .get(&flight_id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("Flight {} not found", flight_id)))?;
            SeatInventory::restore(&mut flight, booking.seat_class, booking.passengers)?;
            flights.push(flight);
        }
        for flight in flights {
            state.flights.insert(flight.id, flight);
        }

        let held: Vec<Uuid> = state
            .passengers
            .values_mut()
            .filter(|p| p.booking_id == booking_id)
            .flat_map(|p| [p.outbound_seat.take(), p.return_seat.take()])
            .flatten()
            .collect();

        let mut released = Vec::new();
        for seat_id in held {
            if let Some(seat) = state.seats.get_mut(&seat_id) {
                seat.is_available = true;
                released.push(seat.clone());
            }
        }

        let stored = &mut state.bookings[idx];
        stored.status = BookingStatus::Cancelled;
        stored.cancelled_at = Some(cancelled_at);
        Ok((stored.clone(), released))
    }
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn put_flow(&self, flow: &FlowToken) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        state.flows.insert(flow.token.clone(), flow.clone());
        Ok(())
    }

    async fn get_flow(&self, token: &str) -> CoreResult<Option<FlowToken>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let flow = state.flows.get(token).cloned();
        match flow {
            Some(flow) if flow.is_expired(now) => {
                state.flows.remove(token);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn remove_flow(&self, token: &str) -> CoreResult<()> {
        self.state.lock().await.flows.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use skyward_core::booking::{PassengerDetails, TripType};
    use skyward_core::clock::ManualClock;
    use skyward_core::flight::{ClassCounts, FlightStatus};
    use skyward_core::identity::FlowKind;
    use skyward_core::payment::{PaymentMethod, PaymentStatus};

    fn flight() -> Flight {
        Flight {
            id: Uuid::new_v4(),
            flight_number: "SW303".to_string(),
            origin: "SIN".to_string(),
            destination: "HND".to_string(),
            departure_time: Utc::now(),
            arrival_time: Utc::now(),
            status: FlightStatus::Scheduled,
            economy_price: Decimal::new(10000, 2),
            business_price: Decimal::new(50000, 2),
            first_class_price: Decimal::new(90000, 2),
            capacity: ClassCounts::new(6, 0, 0),
            available: ClassCounts::new(6, 0, 0),
        }
    }

    fn booking(flight: &Flight, passengers: i32) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            reference: "AB12CD".to_string(),
            user_id: Uuid::new_v4(),
            trip_type: TripType::OneWay,
            outbound_flight_id: flight.id,
            return_flight_id: None,
            seat_class: SeatClass::Economy,
            passengers,
            total_amount: Decimal::new(20000, 2),
            taxes: Decimal::new(2400, 2),
            service_fee: Decimal::new(2500, 2),
            status: BookingStatus::Pending,
            contact_email: "a@example.com".to_string(),
            contact_phone: String::new(),
            booked_at: Utc::now(),
            confirmed_at: None,
            cancelled_at: None,
        }
    }

    fn payment(booking: &Booking) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            amount: booking.grand_total(),
            method: PaymentMethod::Wallet,
            status: PaymentStatus::Completed,
            transaction_id: "TXN_TEST".to_string(),
            gateway_response: String::new(),
            created_at: Utc::now(),
            processed_at: Some(Utc::now()),
        }
    }

    async fn seeded() -> (MemoryStore, Flight, Booking, Passenger) {
        let store = MemoryStore::new(Arc::new(ManualClock::new(Utc::now())));
        let flight = flight();
        store
            .add_flight(flight.clone(), seat_grid(flight.id, SeatClass::Economy, 1..=1, "ABCDEF"))
            .await;
        let booking = booking(&flight, 1);
        store.insert_booking(&booking).await.unwrap();
        let passenger = Passenger::new(booking.id, 0, PassengerDetails::default());
        store.insert_passengers(&[passenger.clone()]).await.unwrap();
        (store, flight, booking, passenger)
    }

    #[test]
    fn test_seat_grid() {
        let seats = seat_grid(Uuid::new_v4(), SeatClass::Business, 1..=2, "ACDF");
        assert_eq!(seats.len(), 8);
        assert!(seats.iter().any(|s| s.seat_number == "2F" && s.is_window));
    }

    #[tokio::test]
    async fn test_duplicate_reference_conflicts() {
        let (store, flight, _, _) = seeded().await;
        let result = store.insert_booking(&booking(&flight, 1)).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_reassign_frees_previous_seat() {
        let (store, flight, _, passenger) = seeded().await;

        let first = store.assign_seat(passenger.id, Leg::Outbound, flight.id, "1A").await.unwrap();
        let second = store.assign_seat(passenger.id, Leg::Outbound, flight.id, "1C").await.unwrap();

        let first_now = store.get_seat(flight.id, "1A").await.unwrap().unwrap();
        assert!(first_now.is_available);
        assert!(store.seat_holders(first.id).await.is_empty());
        assert_eq!(store.seat_holders(second.id).await, vec![passenger.id]);

        // Picking the held seat again is a no-op
        let again = store.assign_seat(passenger.id, Leg::Outbound, flight.id, "1C").await.unwrap();
        assert_eq!(again.id, second.id);
    }

    #[tokio::test]
    async fn test_unknown_seat_is_unavailable() {
        let (store, flight, _, passenger) = seeded().await;
        let result = store.assign_seat(passenger.id, Leg::Outbound, flight.id, "99Z").await;
        assert!(matches!(result, Err(CoreError::SeatUnavailable(_))));
    }

    #[tokio::test]
    async fn test_confirm_twice_is_rejected() {
        let (store, flight, booking, _) = seeded().await;

        store.confirm_booking(booking.id, &payment(&booking), Utc::now()).await.unwrap();
        assert_eq!(store.get_flight(flight.id).await.unwrap().unwrap().available.economy, 5);

        // The losing payment reads as a duplicate, not as a bad transition
        let again = store.confirm_booking(booking.id, &payment(&booking), Utc::now()).await;
        assert!(matches!(again, Err(CoreError::Conflict(_))));
        assert_eq!(store.get_flight(flight.id).await.unwrap().unwrap().available.economy, 5);
    }

    #[tokio::test]
    async fn test_cancelled_booking_cannot_claim_seat() {
        let (store, flight, booking, passenger) = seeded().await;
        store.confirm_booking(booking.id, &payment(&booking), Utc::now()).await.unwrap();
        store.cancel_booking(booking.id, Utc::now()).await.unwrap();

        let result = store.assign_seat(passenger.id, Leg::Outbound, flight.id, "1B").await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert!(store.get_seat(flight.id, "1B").await.unwrap().unwrap().is_available);
    }

    #[tokio::test]
    async fn test_passengers_recorded_once() {
        let (store, _, booking, _) = seeded().await;

        let again = Passenger::new(booking.id, 0, PassengerDetails::default());
        let result = store.insert_passengers(&[again]).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert_eq!(store.list_passengers(booking.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_seats_and_counters() {
        let (store, flight, booking, passenger) = seeded().await;
        let seat = store.assign_seat(passenger.id, Leg::Outbound, flight.id, "1F").await.unwrap();
        store.confirm_booking(booking.id, &payment(&booking), Utc::now()).await.unwrap();

        let (cancelled, released) = store.cancel_booking(booking.id, Utc::now()).await.unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(released.len(), 1);
        assert!(released[0].is_available);
        assert!(store.seat_holders(seat.id).await.is_empty());
        assert_eq!(store.get_flight(flight.id).await.unwrap().unwrap().available.economy, 6);
    }

    #[tokio::test]
    async fn test_flow_expires_lazily() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryStore::new(clock.clone());
        let flow = FlowToken::new(
            FlowKind::Signup,
            Uuid::new_v4().to_string(),
            serde_json::Value::Null,
            clock.now() + Duration::minutes(30),
        );
        store.put_flow(&flow).await.unwrap();

        assert!(store.get_flow(&flow.token).await.unwrap().is_some());
        clock.advance(Duration::minutes(31));
        assert!(store.get_flow(&flow.token).await.unwrap().is_none());
    }
}
