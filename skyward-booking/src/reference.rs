use rand::Rng;
use skyward_core::booking::Booking;
use skyward_core::repository::BookingRepository;
use skyward_core::{CoreError, CoreResult};
use std::sync::Arc;
use tracing::{debug, error, warn};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const REFERENCE_LEN: usize = 6;

/// 36^6 references make a collision rare; this many in a row means something is wrong.
pub const MAX_ATTEMPTS: usize = 64;

/// Produces candidate booking references
pub trait ReferenceSource: Send + Sync {
    fn sample(&self) -> String;
}

pub struct RandomReferences;

impl ReferenceSource for RandomReferences {
    fn sample(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..REFERENCE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

/// Stores bookings under collision-free references.
///
/// Sampling alone is not enough: two requests can both see a candidate as
/// free. The unique constraint on insert settles that race and the loser
/// simply samples again.
pub struct ReferenceGenerator {
    repo: Arc<dyn BookingRepository>,
    source: Arc<dyn ReferenceSource>,
}

impl ReferenceGenerator {
    pub fn new(repo: Arc<dyn BookingRepository>) -> Self {
        Self::with_source(repo, Arc::new(RandomReferences))
    }

    pub fn with_source(repo: Arc<dyn BookingRepository>, source: Arc<dyn ReferenceSource>) -> Self {
        Self { repo, source }
    }

    /// Assigns a fresh reference to `booking` and inserts it.
    pub async fn insert_unique(&self, booking: &mut Booking) -> CoreResult<()> {
        for attempt in 1..=MAX_ATTEMPTS {
            let candidate = self.source.sample();

            if self.repo.reference_exists(&candidate).await? {
                debug!("Reference {} taken (attempt {})", candidate, attempt);
                continue;
            }

            booking.reference = candidate;
            match self.repo.insert_booking(booking).await {
                Ok(()) => return Ok(()),
                Err(CoreError::Conflict(_)) => {
                    warn!("Reference {} claimed concurrently, resampling", booking.reference);
                }
                Err(e) => return Err(e),
            }
        }

        error!("No free booking reference after {} attempts", MAX_ATTEMPTS);
        Err(CoreError::InternalError(format!(
            "Could not allocate a unique booking reference after {} attempts",
            MAX_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use skyward_core::booking::{BookingStatus, TripType};
    use skyward_core::clock::ManualClock;
    use skyward_core::flight::SeatClass;
    use skyward_store::memory::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Hands out a fixed list, then repeats the last entry forever
    struct Scripted(Mutex<VecDeque<&'static str>>);

    impl Scripted {
        fn new(items: &[&'static str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(items.iter().copied().collect())))
        }
    }

    impl ReferenceSource for Scripted {
        fn sample(&self) -> String {
            let mut items = self.0.lock().unwrap();
            if items.len() > 1 {
                items.pop_front().unwrap().to_string()
            } else {
                items.front().unwrap().to_string()
            }
        }
    }

    fn pending_booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            reference: String::new(),
            user_id: Uuid::new_v4(),
            trip_type: TripType::OneWay,
            outbound_flight_id: Uuid::new_v4(),
            return_flight_id: None,
            seat_class: SeatClass::Economy,
            passengers: 1,
            total_amount: Decimal::new(10000, 2),
            taxes: Decimal::new(1200, 2),
            service_fee: Decimal::new(2500, 2),
            status: BookingStatus::Pending,
            contact_email: "a@example.com".to_string(),
            contact_phone: String::new(),
            booked_at: Utc::now(),
            confirmed_at: None,
            cancelled_at: None,
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(Arc::new(ManualClock::new(Utc::now()))))
    }

    #[test]
    fn test_random_reference_shape() {
        for _ in 0..100 {
            let reference = RandomReferences.sample();
            assert_eq!(reference.len(), REFERENCE_LEN);
            assert!(reference.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_skips_references_in_use() {
        let store = store();
        let source = Scripted::new(&["AAAAAA", "AAAAAA", "BBBBBB"]);
        let generator = ReferenceGenerator::with_source(store.clone(), source);

        let mut first = pending_booking();
        generator.insert_unique(&mut first).await.unwrap();
        assert_eq!(first.reference, "AAAAAA");

        let mut second = pending_booking();
        generator.insert_unique(&mut second).await.unwrap();
        assert_eq!(second.reference, "BBBBBB");
    }

    #[tokio::test]
    async fn test_exhaustion_is_an_error_not_a_hang() {
        let store = store();
        let generator = ReferenceGenerator::with_source(store.clone(), Scripted::new(&["ZZZZZZ"]));

        generator.insert_unique(&mut pending_booking()).await.unwrap();

        let result = generator.insert_unique(&mut pending_booking()).await;
        assert!(matches!(result, Err(CoreError::InternalError(_))));
    }
}
