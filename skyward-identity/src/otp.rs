use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use skyward_core::clock::Clock;
use skyward_core::identity::{OtpPurpose, OtpVerification};
use skyward_core::repository::OtpRepository;
use skyward_core::{CoreError, CoreResult};
use skyward_shared::Masked;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A freshly stored code. The code would go out by email; here it is handed back.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub otp_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks one-time codes.
///
/// Expiry is evaluated lazily at check time; nothing purges old codes.
/// Failed checks are not counted or throttled.
pub struct OtpVerifier {
    repo: Arc<dyn OtpRepository>,
    clock: Arc<dyn Clock>,
}

impl OtpVerifier {
    pub fn new(repo: Arc<dyn OtpRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn issue(&self, user_id: Uuid, purpose: OtpPurpose, ttl: Duration) -> CoreResult<IssuedOtp> {
        let now = self.clock.now();
        let otp = OtpVerification {
            id: Uuid::new_v4(),
            user_id,
            code: generate_code(),
            purpose,
            is_verified: false,
            created_at: now,
            expires_at: now + ttl,
        };

        self.repo.insert_otp(&otp).await?;

        info!(
            "Issued {} OTP {} for user {} (expires {})",
            purpose,
            Masked::new(otp.code.as_str()),
            user_id,
            otp.expires_at
        );

        Ok(IssuedOtp {
            otp_id: otp.id,
            code: otp.code,
            expires_at: otp.expires_at,
        })
    }

    /// Consume a code. Succeeds once per code, and only before it expires.
    pub async fn check(&self, user_id: Uuid, code: &str, purpose: OtpPurpose) -> CoreResult<OtpVerification> {
        let mut otp = self
            .repo
            .find_unverified(user_id, code, purpose)
            .await?
            .ok_or_else(|| {
                warn!("No matching {} OTP for user {}", purpose, user_id);
                CoreError::NotFound("Invalid OTP code.".to_string())
            })?;

        if otp.is_expired(self.clock.now()) {
            warn!("Expired {} OTP presented for user {}", purpose, user_id);
            return Err(CoreError::Expired(
                "OTP has expired. Please request a new one.".to_string(),
            ));
        }

        // Another request may have consumed it between the lookup and now
        if !self.repo.mark_verified(otp.id).await? {
            return Err(CoreError::NotFound("Invalid OTP code.".to_string()));
        }

        otp.is_verified = true;
        info!("Verified {} OTP for user {}", purpose, user_id);
        Ok(otp)
    }
}

/// Six decimal digits, leading zeros kept
fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyward_core::clock::ManualClock;
    use skyward_store::memory::MemoryStore;

    fn setup() -> (OtpVerifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (OtpVerifier::new(store, clock.clone()), clock)
    }

    #[test]
    fn test_code_shape() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let (verifier, _clock) = setup();
        let user_id = Uuid::new_v4();

        let issued = verifier.issue(user_id, OtpPurpose::Signup, Duration::minutes(10)).await.unwrap();

        let verified = verifier.check(user_id, &issued.code, OtpPurpose::Signup).await.unwrap();
        assert!(verified.is_verified);

        let again = verifier.check(user_id, &issued.code, OtpPurpose::Signup).await;
        assert!(matches!(again, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let (verifier, clock) = setup();
        let user_id = Uuid::new_v4();

        let issued = verifier.issue(user_id, OtpPurpose::PasswordReset, Duration::minutes(10)).await.unwrap();
        clock.advance(Duration::minutes(11));

        let result = verifier.check(user_id, &issued.code, OtpPurpose::PasswordReset).await;
        assert!(matches!(result, Err(CoreError::Expired(_))));
    }

    #[tokio::test]
    async fn test_code_valid_up_to_expiry() {
        let (verifier, clock) = setup();
        let user_id = Uuid::new_v4();

        let issued = verifier.issue(user_id, OtpPurpose::Login, Duration::minutes(10)).await.unwrap();
        clock.advance(Duration::minutes(10));

        assert!(verifier.check(user_id, &issued.code, OtpPurpose::Login).await.is_ok());
    }

    #[tokio::test]
    async fn test_purpose_and_user_must_match() {
        let (verifier, _clock) = setup();
        let user_id = Uuid::new_v4();

        let issued = verifier.issue(user_id, OtpPurpose::Signup, Duration::minutes(10)).await.unwrap();

        let wrong_purpose = verifier.check(user_id, &issued.code, OtpPurpose::PasswordReset).await;
        assert!(matches!(wrong_purpose, Err(CoreError::NotFound(_))));

        let wrong_user = verifier.check(Uuid::new_v4(), &issued.code, OtpPurpose::Signup).await;
        assert!(matches!(wrong_user, Err(CoreError::NotFound(_))));

        let wrong_code = if issued.code == "000000" { "000001" } else { "000000" };
        let mismatch = verifier.check(user_id, wrong_code, OtpPurpose::Signup).await;
        assert!(matches!(mismatch, Err(CoreError::NotFound(_))));

        // None of the failures consumed the real code
        assert!(verifier.check(user_id, &issued.code, OtpPurpose::Signup).await.is_ok());
    }
}
