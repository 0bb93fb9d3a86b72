use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use skyward_core::clock::Clock;
use skyward_core::identity::{FlowKind, FlowToken, LoginAttempt, NewUser, OtpPurpose, User, UserProfile};
use skyward_core::repository::{FlowStore, UserRepository};
use skyward_core::{CoreError, CoreResult};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::otp::{IssuedOtp, OtpVerifier};

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub otp_ttl: Duration,
    pub flow_ttl: Duration,
    pub password_hash_cost: u32,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            otp_ttl: Duration::minutes(10),
            flow_ttl: Duration::minutes(30),
            password_hash_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Result of a step that sends out an OTP and waits for it to come back.
#[derive(Debug, Clone)]
pub struct PendingVerification {
    pub user: User,
    pub flow_token: String,
    pub otp_code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: String,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub passport_number: String,
    #[serde(default)]
    pub emergency_contact: String,
    #[serde(default)]
    pub emergency_phone: String,
}

/// Signup, login and password reset.
///
/// The pending user of a signup or reset lives in a flow token rather than a
/// session, so each step only needs the token the previous step returned.
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    flows: Arc<dyn FlowStore>,
    otp: OtpVerifier,
    clock: Arc<dyn Clock>,
    settings: AccountSettings,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        flows: Arc<dyn FlowStore>,
        otp: OtpVerifier,
        clock: Arc<dyn Clock>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            users,
            flows,
            otp,
            clock,
            settings,
        }
    }

    pub async fn signup(&self, req: SignupRequest) -> CoreResult<PendingVerification> {
        let username = req.username.trim();
        let email = req.email.trim();

        if username.is_empty() || email.is_empty() {
            return Err(CoreError::ValidationError("Username and email are required.".to_string()));
        }
        if req.password1.is_empty() {
            return Err(CoreError::ValidationError("Password cannot be empty.".to_string()));
        }
        if req.password1 != req.password2 {
            return Err(CoreError::ValidationError("Passwords do not match.".to_string()));
        }
        if self.users.find_by_username(username).await?.is_some() {
            return Err(CoreError::ValidationError("Username already exists.".to_string()));
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(CoreError::ValidationError("Email already registered.".to_string()));
        }

        let user = self
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: self.hash_password(&req.password1)?,
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
            })
            .await?;

        self.users.get_or_init_profile(user.id).await?;

        let issued = self.otp.issue(user.id, OtpPurpose::Signup, self.settings.otp_ttl).await?;
        let flow_token = self.open_flow(FlowKind::Signup, user.id).await?;

        info!("Registered user {} ({}), awaiting email verification", user.username, user.id);

        Ok(PendingVerification {
            user,
            flow_token,
            otp_code: issued.code,
            expires_at: issued.expires_at,
        })
    }

    /// Second signup step: the emailed code proves the address.
    pub async fn verify_signup(&self, flow_token: &str, code: &str) -> CoreResult<User> {
        let user = self.resume_flow(flow_token, FlowKind::Signup).await?;

        self.otp.check(user.id, code.trim(), OtpPurpose::Signup).await?;

        let mut profile = self.users.get_or_init_profile(user.id).await?;
        profile.email_verified = true;
        profile.updated_at = self.clock.now();
        self.users.save_profile(&profile).await?;

        self.flows.remove_flow(flow_token).await?;

        info!("Email verified for user {}", user.username);
        Ok(user)
    }

    /// Every attempt is recorded. Nothing is throttled.
    pub async fn login(&self, username: &str, password: &str, client: ClientInfo) -> CoreResult<User> {
        let user = self.users.find_by_username(username.trim()).await?;

        let authenticated = match &user {
            Some(user) => bcrypt::verify(password, &user.password_hash)
                .map_err(|e| CoreError::InternalError(format!("Password check failed: {}", e)))?,
            None => false,
        };

        let attempt = LoginAttempt {
            id: Uuid::new_v4(),
            user_id: user.as_ref().map(|u| u.id),
            ip_address: client.ip_address.clone(),
            success: authenticated,
            user_agent: client.user_agent,
            attempted_at: self.clock.now(),
        };
        self.users.record_login_attempt(&attempt).await?;

        match user {
            Some(user) if authenticated => {
                info!("Login for {} from {}", user.username, client.ip_address);
                Ok(user)
            }
            _ => {
                warn!("Failed login for {} from {}", username, client.ip_address);
                Err(CoreError::ValidationError("Invalid username or password.".to_string()))
            }
        }
    }

    /// Issue a login-purpose code for an existing user.
    pub async fn request_login_otp(&self, user_id: Uuid) -> CoreResult<IssuedOtp> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("User not found.".to_string()))?;

        self.otp.issue(user_id, OtpPurpose::Login, self.settings.otp_ttl).await
    }

    pub async fn request_password_reset(&self, email: &str) -> CoreResult<PendingVerification> {
        let user = self
            .users
            .find_by_email(email.trim())
            .await?
            .ok_or_else(|| CoreError::NotFound("No account found with this email address.".to_string()))?;

        let issued = self.otp.issue(user.id, OtpPurpose::PasswordReset, self.settings.otp_ttl).await?;
        let flow_token = self.open_flow(FlowKind::PasswordReset, user.id).await?;

        info!("Password reset requested for user {}", user.username);

        Ok(PendingVerification {
            user,
            flow_token,
            otp_code: issued.code,
            expires_at: issued.expires_at,
        })
    }

    pub async fn confirm_password_reset(
        &self,
        flow_token: &str,
        code: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> CoreResult<User> {
        let user = self.resume_flow(flow_token, FlowKind::PasswordReset).await?;

        if new_password.is_empty() {
            return Err(CoreError::ValidationError("Password cannot be empty.".to_string()));
        }
        if new_password != confirm_password {
            return Err(CoreError::ValidationError("Passwords do not match.".to_string()));
        }

        self.otp.check(user.id, code.trim(), OtpPurpose::PasswordReset).await?;

        let hash = self.hash_password(new_password)?;
        self.users.set_password(user.id, &hash).await?;
        self.flows.remove_flow(flow_token).await?;

        info!("Password reset completed for user {}", user.username);
        Ok(user)
    }

    /// The user's profile, created empty on first access.
    pub async fn profile(&self, user_id: Uuid) -> CoreResult<UserProfile> {
        self.users.get_or_init_profile(user_id).await
    }

    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> CoreResult<(User, UserProfile)> {
        let mut user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("User not found.".to_string()))?;

        if let Some(email) = update.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            if email != user.email {
                if let Some(other) = self.users.find_by_email(email).await? {
                    if other.id != user.id {
                        return Err(CoreError::ValidationError("Email already registered.".to_string()));
                    }
                }
                user.email = email.to_string();
            }
        }
        user.first_name = update.first_name.trim().to_string();
        user.last_name = update.last_name.trim().to_string();
        self.users.update_user(&user).await?;

        let mut profile = self.users.get_or_init_profile(user_id).await?;
        profile.phone_number = update.phone_number;
        profile.date_of_birth = update.date_of_birth;
        profile.passport_number = update.passport_number;
        profile.emergency_contact = update.emergency_contact;
        profile.emergency_phone = update.emergency_phone;
        profile.updated_at = self.clock.now();
        self.users.save_profile(&profile).await?;

        Ok((user, profile))
    }

    pub async fn find_user(&self, user_id: Uuid) -> CoreResult<User> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("User not found.".to_string()))
    }

    fn hash_password(&self, password: &str) -> CoreResult<String> {
        bcrypt::hash(password, self.settings.password_hash_cost)
            .map_err(|e| CoreError::InternalError(format!("Password hashing failed: {}", e)))
    }

    async fn open_flow(&self, kind: FlowKind, user_id: Uuid) -> CoreResult<String> {
        let flow = FlowToken::new(
            kind,
            user_id.to_string(),
            serde_json::json!({}),
            self.clock.now() + self.settings.flow_ttl,
        );
        self.flows.put_flow(&flow).await?;
        Ok(flow.token)
    }

    async fn resume_flow(&self, flow_token: &str, kind: FlowKind) -> CoreResult<User> {
        let flow = self
            .flows
            .get_flow(flow_token)
            .await?
            .filter(|flow| flow.kind == kind)
            .ok_or_else(|| CoreError::NotFound("Session expired. Please try again.".to_string()))?;

        let user_id = Uuid::parse_str(&flow.subject)
            .map_err(|e| CoreError::InternalError(format!("Corrupt flow subject: {}", e)))?;

        self.find_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyward_core::clock::ManualClock;
    use skyward_store::memory::MemoryStore;

    struct Harness {
        accounts: AccountService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let settings = AccountSettings {
            password_hash_cost: 4,
            ..AccountSettings::default()
        };
        let accounts = AccountService::new(
            store.clone(),
            store.clone(),
            OtpVerifier::new(store.clone(), clock.clone()),
            clock.clone(),
            settings,
        );
        Harness { accounts, store, clock }
    }

    fn signup_request(username: &str, email: &str) -> SignupRequest {
        SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password1: "s3cret-pass".to_string(),
            password2: "s3cret-pass".to_string(),
            first_name: "Maya".to_string(),
            last_name: "Tan".to_string(),
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip_address: "203.0.113.7".to_string(),
            user_agent: "test-agent".to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_and_verify() {
        let h = harness();

        let pending = h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();
        assert_eq!(pending.otp_code.len(), 6);
        assert!(!h.accounts.profile(pending.user.id).await.unwrap().email_verified);

        let user = h.accounts.verify_signup(&pending.flow_token, &pending.otp_code).await.unwrap();
        assert_eq!(user.id, pending.user.id);
        assert!(h.accounts.profile(user.id).await.unwrap().email_verified);

        // Token is consumed
        let replay = h.accounts.verify_signup(&pending.flow_token, &pending.otp_code).await;
        assert!(matches!(replay, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let h = harness();

        let mut mismatch = signup_request("maya", "maya@example.com");
        mismatch.password2 = "other".to_string();
        assert!(matches!(h.accounts.signup(mismatch).await, Err(CoreError::ValidationError(_))));

        h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();

        let dup_username = h.accounts.signup(signup_request("maya", "other@example.com")).await;
        assert!(matches!(dup_username, Err(CoreError::ValidationError(msg)) if msg.contains("Username")));

        let dup_email = h.accounts.signup(signup_request("maya2", "maya@example.com")).await;
        assert!(matches!(dup_email, Err(CoreError::ValidationError(msg)) if msg.contains("Email")));
    }

    #[tokio::test]
    async fn test_signup_code_expires() {
        let h = harness();

        let pending = h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();
        h.clock.advance(Duration::minutes(11));

        let result = h.accounts.verify_signup(&pending.flow_token, &pending.otp_code).await;
        assert!(matches!(result, Err(CoreError::Expired(_))));
    }

    #[tokio::test]
    async fn test_login_records_attempts() {
        let h = harness();
        h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();

        let bad = h.accounts.login("maya", "wrong", client()).await;
        assert!(matches!(bad, Err(CoreError::ValidationError(_))));

        let unknown = h.accounts.login("nobody", "wrong", client()).await;
        assert!(unknown.is_err());

        let user = h.accounts.login("maya", "s3cret-pass", client()).await.unwrap();
        assert_eq!(user.username, "maya");

        let attempts = h.store.login_attempts().await;
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts.iter().filter(|a| a.success).count(), 1);
        assert!(attempts[1].user_id.is_none());
        assert_eq!(attempts[2].ip_address, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let h = harness();
        h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();

        let missing = h.accounts.request_password_reset("ghost@example.com").await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let pending = h.accounts.request_password_reset("maya@example.com").await.unwrap();

        let mismatch = h
            .accounts
            .confirm_password_reset(&pending.flow_token, &pending.otp_code, "new-pass", "nope")
            .await;
        assert!(matches!(mismatch, Err(CoreError::ValidationError(_))));

        h.accounts
            .confirm_password_reset(&pending.flow_token, &pending.otp_code, "new-pass", "new-pass")
            .await
            .unwrap();

        assert!(h.accounts.login("maya", "s3cret-pass", client()).await.is_err());
        assert!(h.accounts.login("maya", "new-pass", client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_token_cannot_verify_signup() {
        let h = harness();
        h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();

        let pending = h.accounts.request_password_reset("maya@example.com").await.unwrap();
        let result = h.accounts.verify_signup(&pending.flow_token, &pending.otp_code).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_profile_get_or_init_and_update() {
        let h = harness();
        let pending = h.accounts.signup(signup_request("maya", "maya@example.com")).await.unwrap();
        h.accounts.signup(signup_request("lee", "lee@example.com")).await.unwrap();

        let profile = h.accounts.profile(pending.user.id).await.unwrap();
        assert!(profile.passport_number.is_empty());

        let taken = h
            .accounts
            .update_profile(
                pending.user.id,
                ProfileUpdate {
                    email: Some("lee@example.com".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(CoreError::ValidationError(_))));

        let (user, profile) = h
            .accounts
            .update_profile(
                pending.user.id,
                ProfileUpdate {
                    first_name: "Maya".to_string(),
                    last_name: "Lim".to_string(),
                    email: Some("maya.lim@example.com".to_string()),
                    passport_number: "E1234567".to_string(),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(user.email, "maya.lim@example.com");
        assert_eq!(user.display_name(), "Maya Lim");
        assert_eq!(profile.passport_number, "E1234567");
    }
}
