use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use skyward_core::identity::{LoginAttempt, NewUser, OtpPurpose, OtpVerification, User, UserProfile};
use skyward_core::repository::{OtpRepository, UserRepository};
use skyward_core::{CoreError, CoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{internal, is_unique_violation};

/// Accounts, profiles, login audit and OTP codes
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    is_staff: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            is_staff: row.is_staff,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    phone_number: String,
    date_of_birth: Option<NaiveDate>,
    passport_number: String,
    emergency_contact: String,
    emergency_phone: String,
    email_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        UserProfile {
            user_id: row.user_id,
            phone_number: row.phone_number,
            date_of_birth: row.date_of_birth,
            passport_number: row.passport_number,
            emergency_contact: row.emergency_contact,
            emergency_phone: row.emergency_phone,
            email_verified: row.email_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OtpRow {
    id: Uuid,
    user_id: Uuid,
    code: String,
    purpose: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<OtpRow> for OtpVerification {
    type Error = CoreError;

    fn try_from(row: OtpRow) -> Result<Self, Self::Error> {
        Ok(OtpVerification {
            id: row.id,
            user_id: row.user_id,
            code: row.code,
            purpose: row.purpose.parse()?,
            is_verified: row.is_verified,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, is_staff, created_at";

const PROFILE_COLUMNS: &str = "user_id, phone_number, date_of_birth, passport_number, emergency_contact, \
     emergency_phone, email_verified, created_at, updated_at";

impl PostgresUserRepository {
    async fn find_one(&self, column: &str, value: &str) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create_user(&self, user: NewUser) -> CoreResult<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, password_hash, first_name, last_name) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        );

        let row: UserRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::ValidationError("Username or email already registered.".to_string())
                } else {
                    internal(e)
                }
            })?;

        Ok(row.into())
    }

    async fn find_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let result = sqlx::query("UPDATE users SET email = $2, first_name = $3, last_name = $4 WHERE id = $1")
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::ValidationError("Email already registered.".to_string())
                } else {
                    internal(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }

    async fn set_password(&self, user_id: Uuid, password_hash: &str) -> CoreResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn get_or_init_profile(&self, user_id: Uuid) -> CoreResult<UserProfile> {
        // No-op update on conflict so RETURNING yields the existing row too
        let sql = format!(
            "INSERT INTO user_profiles (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING {}",
            PROFILE_COLUMNS
        );

        let row: ProfileRow = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
        Ok(row.into())
    }

    async fn save_profile(&self, profile: &UserProfile) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, phone_number, date_of_birth, passport_number,
                emergency_contact, emergency_phone, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE SET
                phone_number = EXCLUDED.phone_number,
                date_of_birth = EXCLUDED.date_of_birth,
                passport_number = EXCLUDED.passport_number,
                emergency_contact = EXCLUDED.emergency_contact,
                emergency_phone = EXCLUDED.emergency_phone,
                email_verified = EXCLUDED.email_verified,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.phone_number)
        .bind(profile.date_of_birth)
        .bind(&profile.passport_number)
        .bind(&profile.emergency_contact)
        .bind(&profile.emergency_phone)
        .bind(profile.email_verified)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        Ok(())
    }

    async fn record_login_attempt(&self, attempt: &LoginAttempt) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO login_attempts (id, user_id, ip_address, success, user_agent, attempted_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(&attempt.ip_address)
        .bind(attempt.success)
        .bind(&attempt.user_agent)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        Ok(())
    }
}

#[async_trait]
impl OtpRepository for PostgresUserRepository {
    async fn insert_otp(&self, otp: &OtpVerification) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO otp_verifications (id, user_id, code, purpose, is_verified, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(otp.id)
        .bind(otp.user_id)
        .bind(&otp.code)
        .bind(otp.purpose.as_str())
        .bind(otp.is_verified)
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        Ok(())
    }

    async fn find_unverified(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: OtpPurpose,
    ) -> CoreResult<Option<OtpVerification>> {
        let row: Option<OtpRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, code, purpose, is_verified, created_at, expires_at
            FROM otp_verifications
            WHERE user_id = $1 AND code = $2 AND purpose = $3 AND NOT is_verified
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        row.map(OtpVerification::try_from).transpose()
    }

    async fn mark_verified(&self, otp_id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("UPDATE otp_verifications SET is_verified = TRUE WHERE id = $1 AND NOT is_verified")
            .bind(otp_id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;

        Ok(result.rows_affected() == 1)
    }
}
