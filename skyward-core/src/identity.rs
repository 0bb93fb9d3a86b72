use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub phone_number: String,
    pub date_of_birth: Option<NaiveDate>,
    pub passport_number: String,
    pub emergency_contact: String,
    pub emergency_phone: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn empty(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            phone_number: String::new(),
            date_of_birth: None,
            passport_number: String::new(),
            emergency_contact: String::new(),
            emergency_phone: String::new(),
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Signup,
    Login,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::Login => "login",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(OtpPurpose::Signup),
            "login" => Ok(OtpPurpose::Login),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            other => Err(CoreError::ValidationError(format!("Unknown OTP purpose: {}", other))),
        }
    }
}

/// A one-time code. Usable at most once and never after `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpVerification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub purpose: OtpPurpose,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub success: bool,
    pub user_agent: String,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Signup,
    PasswordReset,
    PassengerDraft,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Signup => "signup",
            FlowKind::PasswordReset => "password_reset",
            FlowKind::PassengerDraft => "passenger_draft",
        }
    }
}

impl FromStr for FlowKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(FlowKind::Signup),
            "password_reset" => Ok(FlowKind::PasswordReset),
            "passenger_draft" => Ok(FlowKind::PassengerDraft),
            other => Err(CoreError::ValidationError(format!("Unknown flow kind: {}", other))),
        }
    }
}

/// Short-lived server-side state for a multi-step flow, keyed by an opaque token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowToken {
    pub token: String,
    pub kind: FlowKind,
    /// User id or booking reference the flow is bound to
    pub subject: String,
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl FlowToken {
    pub fn new(kind: FlowKind, subject: String, payload: serde_json::Value, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            kind,
            subject,
            payload,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
