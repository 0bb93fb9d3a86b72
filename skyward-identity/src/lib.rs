pub mod accounts;
pub mod otp;

pub use accounts::{AccountService, AccountSettings, ClientInfo, PendingVerification, ProfileUpdate, SignupRequest};
pub use otp::{IssuedOtp, OtpVerifier};
