use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyward_core::identity::User;
use skyward_identity::{ClientInfo, PendingVerification, SignupRequest};
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// A flow waiting for its OTP. The code is only echoed when `expose_otp` is on.
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub user_id: Uuid,
    pub flow_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OtpResponse {
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub flow_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub flow_token: String,
    pub code: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/signup", post(signup))
        .route("/v1/auth/signup/verify", post(verify_signup))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/password-reset", post(request_password_reset))
        .route("/v1/auth/password-reset/confirm", post(confirm_password_reset))
}

/// Routes that need a signed-in customer
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/v1/auth/otp", post(request_login_otp))
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<PendingResponse>), AppError> {
    let pending = state.accounts.signup(req).await?;
    Ok((StatusCode::CREATED, Json(pending_response(&state, pending))))
}

async fn verify_signup(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state.accounts.verify_signup(&req.flow_token, &req.code).await?;
    issue_token(&state, user)
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .accounts
        .login(&req.username, &req.password, client_info(&headers))
        .await?;
    issue_token(&state, user)
}

async fn request_login_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<OtpResponse>, AppError> {
    let issued = state.accounts.request_login_otp(claims.user_id()?).await?;
    Ok(Json(OtpResponse {
        expires_at: issued.expires_at,
        otp_code: state.auth.expose_otp.then_some(issued.code),
    }))
}

async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<PendingResponse>, AppError> {
    let pending = state.accounts.request_password_reset(&req.email).await?;
    Ok(Json(pending_response(&state, pending)))
}

async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetConfirmRequest>,
) -> Result<StatusCode, AppError> {
    state
        .accounts
        .confirm_password_reset(&req.flow_token, &req.code, &req.new_password, &req.confirm_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn issue_token(state: &AppState, user: User) -> Result<Json<AuthResponse>, AppError> {
    let token = CustomerClaims::for_user(&user, &state.auth).encode(&state.auth)?;
    Ok(Json(AuthResponse { token, user }))
}

fn pending_response(state: &AppState, pending: PendingVerification) -> PendingResponse {
    PendingResponse {
        user_id: pending.user.id,
        flow_token: pending.flow_token,
        expires_at: pending.expires_at,
        otp_code: state.auth.expose_otp.then_some(pending.otp_code),
    }
}

/// Client address as reported by the proxy in front of us
fn client_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    ClientInfo {
        ip_address,
        user_agent: header_str(headers, header::USER_AGENT.as_str()).unwrap_or_default().to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
