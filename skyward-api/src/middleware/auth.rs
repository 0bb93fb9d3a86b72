use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use skyward_core::identity::User;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

pub const CUSTOMER_ROLE: &str = "CUSTOMER";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl CustomerClaims {
    pub fn for_user(user: &User, auth: &AuthConfig) -> Self {
        Self {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: CUSTOMER_ROLE.to_owned(),
            exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
        }
    }

    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::AuthenticationError("Invalid token subject".to_string()))
    }

    pub fn encode(&self, auth: &AuthConfig) -> Result<String, AppError> {
        encode(&Header::default(), self, &EncodingKey::from_secret(auth.secret.as_bytes()))
            .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
    }
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract token from Authorization header
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    // 2. Decode and validate JWT
    let token_data = decode::<CustomerClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    // 3. Check role is CUSTOMER
    if token_data.claims.role != CUSTOMER_ROLE {
        return Err(AppError::AuthorizationError("Customer access only".to_string()));
    }

    // 4. Inject claims into request extensions
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
