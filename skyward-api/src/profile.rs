use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use skyward_core::identity::{User, UserProfile};
use skyward_identity::ProfileUpdate;

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub profile: UserProfile,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/profile", get(get_profile).put(update_profile))
}

async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user_id = claims.user_id()?;
    let user = state.accounts.find_user(user_id).await?;
    let profile = state.accounts.profile(user_id).await?;
    Ok(Json(ProfileResponse { user, profile }))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>, AppError> {
    let (user, profile) = state.accounts.update_profile(claims.user_id()?, update).await?;
    Ok(Json(ProfileResponse { user, profile }))
}
