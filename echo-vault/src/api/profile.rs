//! Profile endpoints

use axum::{extract::State, Extension, Json};
use echo_common::models::{Profile, ProfileUpdate};
use echo_common::Error;

use super::{ApiResult, AuthUser};
use crate::AppState;

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Profile>> {
    let profile = state
        .store
        .get_profile(user.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("Profile".to_string()))?;
    Ok(Json(profile))
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Profile>> {
    let update = ProfileUpdate {
        first_name: update.first_name.trim().to_string(),
        last_name: update.last_name.trim().to_string(),
        bio: update.bio.trim().to_string(),
    };
    Ok(Json(state.store.update_profile(user.user_id, update).await?))
}
