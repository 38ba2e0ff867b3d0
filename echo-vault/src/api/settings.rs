//! User settings endpoints

use axum::{extract::State, Extension, Json};
use echo_common::models::{NotificationFrequency, UserSettings};
use serde::Deserialize;

use super::{ApiResult, AuthUser};
use crate::AppState;

/// Partial settings update; absent fields keep their value
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub time_capsule_enabled: Option<bool>,
    pub email_notifications: Option<bool>,
    pub unlock_notifications: Option<bool>,
    pub notification_frequency: Option<NotificationFrequency>,
    pub dark_mode: Option<bool>,
}

impl SettingsUpdate {
    fn apply(self, settings: &mut UserSettings) {
        if let Some(v) = self.time_capsule_enabled {
            settings.time_capsule_enabled = v;
        }
        if let Some(v) = self.email_notifications {
            settings.email_notifications = v;
        }
        if let Some(v) = self.unlock_notifications {
            settings.unlock_notifications = v;
        }
        if let Some(v) = self.notification_frequency {
            settings.notification_frequency = v;
        }
        if let Some(v) = self.dark_mode {
            settings.dark_mode = v;
        }
    }
}

async fn current(state: &AppState, user: &AuthUser) -> ApiResult<UserSettings> {
    Ok(state
        .store
        .get_settings(user.user_id)
        .await?
        .unwrap_or_else(|| UserSettings::defaults_for(user.user_id, state.clock.now())))
}

/// GET /api/settings
///
/// Accounts without a stored row get the defaults.
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserSettings>> {
    Ok(Json(current(&state, &user).await?))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<UserSettings>> {
    let mut settings = current(&state, &user).await?;
    update.apply(&mut settings);
    settings.updated_at = state.clock.now();
    Ok(Json(state.store.upsert_settings(settings).await?))
}
