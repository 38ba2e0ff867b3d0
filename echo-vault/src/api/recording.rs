//! Recording session endpoints

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Local;

use super::{ApiResult, AuthUser};
use crate::playback::PlaybackStatus;
use crate::recording::RecordingStatus;
use crate::submission::EchoDetails;
use crate::timeline::EchoView;
use crate::AppState;

/// GET /api/recording
pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<RecordingStatus> {
    Json(state.recorder.status(user.user_id).await)
}

/// POST /api/recording/start
///
/// 409 while another account holds the microphone.
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<RecordingStatus>> {
    Ok(Json(state.recorder.start(user.user_id).await?))
}

/// POST /api/recording/stop
pub async fn stop(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<RecordingStatus>> {
    Ok(Json(state.recorder.stop(user.user_id).await?))
}

/// POST /api/recording/discard
pub async fn discard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<RecordingStatus>> {
    Ok(Json(state.recorder.discard(user.user_id).await?))
}

/// POST /api/recording/preview
pub async fn preview(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<PlaybackStatus>> {
    Ok(Json(state.recorder.toggle_preview(user.user_id).await?))
}

/// POST /api/recording/submit
pub async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(details): Json<EchoDetails>,
) -> ApiResult<(StatusCode, Json<EchoView>)> {
    let echo = state
        .recorder
        .submit(
            state.blobs.as_ref(),
            state.store.as_ref(),
            user.user_id,
            details,
        )
        .await?;
    let view = EchoView::new(&echo, state.clock.now(), &Local);
    Ok((StatusCode::CREATED, Json(view)))
}
