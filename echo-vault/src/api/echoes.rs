//! Dashboard, timeline, calendar and echo playback endpoints
//!
//! Every read goes through a reconciled snapshot. Dates are bucketed in the
//! server's local time zone.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName},
    Extension, Json,
};
use bytes::Bytes;
use chrono::{Datelike, Local, NaiveDate};
use echo_common::human_time::format_day;
use echo_common::models::Echo;
use echo_common::Error;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiError, ApiResult, AuthUser};
use crate::playback::{PlaybackStatus, PlaybackTarget};
use crate::recording::capture::WAV_MIME;
use crate::recording::AudioClip;
use crate::timeline::{
    CalendarView, DashboardView, DayView, EchoView, LockFilter, TimelineSnapshot, TimelineView,
};
use crate::AppState;

async fn snapshot(state: &AppState, owner: Uuid) -> ApiResult<TimelineSnapshot> {
    Ok(state.engine.snapshot(owner, state.clock.now()).await?)
}

/// The echo, or `Locked` while its unlock date is ahead
fn unlocked_echo(snapshot: &TimelineSnapshot, id: Uuid) -> ApiResult<Echo> {
    let echo = snapshot
        .find(id)
        .ok_or_else(|| Error::NotFound(format!("Echo {}", id)))?;
    if !echo.unlocked {
        let day = format_day(echo.unlock_date.with_timezone(&Local).date_naive());
        return Err(Error::Locked(day).into());
    }
    Ok(echo.clone())
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub filter: LockFilter,
}

/// GET /api/dashboard?filter=all|unlocked|locked
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardView>> {
    let snapshot = snapshot(&state, user.user_id).await?;
    Ok(Json(snapshot.dashboard(query.filter, &Local)))
}

#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub q: Option<String>,
    pub mood: Option<String>,
}

/// GET /api/timeline?q=&mood=
pub async fn timeline(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<TimelineView>> {
    let snapshot = snapshot(&state, user.user_id).await?;
    Ok(Json(snapshot.timeline(
        query.q.as_deref(),
        query.mood.as_deref(),
        &Local,
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// GET /api/calendar?year=&month=
///
/// Defaults to the current month.
pub async fn calendar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<CalendarView>> {
    let today = state.clock.now().with_timezone(&Local).date_naive();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::BadRequest(format!("No such month: {}-{}", year, month)))?;

    let snapshot = snapshot(&state, user.user_id).await?;
    Ok(Json(snapshot.calendar(first, &Local)))
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: NaiveDate,
}

/// GET /api/calendar/day?date=YYYY-MM-DD
pub async fn calendar_day(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DayQuery>,
) -> ApiResult<Json<DayView>> {
    let snapshot = snapshot(&state, user.user_id).await?;
    Ok(Json(snapshot.day(query.date, &Local)))
}

/// GET /api/echoes/:id
pub async fn get_echo(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EchoView>> {
    let snapshot = snapshot(&state, user.user_id).await?;
    let echo = unlocked_echo(&snapshot, id)?;
    Ok(Json(EchoView::new(&echo, snapshot.now, &Local)))
}

/// POST /api/echoes/:id/play
///
/// Toggles play/pause; an ended echo restarts from the beginning.
pub async fn play_echo(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PlaybackStatus>> {
    let snapshot = snapshot(&state, user.user_id).await?;
    let echo = unlocked_echo(&snapshot, id)?;

    let path = state
        .blobs
        .path_for_url(&echo.audio_url)
        .ok_or_else(|| Error::NotFound(format!("Audio for echo {}", id)))?;
    let bytes = state.blobs.download(&path).await?;
    let clip = AudioClip::new(bytes, WAV_MIME).with_duration(echo.duration_seconds as f64);

    Ok(Json(state.playback.toggle(
        user.user_id,
        PlaybackTarget::Echo(id),
        &clip,
    )?))
}

/// GET /blobs/*path
///
/// Audio of the caller's own echoes, once unlocked.
pub async fn download_audio(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<String>,
) -> ApiResult<([(HeaderName, &'static str); 1], Bytes)> {
    let snapshot = snapshot(&state, user.user_id).await?;
    let url = state.blobs.public_url(&path);
    let id = snapshot
        .echoes
        .iter()
        .find(|e| e.audio_url == url)
        .map(|e| e.id)
        .ok_or_else(|| Error::NotFound(format!("Audio {}", path)))?;
    unlocked_echo(&snapshot, id)?;

    let bytes = state.blobs.download(&path).await?;
    Ok(([(header::CONTENT_TYPE, WAV_MIME)], bytes))
}

/// GET /api/playback
pub async fn playback_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<PlaybackStatus> {
    Json(state.playback.status(user.user_id))
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position_secs: f64,
}

/// POST /api/playback/seek
pub async fn seek_playback(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SeekRequest>,
) -> ApiResult<Json<PlaybackStatus>> {
    Ok(Json(state.playback.seek(user.user_id, request.position_secs)?))
}

/// POST /api/playback/stop
pub async fn stop_playback(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<PlaybackStatus>> {
    Ok(Json(state.playback.stop(user.user_id)?))
}
