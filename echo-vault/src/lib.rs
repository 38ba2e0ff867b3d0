//! echo-vault library - EchoVerse service
//!
//! Recording session, playback, unlock/timeline engine and the HTTP API
//! over them.

use axum::Router;
use echo_common::config::EchoConfig;
use echo_common::events::EventBus;
use echo_common::Clock;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod playback;
pub mod reconciler;
pub mod recording;
pub mod services;
pub mod submission;
pub mod timeline;

use playback::{AudioPlayback, PlaybackCoordinator};
use reconciler::{Reconciler, ReconcilerConfig};
use recording::{AudioCapture, RecordingController, RecordingPolicy};
use services::{AuthService, BlobStore, RecordStore};
use timeline::TimelineEngine;

/// Collaborators the service is assembled from
pub struct Backends {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub capture: Arc<dyn AudioCapture>,
    pub playback: Arc<dyn AudioPlayback>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub engine: Arc<TimelineEngine>,
    pub recorder: Arc<RecordingController>,
    pub playback: Arc<PlaybackCoordinator>,
    pub reconciler: Arc<Reconciler>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    /// Base for password reset redirects
    pub public_base_url: String,
}

impl AppState {
    /// Wire the engine, recorder, playback and reconciler over `backends`
    pub fn new(backends: Backends, config: &EchoConfig) -> Self {
        let Backends {
            auth,
            store,
            blobs,
            capture,
            playback,
            clock,
            events,
        } = backends;

        let engine = Arc::new(TimelineEngine::new(Arc::clone(&store)));
        let playback =
            Arc::new(PlaybackCoordinator::new(playback).with_events(events.clone()));
        let recorder = Arc::new(
            RecordingController::new(
                capture,
                Arc::clone(&playback),
                RecordingPolicy {
                    max_duration_secs: config.max_recording_secs,
                },
                Arc::clone(&clock),
            )
            .with_events(events.clone()),
        );
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            Arc::clone(&clock),
            ReconcilerConfig {
                interval: Duration::from_secs(config.reconcile_interval_secs),
            },
        ));

        Self {
            auth,
            store,
            blobs,
            engine,
            recorder,
            playback,
            reconciler,
            clock,
            events,
            public_base_url: config.public_base_url(),
        }
    }
}

/// Build application router
///
/// Health, sign-up/sign-in and the event stream are public; everything else,
/// blob downloads included, requires a bearer session token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/auth/session", get(api::auth::current_session))
        .route("/api/dashboard", get(api::echoes::dashboard))
        .route("/api/timeline", get(api::echoes::timeline))
        .route("/api/calendar", get(api::echoes::calendar))
        .route("/api/calendar/day", get(api::echoes::calendar_day))
        .route("/api/echoes/:id", get(api::echoes::get_echo))
        .route("/api/echoes/:id/play", post(api::echoes::play_echo))
        .route("/blobs/*path", get(api::echoes::download_audio))
        .route("/api/playback", get(api::echoes::playback_status))
        .route("/api/playback/seek", post(api::echoes::seek_playback))
        .route("/api/playback/stop", post(api::echoes::stop_playback))
        .route("/api/recording", get(api::recording::status))
        .route("/api/recording/start", post(api::recording::start))
        .route("/api/recording/stop", post(api::recording::stop))
        .route("/api/recording/discard", post(api::recording::discard))
        .route("/api/recording/preview", post(api::recording::preview))
        .route("/api/recording/submit", post(api::recording::submit))
        .route(
            "/api/profile",
            get(api::profile::get_profile).put(api::profile::update_profile),
        )
        .route(
            "/api/settings",
            get(api::settings::get_settings).put(api::settings::update_settings),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/signup", post(api::auth::sign_up))
        .route("/api/auth/login", post(api::auth::login))
        .route("/api/auth/reset-password", post(api::auth::reset_password))
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes());

    // Combine routers
    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
