//! Integration tests for echo-vault API endpoints
//!
//! Runs the full router over an in-memory SQLite database with in-memory
//! blobs, fake audio devices and a manual clock.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use echo_common::config::EchoConfig;
use echo_common::db::init_memory_database;
use echo_common::events::EventBus;
use echo_common::ManualClock;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

use echo_vault::playback::fake::FakePlayback;
use echo_vault::recording::fake::FakeCapture;
use echo_vault::services::{MemoryBlobStore, SqliteAuthService, SqliteRecordStore};
use echo_vault::{build_router, AppState, Backends};

struct TestApp {
    router: Router,
    clock: ManualClock,
    blobs: Arc<MemoryBlobStore>,
    capture: FakeCapture,
}

async fn setup_app() -> TestApp {
    let pool = init_memory_database().await.expect("Should open memory database");
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap());
    let events = EventBus::new(64);
    let blobs = Arc::new(MemoryBlobStore::new("http://localhost:5740"));
    let capture = FakeCapture::new();

    let state = AppState::new(
        Backends {
            auth: Arc::new(SqliteAuthService::new(
                pool.clone(),
                Arc::new(clock.clone()),
                Duration::hours(24 * 30),
            )),
            store: Arc::new(SqliteRecordStore::new(pool, events.clone())),
            blobs: blobs.clone(),
            capture: Arc::new(capture.clone()),
            playback: Arc::new(FakePlayback::new()),
            clock: Arc::new(clock.clone()),
            events,
        },
        &EchoConfig::default(),
    );

    TestApp {
        router: build_router(state),
        clock,
        blobs,
        capture,
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

async fn send_raw(app: &TestApp, request: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    (status, content_type, bytes.to_vec())
}

/// Sign up and sign in as `email`; returns the session token
async fn sign_in_as(app: &TestApp, email: &str, first_name: &str) -> String {
    let (status, _) = send(
        app,
        request(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({
                "email": email,
                "password": "correct horse",
                "first_name": first_name,
                "last_name": "Lovelace",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": "correct horse" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn sign_in(app: &TestApp) -> String {
    sign_in_as(app, "ada@example.com", "Ada").await
}

async fn user_id(app: &TestApp, token: &str) -> String {
    let (_, body) = send(app, request("GET", "/api/auth/session", Some(token), None)).await;
    body["user"]["id"].as_str().unwrap().to_string()
}

/// Record and submit an echo unlocking in 24 hours; returns its id
async fn record_echo(app: &TestApp, token: &str) -> String {
    let (status, body) = send(app, request("POST", "/api/recording/start", Some(token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");

    let (status, body) = send(app, request("POST", "/api/recording/stop", Some(token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["has_clip"], true);

    let unlock = app.clock_now() + Duration::hours(24);
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/recording/submit",
            Some(token),
            Some(json!({
                "title": "First echo",
                "mood": "hopeful",
                "unlock_date": unlock.to_rfc3339(),
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["unlocked"], false);
    body["id"].as_str().unwrap().to_string()
}

impl TestApp {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use echo_common::Clock;
        self.clock.now()
    }
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "echo-vault");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = setup_app().await;

    let (status, body) = send(&app, request("GET", "/api/dashboard", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["retryable"], false);

    let (status, _) = send(&app, request("GET", "/api/dashboard", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failure_and_logout() {
    let app = setup_app().await;
    let token = sign_in(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH");

    let (status, body) = send(&app, request("GET", "/api/auth/session", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, _) = send(&app, request("POST", "/api/auth/logout", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("GET", "/api/auth/session", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reset_password_accepts_unknown_address() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/reset-password",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "sent");
}

// =============================================================================
// Recording, unlock and playback
// =============================================================================

#[tokio::test]
async fn test_echo_unlocks_after_its_date() {
    let app = setup_app().await;
    let token = sign_in(&app).await;
    let id = record_echo(&app, &token).await;
    assert_eq!(app.blobs.upload_calls(), 1);
    assert_eq!(app.capture.stop_calls(), 1);

    let (status, body) = send(&app, request("GET", "/api/dashboard", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["total"], 1);
    assert_eq!(body["stats"]["locked"], 1);
    assert!(body["featured"].is_null());
    assert_eq!(body["echoes"][0]["countdown"]["remaining"], "1 day");

    let uri = format!("/api/echoes/{}", id);
    let (status, body) = send(&app, request("GET", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "LOCKED");

    app.clock.advance(Duration::hours(25));

    let (status, body) = send(&app, request("GET", "/api/dashboard", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["unlocked"], 1);
    assert_eq!(body["featured"]["id"], id.as_str());
    assert_eq!(body["newly_unlocked"][0], id.as_str());

    let (status, body) = send(&app, request("GET", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "First echo");
    assert_eq!(body["mood_label"], "Hopeful");

    let play = format!("/api/echoes/{}/play", id);
    let (status, body) = send(&app, request("POST", &play, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "playing");

    let (status, body) = send(&app, request("POST", &play, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "paused");

    let (status, body) = send(&app, request("POST", "/api/playback/stop", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
}

#[tokio::test]
async fn test_submit_rejects_past_unlock_date() {
    let app = setup_app().await;
    let token = sign_in(&app).await;
    send(&app, request("POST", "/api/recording/start", Some(&token), None)).await;
    send(&app, request("POST", "/api/recording/stop", Some(&token), None)).await;

    let past = app.clock_now() - Duration::hours(1);
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/recording/submit",
            Some(&token),
            Some(json!({ "mood": "calm", "unlock_date": past.to_rfc3339() })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
    assert_eq!(app.blobs.upload_calls(), 0);

    // The clip survives for a retry
    let (_, body) = send(&app, request("GET", "/api/recording", Some(&token), None)).await;
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["has_clip"], true);
}

#[tokio::test]
async fn test_recording_permission_denied_is_retryable() {
    let app = setup_app().await;
    let token = sign_in(&app).await;
    app.capture.deny(true);

    let (status, body) = send(&app, request("POST", "/api/recording/start", Some(&token), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "PERMISSION");
    assert_eq!(body["error"]["retryable"], true);

    app.capture.deny(false);
    let (status, body) = send(&app, request("POST", "/api/recording/start", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");

    let (_, body) = send(&app, request("POST", "/api/recording/discard", Some(&token), None)).await;
    assert_eq!(body["state"], "idle");
    assert_eq!(app.capture.live_streams(), 0);
}

#[tokio::test]
async fn test_start_twice_conflicts() {
    let app = setup_app().await;
    let token = sign_in(&app).await;
    send(&app, request("POST", "/api/recording/start", Some(&token), None)).await;

    let (status, body) = send(&app, request("POST", "/api/recording/start", Some(&token), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

// =============================================================================
// Views
// =============================================================================

#[tokio::test]
async fn test_calendar_grid_and_timeline() {
    let app = setup_app().await;
    let token = sign_in(&app).await;
    record_echo(&app, &token).await;

    let (status, body) = send(
        &app,
        request("GET", "/api/calendar?year=2025&month=3", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["month"], "March 2025");
    assert_eq!(body["days"].as_array().unwrap().len(), 42);

    let (status, _) = send(
        &app,
        request("GET", "/api/calendar?year=2025&month=13", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        request("GET", "/api/timeline?q=first&mood=hopeful", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["groups"][0]["month"], "March 2025");
    assert_eq!(body["moods"][0], "hopeful");

    let (_, body) = send(
        &app,
        request("GET", "/api/timeline?mood=calm", Some(&token), None),
    )
    .await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_profile_and_settings() {
    let app = setup_app().await;
    let token = sign_in(&app).await;

    let (status, body) = send(&app, request("GET", "/api/profile", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Ada");

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/api/profile",
            Some(&token),
            Some(json!({ "first_name": "Ada", "last_name": "King", "bio": "Counting" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["last_name"], "King");

    let (status, body) = send(&app, request("GET", "/api/settings", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dark_mode"], false);
    assert_eq!(body["notification_frequency"], "immediate");

    let (status, body) = send(
        &app,
        request(
            "PUT",
            "/api/settings",
            Some(&token),
            Some(json!({ "dark_mode": true, "notification_frequency": "weekly" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dark_mode"], true);
    assert_eq!(body["notification_frequency"], "weekly");
    assert_eq!(body["email_notifications"], true);
}

// =============================================================================
// Account isolation
// =============================================================================

#[tokio::test]
async fn test_recording_controls_belong_to_the_recording_account() {
    let app = setup_app().await;
    let ada = sign_in(&app).await;
    let bob = sign_in_as(&app, "bob@example.com", "Bob").await;

    send(&app, request("POST", "/api/recording/start", Some(&ada), None)).await;

    let (status, body) = send(&app, request("GET", "/api/recording", Some(&bob), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert_eq!(body["state"], "idle");

    for action in ["start", "stop", "discard", "preview"] {
        let uri = format!("/api/recording/{}", action);
        let (status, body) = send(&app, request("POST", &uri, Some(&bob), None)).await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", action);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
    }

    let (_, body) = send(&app, request("POST", "/api/recording/stop", Some(&ada), None)).await;
    assert_eq!(body["state"], "stopped");

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/recording/submit",
            Some(&bob),
            Some(json!({ "mood": "calm" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.blobs.upload_calls(), 0);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/recording/submit",
            Some(&ada),
            Some(json!({ "mood": "calm" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], user_id(&app, &ada).await.as_str());

    let (_, body) = send(&app, request("GET", "/api/dashboard", Some(&bob), None)).await;
    assert_eq!(body["stats"]["total"], 0);

    // The microphone is free again
    let (status, body) = send(&app, request("POST", "/api/recording/start", Some(&bob), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");
}

#[tokio::test]
async fn test_playback_controls_belong_to_the_listener() {
    let app = setup_app().await;
    let ada = sign_in(&app).await;
    let bob = sign_in_as(&app, "bob@example.com", "Bob").await;
    let id = record_echo(&app, &ada).await;
    app.clock.advance(Duration::hours(25));

    let play = format!("/api/echoes/{}/play", id);
    let (_, body) = send(&app, request("POST", &play, Some(&ada), None)).await;
    assert_eq!(body["state"], "playing");

    let (_, body) = send(&app, request("GET", "/api/playback", Some(&bob), None)).await;
    assert!(body["target"].is_null());

    let (status, _) = send(&app, request("POST", "/api/playback/stop", Some(&bob), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/playback/seek",
            Some(&bob),
            Some(json!({ "position_secs": 1.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Bob cannot reach Ada's echo at all
    let (status, _) = send(&app, request("POST", &play, Some(&bob), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, request("GET", "/api/playback", Some(&ada), None)).await;
    assert_eq!(body["state"], "playing");
}

#[tokio::test]
async fn test_locked_audio_is_not_exposed() {
    let app = setup_app().await;
    let ada = sign_in(&app).await;
    let bob = sign_in_as(&app, "bob@example.com", "Bob").await;
    record_echo(&app, &ada).await;
    let blob = format!("/blobs/{}", app.blobs.paths()[0]);

    for uri in ["/api/dashboard", "/api/timeline"] {
        let (_, body) = send(&app, request("GET", uri, Some(&ada), None)).await;
        let text = body.to_string();
        assert!(!text.contains("audio_url"), "{}: {}", uri, text);
        assert!(!text.contains("/blobs/"), "{}: {}", uri, text);
    }

    let (status, _, _) = send_raw(&app, request("GET", &blob, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, body) = send_raw(&app, request("GET", &blob, Some(&ada), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "LOCKED");

    app.clock.advance(Duration::hours(25));

    let (_, body) = send(&app, request("GET", "/api/dashboard", Some(&ada), None)).await;
    assert!(body["echoes"][0]["audio_url"]
        .as_str()
        .unwrap()
        .ends_with(&blob));

    let (status, content_type, bytes) = send_raw(&app, request("GET", &blob, Some(&ada), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("audio/wav"));
    assert!(!bytes.is_empty());

    let (status, _, _) = send_raw(&app, request("GET", &blob, Some(&bob), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
