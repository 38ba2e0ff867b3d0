//! Session authentication and account endpoints
//!
//! Protected routes expect `Authorization: Bearer <session token>`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use echo_common::models::{ProfileAttrs, Session, User};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::{ApiError, ApiResult};
use crate::AppState;

/// Identity attached to authenticated requests
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub token: String,
}

/// Token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Authentication middleware
///
/// Resolves the bearer token to a live session, starts unlock tracking for
/// its owner and attaches [`AuthUser`] to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let session = state
        .auth
        .get_session(&token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".to_string()))?;

    state.reconciler.track(session.user_id);
    request.extensions_mut().insert(AuthUser {
        user_id: session.user_id,
        token,
    });

    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// POST /api/auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let attrs = ProfileAttrs {
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
    };
    let user = state
        .auth
        .sign_up(&request.email, &request.password, attrs)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<Session>> {
    let session = state
        .auth
        .sign_in_with_password(&request.email, &request.password)
        .await?;
    state.reconciler.track(session.user_id);
    Ok(Json(session))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<StatusCode> {
    state.auth.sign_out(&user.token).await?;
    info!("User {} signed out", user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub session: Session,
}

/// GET /api/auth/session
pub async fn current_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.auth.get_session(&user.token).await?;
    let account = state.auth.get_user(&user.token).await?;
    match (account, session) {
        (Some(user), Some(session)) => Ok(Json(SessionResponse { user, session })),
        _ => Err(ApiError::Unauthorized(
            "Session expired or invalid".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// POST /api/auth/reset-password
///
/// Always 202 so the response does not reveal which addresses exist.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let redirect_to = request
        .redirect_to
        .unwrap_or_else(|| format!("{}/reset-password", state.public_base_url));
    state
        .auth
        .reset_password_for_email(&request.email, &redirect_to)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "sent" }))))
}
