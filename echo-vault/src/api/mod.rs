//! HTTP API handlers for echo-vault

pub mod auth;
pub mod echoes;
pub mod error;
pub mod health;
pub mod profile;
pub mod recording;
pub mod settings;
pub mod sse;

pub use auth::{auth_middleware, AuthUser};
pub use error::{ApiError, ApiResult};
pub use health::health_routes;
pub use sse::event_stream;
