//! Common error types for EchoVerse

use thiserror::Error;

/// Common result type for EchoVerse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the recording, timeline and service layers
#[derive(Error, Debug)]
pub enum Error {
    /// Microphone access denied or no input device available
    #[error("Microphone unavailable: {0}")]
    Permission(String),

    /// Invalid credentials, duplicate account or expired session
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Record Store query, insert or update failure
    #[error("Store error: {0}")]
    Store(String),

    /// Blob Store upload failure
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Audio could not be loaded or played
    #[error("Playback error: {0}")]
    Playback(String),

    /// A backend call did not resolve in time
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Echo exists but its unlock date has not passed
    #[error("Echo is locked until {0}")]
    Locked(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the operation that produced this error.
    ///
    /// Permission and playback failures leave their component retry-ready;
    /// store, upload and timeout failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Permission(_)
                | Error::Store(_)
                | Error::Upload(_)
                | Error::Playback(_)
                | Error::Timeout(_)
                | Error::Database(_)
        )
    }

    /// Stable machine-readable code used in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::Permission(_) => "PERMISSION",
            Error::Auth(_) => "AUTH",
            Error::Store(_) | Error::Database(_) => "STORE",
            Error::Upload(_) => "UPLOAD",
            Error::Playback(_) => "PLAYBACK",
            Error::Timeout(_) => "TIMEOUT",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Locked(_) => "LOCKED",
            Error::Config(_) => "CONFIG",
            Error::Io(_) | Error::Internal(_) => "INTERNAL",
        }
    }
}
