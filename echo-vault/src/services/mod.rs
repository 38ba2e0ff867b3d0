//! External collaborators: identity, records and blobs
//!
//! Each collaborator is a trait so the engine, submission step and HTTP
//! layer can run against the local SQLite/filesystem implementations or the
//! in-memory ones used by tests.

pub mod fs_blob;
pub mod local_auth;
pub mod memory;
pub mod sqlite_store;
pub mod timed;

use async_trait::async_trait;
use bytes::Bytes;
use echo_common::events::{ChangeCallback, SubscriptionHandle, Table};
use echo_common::models::{
    Echo, EchoFilter, EchoOrder, EchoPatch, NewEcho, Profile, ProfileAttrs, ProfileUpdate, Session,
    User, UserSettings,
};
use echo_common::{Error, Result};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub use fs_blob::FsBlobStore;
pub use local_auth::SqliteAuthService;
pub use memory::{MemoryBlobStore, MemoryRecordStore};
pub use sqlite_store::SqliteRecordStore;
pub use timed::{TimedAuthService, TimedBlobStore, TimedRecordStore};

/// Identity provider
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create an account; `attrs` seed the profile row
    async fn sign_up(&self, email: &str, password: &str, attrs: ProfileAttrs) -> Result<User>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_out(&self, token: &str) -> Result<()>;

    /// Live (unexpired) session for a token
    async fn get_session(&self, token: &str) -> Result<Option<Session>>;

    async fn get_user(&self, token: &str) -> Result<Option<User>>;

    /// Request a password reset link. Unknown addresses succeed silently.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()>;
}

/// Relational store for echoes, profiles and settings
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select_echoes(&self, filter: &EchoFilter, order: EchoOrder) -> Result<Vec<Echo>>;

    /// Insert a new echo; the store assigns its id
    async fn insert_echo(&self, echo: NewEcho) -> Result<Echo>;

    /// Apply `patch` to every echo matching `filter` and return the updated rows.
    ///
    /// Rejects any patch that would set `unlocked = false`.
    async fn update_echoes(&self, filter: &EchoFilter, patch: EchoPatch) -> Result<Vec<Echo>>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile>;

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<UserSettings>>;

    async fn upsert_settings(&self, settings: UserSettings) -> Result<UserSettings>;

    /// Register a change callback for `table`
    fn subscribe(&self, table: Table, callback: ChangeCallback) -> SubscriptionHandle;

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        drop(handle);
    }
}

/// Object storage for audio clips
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()>;

    async fn download(&self, path: &str) -> Result<Bytes>;

    /// Public URL of an uploaded object
    fn public_url(&self, path: &str) -> String;

    /// Inverse of [`BlobStore::public_url`]
    fn path_for_url(&self, url: &str) -> Option<String> {
        let prefix = self.public_url("");
        url.strip_prefix(&prefix)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}

/// Guard the only mutable echo field: `unlocked` may only move to `true`
pub(crate) fn check_echo_patch(patch: &EchoPatch) -> Result<()> {
    match patch.unlocked {
        Some(true) => Ok(()),
        Some(false) => Err(Error::InvalidInput(
            "Echoes cannot be re-locked once unlocked".to_string(),
        )),
        None => Err(Error::InvalidInput("Empty echo patch".to_string())),
    }
}

/// Resolve `fut` within `timeout`, converting expiry into [`Error::Timeout`]
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
    }
}
