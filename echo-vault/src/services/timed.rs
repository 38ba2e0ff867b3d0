//! Deadline decorators for the external collaborators
//!
//! Wrap any service so every call resolves within the configured request
//! timeout, surfacing [`echo_common::Error::Timeout`] instead of hanging.

use async_trait::async_trait;
use bytes::Bytes;
use echo_common::events::{ChangeCallback, SubscriptionHandle, Table};
use echo_common::models::{
    Echo, EchoFilter, EchoOrder, EchoPatch, NewEcho, Profile, ProfileAttrs, ProfileUpdate, Session,
    User, UserSettings,
};
use echo_common::Result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{with_timeout, AuthService, BlobStore, RecordStore};

pub struct TimedAuthService {
    inner: Arc<dyn AuthService>,
    timeout: Duration,
}

impl TimedAuthService {
    pub fn new(inner: Arc<dyn AuthService>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl AuthService for TimedAuthService {
    async fn sign_up(&self, email: &str, password: &str, attrs: ProfileAttrs) -> Result<User> {
        with_timeout(self.timeout, self.inner.sign_up(email, password, attrs)).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        with_timeout(self.timeout, self.inner.sign_in_with_password(email, password)).await
    }

    async fn sign_out(&self, token: &str) -> Result<()> {
        with_timeout(self.timeout, self.inner.sign_out(token)).await
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        with_timeout(self.timeout, self.inner.get_session(token)).await
    }

    async fn get_user(&self, token: &str) -> Result<Option<User>> {
        with_timeout(self.timeout, self.inner.get_user(token)).await
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()> {
        with_timeout(
            self.timeout,
            self.inner.reset_password_for_email(email, redirect_to),
        )
        .await
    }
}

pub struct TimedRecordStore {
    inner: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl TimedRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl RecordStore for TimedRecordStore {
    async fn select_echoes(&self, filter: &EchoFilter, order: EchoOrder) -> Result<Vec<Echo>> {
        with_timeout(self.timeout, self.inner.select_echoes(filter, order)).await
    }

    async fn insert_echo(&self, echo: NewEcho) -> Result<Echo> {
        with_timeout(self.timeout, self.inner.insert_echo(echo)).await
    }

    async fn update_echoes(&self, filter: &EchoFilter, patch: EchoPatch) -> Result<Vec<Echo>> {
        with_timeout(self.timeout, self.inner.update_echoes(filter, patch)).await
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        with_timeout(self.timeout, self.inner.get_profile(user_id)).await
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<Profile> {
        with_timeout(self.timeout, self.inner.update_profile(user_id, update)).await
    }

    async fn get_settings(&self, user_id: Uuid) -> Result<Option<UserSettings>> {
        with_timeout(self.timeout, self.inner.get_settings(user_id)).await
    }

    async fn upsert_settings(&self, settings: UserSettings) -> Result<UserSettings> {
        with_timeout(self.timeout, self.inner.upsert_settings(settings)).await
    }

    fn subscribe(&self, table: Table, callback: ChangeCallback) -> SubscriptionHandle {
        self.inner.subscribe(table, callback)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.inner.unsubscribe(handle)
    }
}

pub struct TimedBlobStore {
    inner: Arc<dyn BlobStore>,
    timeout: Duration,
}

impl TimedBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl BlobStore for TimedBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        with_timeout(self.timeout, self.inner.upload(path, bytes, content_type)).await
    }

    async fn download(&self, path: &str) -> Result<Bytes> {
        with_timeout(self.timeout, self.inner.download(path)).await
    }

    fn public_url(&self, path: &str) -> String {
        self.inner.public_url(path)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        self.inner.path_for_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_common::Error;

    struct StalledBlobs;

    #[async_trait]
    impl BlobStore for StalledBlobs {
        async fn upload(&self, _path: &str, _bytes: Bytes, _content_type: &str) -> Result<()> {
            std::future::pending().await
        }

        async fn download(&self, _path: &str) -> Result<Bytes> {
            std::future::pending().await
        }

        fn public_url(&self, path: &str) -> String {
            format!("mem://{}", path)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_upload_times_out() {
        let blobs = TimedBlobStore::new(Arc::new(StalledBlobs), Duration::from_millis(10_000));
        let result = blobs.upload("a.wav", Bytes::new(), "audio/wav").await;
        assert!(matches!(result, Err(Error::Timeout(10_000))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(blobs.public_url("a.wav"), "mem://a.wav");
    }
}
