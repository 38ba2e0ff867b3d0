//! Local identity provider backed by the `users` and `sessions` tables
//!
//! Passwords are stored as salted SHA-256 digests. Session tokens are random
//! 256-bit values, hex encoded, with a fixed time-to-live.

use async_trait::async_trait;
use chrono::Duration;
use echo_common::db::{from_millis, parse_uuid, session_from_row, to_millis};
use echo_common::models::{ProfileAttrs, Session, User, UserSettings};
use echo_common::{Clock, Error, Result};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthService;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// Lifetime of a password reset link
const RESET_TTL_HOURS: i64 = 1;

/// Auth Service over the local SQLite database
#[derive(Clone)]
pub struct SqliteAuthService {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl SqliteAuthService {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>, session_ttl: Duration) -> Self {
        Self {
            db,
            clock,
            session_ttl,
        }
    }

    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, created_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => Ok(Some(User {
                id: parse_uuid(&row.try_get::<String, _>("id")?)?,
                email: row.try_get("email")?,
                created_at: from_millis(row.try_get("created_at")?)?,
            })),
            None => Ok(None),
        }
    }
}

/// Random 256-bit token, hex encoded
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of salt followed by password, as 64 hex characters
fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(Error::InvalidInput(format!("Invalid email address: {}", email))),
    }
}

#[async_trait]
impl AuthService for SqliteAuthService {
    async fn sign_up(&self, email: &str, password: &str, attrs: ProfileAttrs) -> Result<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::InvalidInput(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            created_at: now,
        };
        let salt = generate_token();
        let settings = UserSettings::defaults_for(user.id, now);

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, password_salt, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(hash_password(&salt, password))
        .bind(&salt)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Auth("User already registered".to_string())
            }
            other => Error::Database(other),
        })?;

        sqlx::query("INSERT INTO profiles (id, first_name, last_name, bio) VALUES (?, ?, ?, '')")
            .bind(user.id.to_string())
            .bind(attrs.first_name.trim())
            .bind(attrs.last_name.trim())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, time_capsule_enabled, email_notifications,
                                       unlock_notifications, notification_frequency,
                                       dark_mode, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(settings.time_capsule_enabled as i64)
        .bind(settings.email_notifications as i64)
        .bind(settings.unlock_notifications as i64)
        .bind(settings.notification_frequency.as_str())
        .bind(settings.dark_mode as i64)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let invalid = || Error::Auth("Invalid login credentials".to_string());
        let email = normalize_email(email).map_err(|_| invalid())?;

        let row = sqlx::query("SELECT id, password_hash, password_salt FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(invalid)?;

        let stored_hash: String = row.try_get("password_hash")?;
        let salt: String = row.try_get("password_salt")?;
        if hash_password(&salt, password) != stored_hash {
            return Err(invalid());
        }

        let user_id = parse_uuid(&row.try_get::<String, _>("id")?)?;
        let now = self.clock.now();
        let session = Session {
            token: generate_token(),
            user_id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&session.token)
            .bind(user_id.to_string())
            .bind(to_millis(session.created_at))
            .bind(to_millis(session.expires_at))
            .execute(&self.db)
            .await?;

        debug!("Session opened for {}", user_id);
        Ok(session)
    }

    async fn sign_out(&self, token: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await?;

        if result.rows_affected() > 0 {
            debug!("Session closed");
        }
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let session = session_from_row(&row)?;

        if session.is_expired(self.clock.now()) {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.db)
                .await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn get_user(&self, token: &str) -> Result<Option<User>> {
        match self.get_session(token).await? {
            Some(session) => self.user_by_id(&session.user_id.to_string()).await,
            None => Ok(None),
        }
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()> {
        let email = normalize_email(email)?;

        let user_id: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.db)
            .await?;

        let Some(user_id) = user_id else {
            debug!("Password reset requested for unknown address");
            return Ok(());
        };

        let now = self.clock.now();
        let token = generate_token();
        sqlx::query("INSERT INTO password_resets (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&token)
            .bind(&user_id)
            .bind(to_millis(now))
            .bind(to_millis(now + Duration::hours(RESET_TTL_HOURS)))
            .execute(&self.db)
            .await?;

        // No mail transport; the link is only logged
        info!("Password reset requested for user {}", user_id);
        debug!("Password reset link: {}?token={}", redirect_to, token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use echo_common::db::init_memory_database;
    use echo_common::ManualClock;

    async fn service() -> (SqliteAuthService, ManualClock) {
        let db = init_memory_database().await.unwrap();
        let clock = ManualClock::new(chrono::Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let service = SqliteAuthService::new(db, Arc::new(clock.clone()), Duration::hours(24));
        (service, clock)
    }

    fn attrs() -> ProfileAttrs {
        ProfileAttrs {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
        }
    }

    #[test]
    fn test_hash_depends_on_salt() {
        assert_ne!(hash_password("a", "secret"), hash_password("b", "secret"));
        assert_eq!(hash_password("a", "secret").len(), 64);
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let (auth, _) = service().await;
        let user = auth.sign_up("Grace@Example.org", "hunter22", attrs()).await.unwrap();
        assert_eq!(user.email, "grace@example.org");

        let session = auth.sign_in_with_password("grace@example.org", "hunter22").await.unwrap();
        assert_eq!(session.user_id, user.id);

        let found = auth.get_user(&session.token).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_and_bad_password() {
        let (auth, _) = service().await;
        auth.sign_up("grace@example.org", "hunter22", attrs()).await.unwrap();

        let dup = auth.sign_up("grace@example.org", "other-pass", attrs()).await;
        assert!(matches!(dup, Err(Error::Auth(_))));

        let wrong = auth.sign_in_with_password("grace@example.org", "nope-nope").await;
        assert!(matches!(wrong, Err(Error::Auth(_))));

        let short = auth.sign_up("ada@example.org", "abc", attrs()).await;
        assert!(matches!(short, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_session_expires_and_sign_out() {
        let (auth, clock) = service().await;
        auth.sign_up("grace@example.org", "hunter22", attrs()).await.unwrap();
        let first = auth.sign_in_with_password("grace@example.org", "hunter22").await.unwrap();
        let second = auth.sign_in_with_password("grace@example.org", "hunter22").await.unwrap();

        auth.sign_out(&second.token).await.unwrap();
        assert!(auth.get_session(&second.token).await.unwrap().is_none());
        assert!(auth.get_session(&first.token).await.unwrap().is_some());

        clock.advance(Duration::hours(25));
        assert!(auth.get_session(&first.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_password_records_request() {
        let (auth, _) = service().await;
        auth.sign_up("grace@example.org", "hunter22", attrs()).await.unwrap();

        auth.reset_password_for_email("grace@example.org", "http://localhost/reset")
            .await
            .unwrap();
        auth.reset_password_for_email("nobody@example.org", "http://localhost/reset")
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_resets")
            .fetch_one(&auth.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
