//! Row <-> model conversions for the SQLite schema

use crate::models::{Echo, NotificationFrequency, Profile, Session, UserSettings};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Column list matching [`echo_from_row`]
pub const ECHO_COLUMNS: &str =
    "id, user_id, title, mood, created_at, unlock_date, duration_seconds, unlocked, audio_url";

/// Encode a timestamp as epoch milliseconds
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Decode epoch milliseconds
pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Store(format!("Invalid timestamp in database: {}", ms)))
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Store(format!("Invalid UUID in database '{}': {}", s, e)))
}

pub fn echo_from_row(row: &SqliteRow) -> Result<Echo> {
    let duration: i64 = row.try_get("duration_seconds")?;
    Ok(Echo {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        title: row.try_get("title")?,
        mood: row.try_get("mood")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        unlock_date: from_millis(row.try_get("unlock_date")?)?,
        duration_seconds: u32::try_from(duration)
            .map_err(|_| Error::Store(format!("Invalid duration in database: {}", duration)))?,
        unlocked: row.try_get::<i64, _>("unlocked")? != 0,
        audio_url: row.try_get("audio_url")?,
    })
}

pub fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        bio: row.try_get("bio")?,
    })
}

pub fn settings_from_row(row: &SqliteRow) -> Result<UserSettings> {
    Ok(UserSettings {
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        time_capsule_enabled: row.try_get::<i64, _>("time_capsule_enabled")? != 0,
        email_notifications: row.try_get::<i64, _>("email_notifications")? != 0,
        unlock_notifications: row.try_get::<i64, _>("unlock_notifications")? != 0,
        notification_frequency: NotificationFrequency::parse_lossy(
            &row.try_get::<String, _>("notification_frequency")?,
        ),
        dark_mode: row.try_get::<i64, _>("dark_mode")? != 0,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

pub fn session_from_row(row: &SqliteRow) -> Result<Session> {
    Ok(Session {
        token: row.try_get("token")?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        expires_at: from_millis(row.try_get("expires_at")?)?,
    })
}
