//! Domain models shared by the store, engine and API layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mood tags offered by the recording form
pub const KNOWN_MOODS: &[&str] = &[
    "happy",
    "reflective",
    "excited",
    "grateful",
    "calm",
    "anxious",
    "inspired",
    "nostalgic",
];

/// Mood tags written by earlier versions of the recording form
pub const LEGACY_MOODS: &[&str] = &["hopeful", "motivated", "grateful", "ambitious", "joyful"];

/// Whether a mood tag is one the UI knows how to style.
///
/// Moods are open tags; unknown values are stored and displayed unstyled.
pub fn is_known_mood(mood: &str) -> bool {
    KNOWN_MOODS.contains(&mood) || LEGACY_MOODS.contains(&mood)
}

/// A stored voice entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub mood: String,
    pub created_at: DateTime<Utc>,
    pub unlock_date: DateTime<Utc>,
    pub duration_seconds: u32,
    pub unlocked: bool,
    /// Empty in views of locked echoes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audio_url: String,
}

impl Echo {
    /// True once the unlock date has been reached, regardless of the stored flag
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.unlock_date <= now
    }
}

/// Insert payload; the store assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEcho {
    pub user_id: Uuid,
    pub title: String,
    pub mood: String,
    pub created_at: DateTime<Utc>,
    pub unlock_date: DateTime<Utc>,
    pub duration_seconds: u32,
    pub unlocked: bool,
    pub audio_url: String,
}

/// Row filter for echo queries and updates. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoFilter {
    /// Owner scope; every query is restricted to one user
    pub user_id: Uuid,
    pub ids: Option<Vec<Uuid>>,
    pub unlocked: Option<bool>,
    /// Matches `unlock_date <= unlock_at_or_before`
    pub unlock_at_or_before: Option<DateTime<Utc>>,
    pub mood: Option<String>,
}

impl EchoFilter {
    pub fn owner(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn with_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_unlocked(mut self, unlocked: bool) -> Self {
        self.unlocked = Some(unlocked);
        self
    }

    pub fn due_by(mut self, now: DateTime<Utc>) -> Self {
        self.unlock_at_or_before = Some(now);
        self
    }

    pub fn matches(&self, echo: &Echo) -> bool {
        echo.user_id == self.user_id
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&echo.id))
            && self.unlocked.map_or(true, |u| echo.unlocked == u)
            && self
                .unlock_at_or_before
                .map_or(true, |t| echo.unlock_date <= t)
            && self.mood.as_ref().map_or(true, |m| &echo.mood == m)
    }
}

/// Result ordering for echo queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoOrder {
    /// Newest first (timeline and dashboard)
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UnlockDateAsc,
}

/// Update payload for echoes.
///
/// Only the unlock flag is mutable, and only towards `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoPatch {
    pub unlocked: Option<bool>,
}

impl EchoPatch {
    pub fn unlock() -> Self {
        Self {
            unlocked: Some(true),
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Signed-in session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Profile attributes collected at sign-up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileAttrs {
    pub first_name: String,
    pub last_name: String,
}

/// Row of the `profiles` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
}

/// Editable profile fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
}

/// How often unlock notifications are batched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    #[default]
    Immediate,
    Daily,
    Weekly,
}

impl NotificationFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationFrequency::Immediate => "immediate",
            NotificationFrequency::Daily => "daily",
            NotificationFrequency::Weekly => "weekly",
        }
    }

    /// Parse a stored value; unknown values fall back to immediate
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "daily" => NotificationFrequency::Daily,
            "weekly" => NotificationFrequency::Weekly,
            _ => NotificationFrequency::Immediate,
        }
    }
}

/// Row of the `user_settings` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub time_capsule_enabled: bool,
    pub email_notifications: bool,
    pub unlock_notifications: bool,
    pub notification_frequency: NotificationFrequency,
    pub dark_mode: bool,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    /// Settings a new account starts with
    pub fn defaults_for(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            time_capsule_enabled: false,
            email_notifications: true,
            unlock_notifications: true,
            notification_frequency: NotificationFrequency::Immediate,
            dark_mode: false,
            updated_at: now,
        }
    }
}
