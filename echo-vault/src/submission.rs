//! Turning a stopped recording into a stored echo
//!
//! Upload first, then insert. A failed upload never reaches the store; a
//! failed insert leaves an orphaned blob, which is harmless because nothing
//! references it.

use chrono::{DateTime, Months, Utc};
use echo_common::models::{Echo, NewEcho};
use echo_common::{Clock, Error, Result};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::recording::RecordedClip;
use crate::services::{BlobStore, RecordStore};

/// Unlock date used when the form leaves it empty
const DEFAULT_UNLOCK_MONTHS: u32 = 1;

/// Form fields accompanying a clip
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EchoDetails {
    /// Falls back to the suggested title when blank
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mood: String,
    /// Defaults to one month from now
    #[serde(default)]
    pub unlock_date: Option<DateTime<Utc>>,
}

fn resolve_title(details: &EchoDetails, clip: &RecordedClip) -> Result<String> {
    details
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or(clip.suggested_title.as_deref())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput("Title is required".to_string()))
}

fn resolve_unlock_date(details: &EchoDetails, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let unlock_date = match details.unlock_date {
        Some(date) => date,
        None => now
            .checked_add_months(Months::new(DEFAULT_UNLOCK_MONTHS))
            .ok_or_else(|| Error::Internal("Unlock date out of range".to_string()))?,
    };
    if unlock_date <= now {
        return Err(Error::InvalidInput(
            "Unlock date must be in the future".to_string(),
        ));
    }
    Ok(unlock_date)
}

/// Blob path for a new clip: `{owner}/{uuid}.wav`
pub fn blob_path(owner: Uuid) -> String {
    format!("{}/{}.wav", owner, Uuid::new_v4())
}

/// Upload `clip` and insert a locked echo owned by `owner`
pub async fn submit_echo(
    blobs: &dyn BlobStore,
    store: &dyn RecordStore,
    clock: &dyn Clock,
    owner: Uuid,
    clip: &RecordedClip,
    details: EchoDetails,
) -> Result<Echo> {
    if clip.clip.is_empty() {
        return Err(Error::InvalidState(
            "Please record an audio message first".to_string(),
        ));
    }

    let now = clock.now();
    let title = resolve_title(&details, clip)?;
    let mood = details.mood.trim().to_lowercase();
    if mood.is_empty() {
        return Err(Error::InvalidInput("Mood is required".to_string()));
    }
    let unlock_date = resolve_unlock_date(&details, now)?;

    let path = blob_path(owner);
    if let Err(e) = blobs
        .upload(&path, clip.clip.bytes.clone(), &clip.clip.mime_type)
        .await
    {
        warn!("Upload of {} failed: {}", path, e);
        return Err(match e {
            Error::Upload(_) | Error::Timeout(_) => e,
            other => Error::Upload(other.to_string()),
        });
    }
    let audio_url = blobs.public_url(&path);

    let echo = store
        .insert_echo(NewEcho {
            user_id: owner,
            title,
            mood,
            created_at: now,
            unlock_date,
            duration_seconds: clip.duration_seconds,
            unlocked: false,
            audio_url,
        })
        .await?;

    info!(
        "Saved echo {} ({} s, unlocks {})",
        echo.id, echo.duration_seconds, echo.unlock_date
    );
    Ok(echo)
}
