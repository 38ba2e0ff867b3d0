//! Playback of recorded clips and stored echoes
//!
//! The [`PlaybackCoordinator`] owns the single playback resource. Starting a
//! new playback stops and releases the current one first.

#[cfg(feature = "device-audio")]
pub mod device;
pub mod fake;

use chrono::Utc;
use echo_common::events::{EchoEvent, EventBus, PlaybackState};
use echo_common::human_time::format_position;
use echo_common::{Error, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::recording::AudioClip;

/// Platform audio output
pub trait AudioPlayback: Send + Sync {
    /// Prepare a clip for playback; nothing is audible until `play`
    fn load(&self, clip: &AudioClip) -> Result<Box<dyn PlaybackHandle>>;
}

/// One loaded clip on the output device
pub trait PlaybackHandle: Send {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn seek(&mut self, position_secs: f64) -> Result<()>;

    fn position_secs(&self) -> f64;

    fn duration_secs(&self) -> Option<f64>;

    fn is_ended(&self) -> bool;

    /// Stop output and free the device. Idempotent.
    fn release(&mut self);
}

/// What is currently loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "echo_id", rename_all = "snake_case")]
pub enum PlaybackTarget {
    /// The recording preview
    Preview,
    Echo(Uuid),
}

impl PlaybackTarget {
    fn echo_id(&self) -> Option<Uuid> {
        match self {
            PlaybackTarget::Preview => None,
            PlaybackTarget::Echo(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub target: Option<PlaybackTarget>,
    pub state: PlaybackState,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    pub position: String,
    pub duration: String,
}

impl PlaybackStatus {
    fn idle() -> Self {
        Self {
            target: None,
            state: PlaybackState::Stopped,
            position_secs: 0.0,
            duration_secs: None,
            position: format_position(0.0),
            duration: format_position(0.0),
        }
    }
}

struct ActivePlayback {
    owner: Uuid,
    target: PlaybackTarget,
    handle: Box<dyn PlaybackHandle>,
    playing: bool,
}

impl ActivePlayback {
    fn state(&self) -> PlaybackState {
        if self.handle.is_ended() {
            PlaybackState::Stopped
        } else if self.playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }

    fn status(&self) -> PlaybackStatus {
        let duration = self.handle.duration_secs();
        let position = match (self.handle.is_ended(), duration) {
            (true, Some(d)) => d,
            _ => self.handle.position_secs(),
        };
        PlaybackStatus {
            target: Some(self.target),
            state: self.state(),
            position_secs: position,
            duration_secs: duration,
            position: format_position(position),
            duration: format_position(duration.unwrap_or(0.0)),
        }
    }
}

fn in_use() -> Error {
    Error::InvalidState("Audio output is in use by another account".to_string())
}

/// Exclusive owner of the playback resource.
///
/// Every playback belongs to the account that started it. Other accounts
/// see an idle player, cannot seek or stop it, and can only take the output
/// over once it is no longer playing.
pub struct PlaybackCoordinator {
    backend: Arc<dyn AudioPlayback>,
    active: Mutex<Option<ActivePlayback>>,
    events: Option<EventBus>,
}

impl PlaybackCoordinator {
    pub fn new(backend: Arc<dyn AudioPlayback>) -> Self {
        Self {
            backend,
            active: Mutex::new(None),
            events: None,
        }
    }

    /// Publish state changes on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActivePlayback>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, owner: Uuid, status: &PlaybackStatus) {
        if let Some(events) = &self.events {
            events.emit_lossy(EchoEvent::PlaybackStateChanged {
                user_id: owner,
                echo_id: status.target.and_then(|t| t.echo_id()),
                state: status.state,
                timestamp: Utc::now(),
            });
        }
    }

    /// Release the current playback and start `clip` from the beginning
    pub fn play(
        &self,
        owner: Uuid,
        target: PlaybackTarget,
        clip: &AudioClip,
    ) -> Result<PlaybackStatus> {
        let mut active = self.lock();
        if let Some(current) = active.as_ref() {
            if current.owner != owner && current.state() == PlaybackState::Playing {
                return Err(in_use());
            }
        }
        if let Some(mut previous) = active.take() {
            previous.handle.release();
            debug!("Released playback of {:?}", previous.target);
        }

        let mut handle = self.backend.load(clip)?;
        handle.play()?;
        let current = ActivePlayback {
            owner,
            target,
            handle,
            playing: true,
        };
        let status = current.status();
        *active = Some(current);
        drop(active);

        self.publish(owner, &status);
        Ok(status)
    }

    /// Play/pause `target`. An ended clip restarts from the beginning; a
    /// different target replaces the current playback.
    pub fn toggle(
        &self,
        owner: Uuid,
        target: PlaybackTarget,
        clip: &AudioClip,
    ) -> Result<PlaybackStatus> {
        let mut active = self.lock();
        let is_current = active
            .as_ref()
            .is_some_and(|a| a.owner == owner && a.target == target);
        if !is_current {
            drop(active);
            return self.play(owner, target, clip);
        }
        let Some(current) = active.as_mut() else {
            return Ok(PlaybackStatus::idle());
        };

        if current.handle.is_ended() {
            current.handle.seek(0.0)?;
            current.handle.play()?;
            current.playing = true;
        } else if current.playing {
            current.handle.pause();
            current.playing = false;
        } else {
            current.handle.play()?;
            current.playing = true;
        }
        let status = current.status();
        drop(active);

        self.publish(owner, &status);
        Ok(status)
    }

    pub fn seek(&self, owner: Uuid, position_secs: f64) -> Result<PlaybackStatus> {
        let mut active = self.lock();
        match active.as_mut() {
            Some(current) if current.owner == owner => {
                let clamped = match current.handle.duration_secs() {
                    Some(d) => position_secs.clamp(0.0, d),
                    None => position_secs.max(0.0),
                };
                current.handle.seek(clamped)?;
                Ok(current.status())
            }
            Some(_) => Err(in_use()),
            None => Ok(PlaybackStatus::idle()),
        }
    }

    /// Stop and release `owner`'s playback
    pub fn stop(&self, owner: Uuid) -> Result<PlaybackStatus> {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|a| a.owner != owner) {
            return Err(in_use());
        }
        let released = active.take();
        drop(active);

        if let Some(mut previous) = released {
            previous.handle.release();
            let status = PlaybackStatus {
                target: Some(previous.target),
                state: PlaybackState::Stopped,
                ..PlaybackStatus::idle()
            };
            self.publish(owner, &status);
        }
        Ok(PlaybackStatus::idle())
    }

    /// Stop only if `owner`'s `target` is the current playback
    pub fn stop_target(&self, owner: Uuid, target: PlaybackTarget) {
        let is_current = self
            .lock()
            .as_ref()
            .is_some_and(|a| a.owner == owner && a.target == target);
        if is_current {
            if let Err(e) = self.stop(owner) {
                debug!("Playback changed hands before stop: {}", e);
            }
        }
    }

    /// Status as seen by `owner`; another account's playback reads as idle
    pub fn status(&self, owner: Uuid) -> PlaybackStatus {
        match self.lock().as_ref() {
            Some(current) if current.owner == owner => current.status(),
            _ => PlaybackStatus::idle(),
        }
    }
}

impl Drop for PlaybackCoordinator {
    fn drop(&mut self) {
        if let Some(mut current) = self.lock().take() {
            current.handle.release();
        }
    }
}
