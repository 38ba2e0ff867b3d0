//! Recording Session state machine
//!
//! ```text
//! Idle -> RequestingPermission -> Recording | PermissionDenied
//! Recording -> Stopped            (manual stop or ceiling)
//! Stopped -> Idle | Submitted     (discard or submit)
//! PermissionDenied -> RequestingPermission (retry)
//! ```
//!
//! The session owns the capture stream while recording and stops its tracks
//! exactly once on stop, discard or drop.

use bytes::Bytes;
use chrono::{Datelike, NaiveDate};
use echo_common::events::RecordingPhase;
use echo_common::human_time::month_name;
use echo_common::{Error, Result};
use tracing::{debug, info, warn};

use super::capture::{AudioCapture, AudioClip, CaptureConstraints, CaptureStream};

/// Default recording ceiling in seconds
pub const DEFAULT_MAX_DURATION_SECS: u32 = 60;

/// Limits applied to a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingPolicy {
    pub max_duration_secs: u32,
}

impl Default for RecordingPolicy {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

/// A stopped recording ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedClip {
    pub clip: AudioClip,
    pub duration_seconds: u32,
    pub suggested_title: Option<String>,
}

/// Title offered after a recording stops, e.g. `"Echo from March 9"`
pub fn suggest_title(date: NaiveDate) -> String {
    format!("Echo from {} {}", month_name(date.month()), date.day())
}

pub struct RecordingSession {
    policy: RecordingPolicy,
    state: RecordingPhase,
    elapsed: u32,
    chunks: Vec<Bytes>,
    stream: Option<Box<dyn CaptureStream>>,
    clip: Option<AudioClip>,
    suggested_title: Option<String>,
}

impl RecordingSession {
    pub fn new(policy: RecordingPolicy) -> Self {
        Self {
            policy,
            state: RecordingPhase::Idle,
            elapsed: 0,
            chunks: Vec::new(),
            stream: None,
            clip: None,
            suggested_title: None,
        }
    }

    pub fn state(&self) -> RecordingPhase {
        self.state
    }

    pub fn policy(&self) -> RecordingPolicy {
        self.policy
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingPhase::Recording
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed
    }

    pub fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }

    pub fn suggested_title(&self) -> Option<&str> {
        self.suggested_title.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Request the microphone and begin recording.
    ///
    /// On failure the session moves to `PermissionDenied`; calling `start`
    /// again is the retry.
    pub async fn start(&mut self, capture: &dyn AudioCapture) -> Result<()> {
        match self.state {
            RecordingPhase::Recording | RecordingPhase::RequestingPermission => {
                return Err(Error::InvalidState("Already recording".to_string()));
            }
            RecordingPhase::Stopped => {
                return Err(Error::InvalidState(
                    "Discard or submit the current clip first".to_string(),
                ));
            }
            RecordingPhase::Idle | RecordingPhase::PermissionDenied | RecordingPhase::Submitted => {}
        }

        self.state = RecordingPhase::RequestingPermission;
        match capture.open(&CaptureConstraints::voice()).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.chunks.clear();
                self.clip = None;
                self.suggested_title = None;
                self.elapsed = 0;
                self.state = RecordingPhase::Recording;
                info!("Recording started");
                Ok(())
            }
            Err(e) => {
                warn!("Microphone unavailable: {}", e);
                self.state = RecordingPhase::PermissionDenied;
                Err(e)
            }
        }
    }

    /// Move captured chunks from the stream into the session.
    ///
    /// Returns the number of chunks collected.
    pub fn pump(&mut self) -> usize {
        if !self.is_recording() {
            return 0;
        }
        match self.stream.as_mut() {
            Some(stream) => {
                let chunks = stream.take_chunks();
                let count = chunks.len();
                self.chunks.extend(chunks);
                count
            }
            None => 0,
        }
    }

    /// Stop recording and assemble the clip. No-op unless recording.
    ///
    /// Returns `true` when a recording was stopped.
    pub fn stop(&mut self, today: NaiveDate) -> Result<bool> {
        if !self.is_recording() {
            return Ok(false);
        }

        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| Error::Internal("Recording without a capture stream".to_string()))?;

        self.chunks.extend(stream.take_chunks());
        let flushed = stream.finish();
        stream.stop_tracks();

        self.state = RecordingPhase::Stopped;
        self.suggested_title = Some(suggest_title(today));

        self.chunks.extend(flushed?);
        let clip = stream.assemble(&self.chunks)?;
        let clip = match clip.duration_secs {
            Some(_) => clip,
            None => clip.with_duration(self.elapsed as f64),
        };

        info!(
            "Recording stopped after {} s ({} chunks, {} bytes)",
            self.elapsed,
            self.chunks.len(),
            clip.len()
        );
        self.clip = Some(clip);
        Ok(true)
    }

    /// Advance the timer by one second, stopping at the ceiling.
    ///
    /// Returns `true` when this tick stopped the recording.
    pub fn tick(&mut self, today: NaiveDate) -> Result<bool> {
        if !self.is_recording() {
            return Ok(false);
        }

        self.elapsed = (self.elapsed + 1).min(self.policy.max_duration_secs);
        if self.elapsed >= self.policy.max_duration_secs {
            debug!("Recording reached {} s ceiling", self.policy.max_duration_secs);
            return self.stop(today);
        }
        Ok(false)
    }

    /// Drop the clip and return to Idle, releasing the microphone if held
    pub fn discard(&mut self) {
        self.release();
        self.chunks.clear();
        self.clip = None;
        self.suggested_title = None;
        self.elapsed = 0;
        self.state = RecordingPhase::Idle;
    }

    /// The stopped clip and its timer duration
    pub fn recorded(&self) -> Result<RecordedClip> {
        match (&self.state, &self.clip) {
            (RecordingPhase::Stopped, Some(clip)) => Ok(RecordedClip {
                clip: clip.clone(),
                duration_seconds: self.elapsed,
                suggested_title: self.suggested_title.clone(),
            }),
            _ => Err(Error::InvalidState("No recorded clip to submit".to_string())),
        }
    }

    /// Record a successful submission; the clip is no longer needed
    pub fn mark_submitted(&mut self) -> Result<()> {
        if self.state != RecordingPhase::Stopped || self.clip.is_none() {
            return Err(Error::InvalidState("No recorded clip to submit".to_string()));
        }
        self.chunks.clear();
        self.clip = None;
        self.state = RecordingPhase::Submitted;
        Ok(())
    }

    /// Stop the capture stream if one is held
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            debug!("Capture stream released");
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.release();
    }
}
