//! Async owner of the single Recording Session
//!
//! Runs the one-second ticker and the chunk pump while recording. Both tasks
//! are aborted on stop, discard and drop.
//!
//! There is one microphone, so there is one session. The account that starts
//! it holds it until the clip is submitted or discarded; other accounts see
//! an unavailable recorder and every control call from them is rejected.

use chrono::{DateTime, Local, NaiveDate, Utc};
use echo_common::events::{EchoEvent, EventBus, RecordingPhase};
use echo_common::human_time::{format_duration, format_timer};
use echo_common::models::Echo;
use echo_common::{Clock, Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capture::AudioCapture;
use super::session::{RecordingPolicy, RecordingSession};
use crate::playback::{PlaybackCoordinator, PlaybackStatus, PlaybackTarget};
use crate::services::{BlobStore, RecordStore};
use crate::submission::{submit_echo, EchoDetails};

/// Timer resolution of the recording clock
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// How often captured chunks are collected
const PUMP_PERIOD: Duration = Duration::from_millis(250);

/// Snapshot of the session for API responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingStatus {
    pub state: RecordingPhase,
    pub elapsed_secs: u32,
    /// `MM:SS`
    pub elapsed: String,
    pub max_duration_secs: u32,
    pub has_clip: bool,
    pub clip_bytes: usize,
    /// `M:SS` of the assembled clip
    pub clip_duration: Option<String>,
    pub suggested_title: Option<String>,
    /// False while another account holds the microphone
    pub available: bool,
}

impl RecordingStatus {
    fn of(session: &RecordingSession) -> Self {
        let clip = session.clip();
        Self {
            state: session.state(),
            elapsed_secs: session.elapsed_secs(),
            elapsed: format_timer(session.elapsed_secs()),
            max_duration_secs: session.policy().max_duration_secs,
            has_clip: clip.is_some(),
            clip_bytes: clip.map_or(0, |c| c.len()),
            clip_duration: clip
                .and_then(|c| c.duration_secs)
                .map(|d| format_duration(d.round() as u32)),
            suggested_title: session.suggested_title().map(str::to_string),
            available: true,
        }
    }

    fn unavailable(session: &RecordingSession) -> Self {
        Self {
            state: RecordingPhase::Idle,
            elapsed_secs: 0,
            elapsed: format_timer(0),
            max_duration_secs: session.policy().max_duration_secs,
            has_clip: false,
            clip_bytes: 0,
            clip_duration: None,
            suggested_title: None,
            available: false,
        }
    }
}

fn microphone_in_use() -> Error {
    Error::InvalidState("The microphone is in use by another account".to_string())
}

fn local_day(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

fn publish(
    events: &Option<EventBus>,
    owner: Uuid,
    before: RecordingPhase,
    session: &RecordingSession,
) {
    let after = session.state();
    if before == after {
        return;
    }
    debug!("Recording {:?} -> {:?}", before, after);
    if let Some(events) = events {
        events.emit_lossy(EchoEvent::RecordingStateChanged {
            user_id: owner,
            old_state: before,
            new_state: after,
            elapsed_seconds: session.elapsed_secs(),
            timestamp: Utc::now(),
        });
    }
}

pub struct RecordingController {
    session: Arc<Mutex<RecordingSession>>,
    capture: Arc<dyn AudioCapture>,
    playback: Arc<PlaybackCoordinator>,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
    /// Account that last started the session; only read under the session lock
    holder: std::sync::Mutex<Option<Uuid>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl RecordingController {
    pub fn new(
        capture: Arc<dyn AudioCapture>,
        playback: Arc<PlaybackCoordinator>,
        policy: RecordingPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(RecordingSession::new(policy))),
            capture,
            playback,
            clock,
            events: None,
            holder: std::sync::Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Publish state transitions on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn holder(&self) -> Option<Uuid> {
        *self.holder.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True when `caller` must not touch the session
    fn held_by_other(&self, session: &RecordingSession, caller: Uuid) -> bool {
        let busy = matches!(
            session.state(),
            RecordingPhase::RequestingPermission | RecordingPhase::Recording | RecordingPhase::Stopped
        );
        busy && self.holder().is_some_and(|holder| holder != caller)
    }

    /// The session as `caller` may see it
    pub async fn status(&self, caller: Uuid) -> RecordingStatus {
        let session = self.session.lock().await;
        if self.held_by_other(&session, caller) {
            RecordingStatus::unavailable(&session)
        } else {
            RecordingStatus::of(&session)
        }
    }

    /// Acquire the microphone for `caller` and start the timer
    pub async fn start(&self, caller: Uuid) -> Result<RecordingStatus> {
        let mut session = self.session.lock().await;
        if self.held_by_other(&session, caller) {
            return Err(microphone_in_use());
        }
        *self.holder.lock().unwrap_or_else(|e| e.into_inner()) = Some(caller);

        let before = session.state();
        let result = session.start(self.capture.as_ref()).await;
        publish(&self.events, caller, before, &session);
        result?;

        self.abort_tasks();
        self.spawn_tasks(caller);
        Ok(RecordingStatus::of(&session))
    }

    /// Stop recording; a no-op unless recording
    pub async fn stop(&self, caller: Uuid) -> Result<RecordingStatus> {
        let mut session = self.session.lock().await;
        if self.held_by_other(&session, caller) {
            return Err(microphone_in_use());
        }
        self.abort_tasks();
        let before = session.state();
        let result = session.stop(local_day(self.clock.now()));
        publish(&self.events, caller, before, &session);
        result?;
        Ok(RecordingStatus::of(&session))
    }

    /// Throw the clip away and return to Idle
    pub async fn discard(&self, caller: Uuid) -> Result<RecordingStatus> {
        let mut session = self.session.lock().await;
        if self.held_by_other(&session, caller) {
            return Err(microphone_in_use());
        }
        self.abort_tasks();
        self.playback.stop_target(caller, PlaybackTarget::Preview);
        let before = session.state();
        session.discard();
        publish(&self.events, caller, before, &session);
        Ok(RecordingStatus::of(&session))
    }

    /// Play or pause the recorded clip
    pub async fn toggle_preview(&self, caller: Uuid) -> Result<PlaybackStatus> {
        let session = self.session.lock().await;
        if self.held_by_other(&session, caller) {
            return Err(microphone_in_use());
        }
        let clip = session
            .clip()
            .ok_or_else(|| Error::InvalidState("Nothing recorded to preview".to_string()))?;
        self.playback.toggle(caller, PlaybackTarget::Preview, clip)
    }

    /// Upload the clip and insert the echo for `owner`, who must hold the
    /// session.
    ///
    /// The session stays `Stopped` (and retry-ready) if either step fails.
    pub async fn submit(
        &self,
        blobs: &dyn BlobStore,
        store: &dyn RecordStore,
        owner: Uuid,
        details: EchoDetails,
    ) -> Result<Echo> {
        let mut session = self.session.lock().await;
        if self.held_by_other(&session, owner) {
            return Err(microphone_in_use());
        }
        let recorded = session.recorded()?;
        let echo = submit_echo(blobs, store, self.clock.as_ref(), owner, &recorded, details).await?;

        self.playback.stop_target(owner, PlaybackTarget::Preview);
        let before = session.state();
        session.mark_submitted()?;
        publish(&self.events, owner, before, &session);
        info!("Echo {} submitted", echo.id);
        Ok(echo)
    }

    fn spawn_tasks(&self, owner: Uuid) {
        let ticker = {
            let session = Arc::clone(&self.session);
            let clock = Arc::clone(&self.clock);
            let events = self.events.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(TICK_PERIOD);
                // First tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let mut session = session.lock().await;
                    if !session.is_recording() {
                        break;
                    }
                    let before = session.state();
                    match session.tick(local_day(clock.now())) {
                        Ok(false) => {}
                        Ok(true) => {
                            info!("Recording reached its maximum duration");
                            publish(&events, owner, before, &session);
                            break;
                        }
                        Err(e) => {
                            warn!("Automatic stop failed: {}", e);
                            publish(&events, owner, before, &session);
                            break;
                        }
                    }
                }
            })
        };

        let pump = {
            let session = Arc::clone(&self.session);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PUMP_PERIOD);
                loop {
                    interval.tick().await;
                    let mut session = session.lock().await;
                    if !session.is_recording() {
                        break;
                    }
                    session.pump();
                }
            })
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(ticker);
        tasks.push(pump);
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.abort_tasks();
        if let Ok(mut session) = self.session.try_lock() {
            session.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::fake::FakePlayback;
    use crate::recording::fake::FakeCapture;
    use echo_common::ManualClock;
    use chrono::TimeZone;

    fn user() -> Uuid {
        Uuid::from_u128(7)
    }

    fn controller(capture: &FakeCapture, policy: RecordingPolicy) -> RecordingController {
        let playback = Arc::new(PlaybackCoordinator::new(Arc::new(FakePlayback::new())));
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap());
        RecordingController::new(Arc::new(capture.clone()), playback, policy, Arc::new(clock))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_auto_stops_at_ceiling() {
        let capture = FakeCapture::new();
        let controller = controller(&capture, RecordingPolicy::default());
        controller.start(user()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(59_500)).await;
        let status = controller.status(user()).await;
        assert_eq!(status.state, RecordingPhase::Recording);
        assert_eq!(status.elapsed_secs, 59);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = controller.status(user()).await;
        assert_eq!(status.state, RecordingPhase::Stopped);
        assert_eq!(status.elapsed_secs, 60);
        assert_eq!(status.elapsed, "01:00");
        assert!(status.has_clip);
        assert_eq!(capture.stop_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop_halts_timer() {
        let capture = FakeCapture::new();
        let controller = controller(&capture, RecordingPolicy::default());
        controller.start(user()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let stopped = controller.stop(user()).await.unwrap();
        assert_eq!(stopped.elapsed_secs, 3);
        assert_eq!(stopped.suggested_title.as_deref(), Some("Echo from March 9"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(controller.status(user()).await.elapsed_secs, 3);
        assert_eq!(capture.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_denied_permission_surfaces() {
        let capture = FakeCapture::new();
        capture.deny(true);
        let controller = controller(&capture, RecordingPolicy::default());

        assert!(matches!(controller.start(user()).await, Err(Error::Permission(_))));
        assert_eq!(controller.status(user()).await.state, RecordingPhase::PermissionDenied);
    }

    #[tokio::test]
    async fn test_preview_requires_clip() {
        let capture = FakeCapture::new();
        let controller = controller(&capture, RecordingPolicy::default());
        assert!(matches!(
            controller.toggle_preview(user()).await,
            Err(Error::InvalidState(_))
        ));

        controller.start(user()).await.unwrap();
        controller.stop(user()).await.unwrap();
        let preview = controller.toggle_preview(user()).await.unwrap();
        assert_eq!(preview.target, Some(PlaybackTarget::Preview));
    }

    #[tokio::test]
    async fn test_drop_while_recording_releases_microphone() {
        let capture = FakeCapture::new();
        {
            let controller = controller(&capture, RecordingPolicy::default());
            controller.start(user()).await.unwrap();
        }
        // Aborted tasks drop their session handles on the next scheduler turn
        tokio::task::yield_now().await;
        assert_eq!(capture.stop_calls(), 1);
        assert_eq!(capture.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_session_belongs_to_the_account_that_started_it() {
        let capture = FakeCapture::new();
        let controller = controller(&capture, RecordingPolicy::default());
        let other = Uuid::from_u128(8);
        controller.start(user()).await.unwrap();

        let seen = controller.status(other).await;
        assert!(!seen.available);
        assert_eq!(seen.state, RecordingPhase::Idle);
        assert!(matches!(controller.start(other).await, Err(Error::InvalidState(_))));
        assert!(matches!(controller.stop(other).await, Err(Error::InvalidState(_))));
        assert!(matches!(controller.discard(other).await, Err(Error::InvalidState(_))));
        assert_eq!(controller.status(user()).await.state, RecordingPhase::Recording);

        controller.stop(user()).await.unwrap();
        assert!(matches!(
            controller.toggle_preview(other).await,
            Err(Error::InvalidState(_))
        ));
        assert!(controller.status(user()).await.has_clip);

        // Free again once the holder discards
        controller.discard(user()).await.unwrap();
        assert!(controller.status(other).await.available);
        assert_eq!(controller.start(other).await.unwrap().state, RecordingPhase::Recording);
        assert_eq!(capture.live_streams(), 1);
    }
}
