//! Event types for the EchoVerse event system
//!
//! Provides the shared event definitions, the EventBus used as the Record
//! Store change feed, and subscription handles that deregister on drop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tables whose changes are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Echoes,
    Profiles,
    UserSettings,
}

/// Recording session state as published to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    Idle,
    RequestingPermission,
    Recording,
    Stopped,
    PermissionDenied,
    Submitted,
}

/// Playback state of the single playback resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// EchoVerse event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EchoEvent {
    /// A new echo was stored
    EchoInserted {
        user_id: Uuid,
        echo_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// One or more echoes crossed their unlock date and were flipped
    EchoesUnlocked {
        user_id: Uuid,
        echo_ids: Vec<Uuid>,
        timestamp: DateTime<Utc>,
    },

    ProfileUpdated {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    SettingsUpdated {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Recording session transitioned
    RecordingStateChanged {
        /// Account holding the microphone
        user_id: Uuid,
        old_state: RecordingPhase,
        new_state: RecordingPhase,
        elapsed_seconds: u32,
        timestamp: DateTime<Utc>,
    },

    /// Playback resource changed state
    PlaybackStateChanged {
        /// Account that started the playback
        user_id: Uuid,
        /// Echo id, or None for the recording preview
        echo_id: Option<Uuid>,
        state: PlaybackState,
        timestamp: DateTime<Utc>,
    },
}

impl EchoEvent {
    /// Table this event reports a change for, if it is a store change
    pub fn table(&self) -> Option<Table> {
        match self {
            EchoEvent::EchoInserted { .. } | EchoEvent::EchoesUnlocked { .. } => {
                Some(Table::Echoes)
            }
            EchoEvent::ProfileUpdated { .. } => Some(Table::Profiles),
            EchoEvent::SettingsUpdated { .. } => Some(Table::UserSettings),
            EchoEvent::RecordingStateChanged { .. } | EchoEvent::PlaybackStateChanged { .. } => {
                None
            }
        }
    }

    /// Account the event belongs to
    pub fn user_id(&self) -> Uuid {
        match self {
            EchoEvent::EchoInserted { user_id, .. }
            | EchoEvent::EchoesUnlocked { user_id, .. }
            | EchoEvent::ProfileUpdated { user_id, .. }
            | EchoEvent::SettingsUpdated { user_id, .. }
            | EchoEvent::RecordingStateChanged { user_id, .. }
            | EchoEvent::PlaybackStateChanged { user_id, .. } => *user_id,
        }
    }

    /// Event name used for the SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            EchoEvent::EchoInserted { .. } => "EchoInserted",
            EchoEvent::EchoesUnlocked { .. } => "EchoesUnlocked",
            EchoEvent::ProfileUpdated { .. } => "ProfileUpdated",
            EchoEvent::SettingsUpdated { .. } => "SettingsUpdated",
            EchoEvent::RecordingStateChanged { .. } => "RecordingStateChanged",
            EchoEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
        }
    }
}

/// Callback invoked for each matching change
pub type ChangeCallback = Arc<dyn Fn(EchoEvent) + Send + Sync>;

/// Live registration of a change callback.
///
/// Dropping the handle (or passing it to `unsubscribe`) stops delivery.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    table: Table,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use echo_common::events::{EventBus, EchoEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(EchoEvent::ProfileUpdated {
///     user_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EchoEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EchoEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: EchoEvent) -> Result<usize, broadcast::error::SendError<EchoEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EchoEvent) {
        let _ = self.tx.send(event);
    }

    /// Register `callback` for store changes on `table`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_change(&self, table: Table, callback: ChangeCallback) -> SubscriptionHandle {
        let mut rx = self.tx.subscribe();
        let id = Uuid::new_v4();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.table() == Some(table) {
                            callback(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Change subscription {} lagged, skipped {} events", id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Change subscription {} closed", id);
                        break;
                    }
                }
            }
        });

        SubscriptionHandle { id, table, task }
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
