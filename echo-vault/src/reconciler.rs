//! Background unlock reconciliation
//!
//! Runs every `reconcile_interval_secs` and whenever the Record Store
//! reports a change to `echoes`. Only owners seen by the authenticated API
//! are reconciled.

use echo_common::events::{SubscriptionHandle, Table};
use echo_common::Clock;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::RecordStore;
use crate::timeline::TimelineEngine;

/// Reconciler configuration
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

pub struct Reconciler {
    engine: Arc<TimelineEngine>,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    owners: RwLock<HashSet<Uuid>>,
}

impl Reconciler {
    pub fn new(
        engine: Arc<TimelineEngine>,
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            clock,
            config,
            owners: RwLock::new(HashSet::new()),
        }
    }

    /// Start reconciling `owner`. Returns `true` if it was not tracked yet.
    pub fn track(&self, owner: Uuid) -> bool {
        let added = self
            .owners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(owner);
        if added {
            debug!("Tracking owner {}", owner);
        }
        added
    }

    pub fn tracked(&self) -> Vec<Uuid> {
        self.owners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    /// Reconcile every tracked owner once; returns how many echoes unlocked.
    ///
    /// Failures are logged and left for the next run.
    pub async fn run_once(&self) -> usize {
        let now = self.clock.now();
        let mut unlocked = 0;
        for owner in self.tracked() {
            match self.engine.reconcile_owner(owner, now).await {
                Ok(ids) => unlocked += ids.len(),
                Err(e) => warn!("Reconciliation for {} failed, will retry: {}", owner, e),
            }
        }
        unlocked
    }

    /// Run in the background until the handle is dropped
    pub fn spawn(self: Arc<Self>) -> ReconcilerHandle {
        let notify = Arc::new(Notify::new());
        let subscription = {
            let notify = Arc::clone(&notify);
            self.store
                .subscribe(Table::Echoes, Arc::new(move |_| notify.notify_one()))
        };

        let interval = self.config.interval;
        let task = tokio::spawn(async move {
            info!("Reconciler started (every {} s)", interval.as_secs());
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = notify.notified() => {
                        debug!("Echo change notification");
                    }
                }
                let unlocked = self.run_once().await;
                if unlocked > 0 {
                    info!("Reconciler unlocked {} echo(es)", unlocked);
                }
            }
        });

        ReconcilerHandle {
            task,
            _subscription: subscription,
        }
    }
}

/// Owns the reconciler task and its change subscription
pub struct ReconcilerHandle {
    task: JoinHandle<()>,
    _subscription: SubscriptionHandle,
}

impl ReconcilerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
