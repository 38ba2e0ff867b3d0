//! Echo Unlock & Timeline Engine
//!
//! Every view reads from a [`TimelineSnapshot`], which is only built after
//! lock state has been reconciled against "now". The projections are pure
//! functions over that snapshot.

pub mod calendar;
pub mod countdown;
pub mod grouping;
pub mod stats;
pub mod unlock;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use echo_common::human_time::{capitalize, format_day, format_duration, month_heading};
use echo_common::models::{Echo, EchoFilter, EchoOrder};
use echo_common::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::RecordStore;

pub use calendar::{build_month_grid, echoes_on_day, CalendarDay, GRID_CELLS};
pub use countdown::{time_until_unlock, unlock_countdown, Countdown};
pub use grouping::{available_moods, filter_echoes, group_by_month, LockFilter, MonthGroup};
pub use stats::{compute_stats, DashboardStats};
pub use unlock::{reconcile_unlocks, select_featured, Reconciled};

/// One echo with its display fields.
///
/// A locked echo's view carries no audio URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EchoView {
    #[serde(flatten)]
    pub echo: Echo,
    /// `M:SS`
    pub duration: String,
    pub mood_label: String,
    /// `DD/MM/YYYY` in the view time zone
    pub created_day: String,
    pub unlock_day: String,
    pub countdown: Countdown,
}

impl EchoView {
    pub fn new<Tz: TimeZone>(echo: &Echo, now: DateTime<Utc>, tz: &Tz) -> Self {
        let mut shown = echo.clone();
        if !shown.unlocked {
            shown.audio_url.clear();
        }
        Self {
            duration: format_duration(echo.duration_seconds),
            mood_label: capitalize(&echo.mood),
            created_day: format_day(echo.created_at.with_timezone(tz).date_naive()),
            unlock_day: format_day(echo.unlock_date.with_timezone(tz).date_naive()),
            countdown: if echo.unlocked {
                Countdown::Unlocked
            } else {
                unlock_countdown(echo.unlock_date, now)
            },
            echo: shown,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub stats: DashboardStats,
    pub featured: Option<EchoView>,
    pub filter: LockFilter,
    pub echoes: Vec<EchoView>,
    pub newly_unlocked: Vec<Uuid>,
    /// Lock flags could not be reconciled; shown as stored
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthGroupView {
    pub month: String,
    pub echoes: Vec<EchoView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineView {
    pub groups: Vec<MonthGroupView>,
    pub moods: Vec<String>,
    pub total: usize,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarView {
    /// `"Month YYYY"`
    pub month: String,
    pub year: i32,
    pub month_number: u32,
    pub days: Vec<CalendarDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub label: String,
    pub echoes: Vec<EchoView>,
}

/// Reconciled echoes of one owner, newest first
#[derive(Debug, Clone)]
pub struct TimelineSnapshot {
    pub owner: Uuid,
    pub now: DateTime<Utc>,
    pub echoes: Vec<Echo>,
    pub newly_unlocked: Vec<Uuid>,
    pub stale: bool,
}

impl TimelineSnapshot {
    fn views<Tz: TimeZone>(&self, records: &[Echo], tz: &Tz) -> Vec<EchoView> {
        records.iter().map(|e| EchoView::new(e, self.now, tz)).collect()
    }

    pub fn find(&self, id: Uuid) -> Option<&Echo> {
        self.echoes.iter().find(|e| e.id == id)
    }

    pub fn dashboard<Tz: TimeZone>(&self, filter: LockFilter, tz: &Tz) -> DashboardView {
        DashboardView {
            stats: compute_stats(&self.echoes),
            featured: select_featured(&self.echoes).map(|e| EchoView::new(e, self.now, tz)),
            filter,
            echoes: self.views(&filter.apply(&self.echoes), tz),
            newly_unlocked: self.newly_unlocked.clone(),
            stale: self.stale,
        }
    }

    pub fn timeline<Tz: TimeZone>(&self, query: Option<&str>, mood: Option<&str>, tz: &Tz) -> TimelineView {
        let filtered = filter_echoes(&self.echoes, query, mood);
        let groups = group_by_month(&filtered, tz)
            .into_iter()
            .map(|g| MonthGroupView {
                month: g.month,
                echoes: self.views(&g.echoes, tz),
            })
            .collect();

        TimelineView {
            groups,
            moods: available_moods(&self.echoes),
            total: filtered.len(),
            stale: self.stale,
        }
    }

    pub fn calendar<Tz: TimeZone>(&self, month: NaiveDate, tz: &Tz) -> CalendarView {
        CalendarView {
            month: month_heading(month),
            year: month.year(),
            month_number: month.month(),
            days: build_month_grid(month, &self.echoes, tz),
        }
    }

    pub fn day<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> DayView {
        DayView {
            date,
            label: format_day(date),
            echoes: self.views(&echoes_on_day(&self.echoes, date, tz), tz),
        }
    }
}

pub struct TimelineEngine {
    store: Arc<dyn RecordStore>,
}

impl TimelineEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Load and reconcile `owner`'s echoes.
    ///
    /// A failed unlock update is logged and the stored flags are returned
    /// with `stale` set; a failed load is an error.
    pub async fn snapshot(&self, owner: Uuid, now: DateTime<Utc>) -> Result<TimelineSnapshot> {
        let records = self
            .store
            .select_echoes(&EchoFilter::owner(owner), EchoOrder::CreatedAtDesc)
            .await?;

        match reconcile_unlocks(self.store.as_ref(), owner, records.clone(), now).await {
            Ok(reconciled) => Ok(TimelineSnapshot {
                owner,
                now,
                echoes: reconciled.echoes,
                newly_unlocked: reconciled.newly_unlocked,
                stale: false,
            }),
            Err(e) => {
                warn!("Unlock reconciliation failed for {}: {}", owner, e);
                Ok(TimelineSnapshot {
                    owner,
                    now,
                    echoes: records,
                    newly_unlocked: Vec::new(),
                    stale: true,
                })
            }
        }
    }

    /// Unlock whatever is due for `owner`; returns the newly unlocked ids
    pub async fn reconcile_owner(&self, owner: Uuid, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let due = self
            .store
            .select_echoes(
                &EchoFilter::owner(owner).with_unlocked(false).due_by(now),
                EchoOrder::UnlockDateAsc,
            )
            .await?;
        if due.is_empty() {
            debug!("Nothing due for {}", owner);
            return Ok(Vec::new());
        }
        let reconciled = reconcile_unlocks(self.store.as_ref(), owner, due, now).await?;
        Ok(reconciled.newly_unlocked)
    }
}
