//! Dashboard counters

use echo_common::human_time::format_duration;
use echo_common::models::Echo;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub unlocked: usize,
    pub locked: usize,
    pub average_duration_secs: u32,
    /// `M:SS`
    pub average_duration: String,
}

/// Counts and mean duration, rounded to the nearest second
pub fn compute_stats(records: &[Echo]) -> DashboardStats {
    let total = records.len();
    let unlocked = records.iter().filter(|e| e.unlocked).count();
    let average = if total == 0 {
        0
    } else {
        let sum: u64 = records.iter().map(|e| e.duration_seconds as u64).sum();
        (sum as f64 / total as f64).round() as u32
    };

    DashboardStats {
        total,
        unlocked,
        locked: total - unlocked,
        average_duration_secs: average,
        average_duration: format_duration(average),
    }
}
