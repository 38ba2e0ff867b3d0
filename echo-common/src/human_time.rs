//! Human-readable time formatting
//!
//! Provides consistent duration and date display across EchoVerse views:
//! - Echo durations and averages: `M:SS` (minutes unpadded)
//! - Recording timer: `MM:SS` (both fields padded)
//! - Calendar/list dates: `DD/MM/YYYY`
//! - Month headings: `Month YYYY`

use chrono::{Datelike, NaiveDate};

/// Format whole seconds as `M:SS`.
///
/// # Examples
///
/// ```
/// use echo_common::human_time::format_duration;
///
/// assert_eq!(format_duration(0), "0:00");
/// assert_eq!(format_duration(45), "0:45");
/// assert_eq!(format_duration(125), "2:05");
/// assert_eq!(format_duration(3600), "60:00");
/// ```
pub fn format_duration(seconds: u32) -> String {
    let minutes = seconds / 60;
    let remaining = seconds % 60;
    format!("{}:{:02}", minutes, remaining)
}

/// Format elapsed recording time as `MM:SS`.
///
/// ```
/// use echo_common::human_time::format_timer;
///
/// assert_eq!(format_timer(7), "00:07");
/// assert_eq!(format_timer(60), "01:00");
/// ```
pub fn format_timer(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format fractional playback position as `M:SS`, truncating partial seconds
pub fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return format_duration(0);
    }
    format_duration(seconds.floor() as u32)
}

/// `"1 day"`, `"3 days"`, `"0 days"`
pub fn pluralize(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Format a calendar date as `DD/MM/YYYY`
pub fn format_day(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Month heading used to group timeline entries, e.g. `"March 2025"`.
///
/// Month names are always English so group keys are stable regardless of
/// the host locale.
pub fn month_heading(date: NaiveDate) -> String {
    format!("{} {}", month_name(date.month()), date.year())
}

/// English month name for 1-based month number
pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "Unknown",
    }
}

/// Capitalize the first character (mood labels)
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
