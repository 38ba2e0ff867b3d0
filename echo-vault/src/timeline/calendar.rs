//! Month grid for the calendar view
//!
//! Always 6 rows of 7 days, Sunday first. Cells outside the month are blank
//! (`day_number == 0`, no date).

use chrono::{Datelike, NaiveDate, TimeZone};
use echo_common::models::Echo;
use serde::Serialize;
use std::collections::HashMap;

pub const GRID_CELLS: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub day_number: u32,
    pub is_in_current_month: bool,
    pub date: Option<NaiveDate>,
    pub has_entry: bool,
    pub all_entries_unlocked: bool,
}

impl CalendarDay {
    fn blank() -> Self {
        Self {
            day_number: 0,
            is_in_current_month: false,
            date: None,
            has_entry: false,
            all_entries_unlocked: false,
        }
    }
}

fn first_of_month(month: NaiveDate) -> NaiveDate {
    month.with_day(1).unwrap_or(month)
}

fn days_in_month(first: NaiveDate) -> u32 {
    let (year, month) = match first.month() {
        12 => (first.year() + 1, 1),
        m => (first.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .map_or(31, |last| last.day())
}

/// Grid for the month containing `month`.
///
/// A day has an entry when any record unlocks on it in `tz`; it is marked
/// unlocked only when every such record is.
pub fn build_month_grid<Tz: TimeZone>(month: NaiveDate, records: &[Echo], tz: &Tz) -> Vec<CalendarDay> {
    let first = first_of_month(month);

    // date -> all unlocked so far
    let mut entries: HashMap<NaiveDate, bool> = HashMap::new();
    for echo in records {
        let day = echo.unlock_date.with_timezone(tz).date_naive();
        if day.year() == first.year() && day.month() == first.month() {
            let all = entries.entry(day).or_insert(true);
            *all = *all && echo.unlocked;
        }
    }

    let leading = first.weekday().num_days_from_sunday() as usize;
    let mut grid = Vec::with_capacity(GRID_CELLS);
    grid.extend((0..leading).map(|_| CalendarDay::blank()));

    for day_number in 1..=days_in_month(first) {
        let date = first.with_day(day_number);
        let entry = date.and_then(|d| entries.get(&d).copied());
        grid.push(CalendarDay {
            day_number,
            is_in_current_month: true,
            date,
            has_entry: entry.is_some(),
            all_entries_unlocked: entry.unwrap_or(false),
        });
    }

    grid.resize_with(GRID_CELLS, CalendarDay::blank);
    grid
}

/// Records unlocking on `date` in `tz`, input order
pub fn echoes_on_day<Tz: TimeZone>(records: &[Echo], date: NaiveDate, tz: &Tz) -> Vec<Echo> {
    records
        .iter()
        .filter(|e| e.unlock_date.with_timezone(tz).date_naive() == date)
        .cloned()
        .collect()
}
