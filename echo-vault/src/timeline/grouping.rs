//! Timeline list: search, mood filter and month grouping

use chrono::TimeZone;
use echo_common::human_time::month_heading;
use echo_common::models::Echo;
use serde::{Deserialize, Serialize};

/// Echoes sharing a `created_at` month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthGroup {
    /// `"Month YYYY"`
    pub month: String,
    pub echoes: Vec<Echo>,
}

/// Dashboard list filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockFilter {
    #[default]
    All,
    Unlocked,
    Locked,
}

impl LockFilter {
    pub fn matches(&self, echo: &Echo) -> bool {
        match self {
            LockFilter::All => true,
            LockFilter::Unlocked => echo.unlocked,
            LockFilter::Locked => !echo.unlocked,
        }
    }

    pub fn apply(&self, records: &[Echo]) -> Vec<Echo> {
        records.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

/// Group by creation month in `tz`.
///
/// Groups appear in first-seen order and keep the input order of their
/// records, so newest-first input yields newest-first months.
pub fn group_by_month<Tz: TimeZone>(records: &[Echo], tz: &Tz) -> Vec<MonthGroup> {
    let mut groups: Vec<MonthGroup> = Vec::new();
    for echo in records {
        let month = month_heading(echo.created_at.with_timezone(tz).date_naive());
        match groups.iter_mut().find(|g| g.month == month) {
            Some(group) => group.echoes.push(echo.clone()),
            None => groups.push(MonthGroup {
                month,
                echoes: vec![echo.clone()],
            }),
        }
    }
    groups
}

/// Case-insensitive title search plus exact mood match.
///
/// An empty query, and a mood of `"all"` or none, do not filter.
pub fn filter_echoes(records: &[Echo], query: Option<&str>, mood: Option<&str>) -> Vec<Echo> {
    let query = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);
    let mood = mood.filter(|m| !m.is_empty() && *m != "all");

    records
        .iter()
        .filter(|e| match &query {
            Some(q) => e.title.to_lowercase().contains(q.as_str()),
            None => true,
        })
        .filter(|e| mood.map_or(true, |m| e.mood == m))
        .cloned()
        .collect()
}

/// Distinct moods in first-seen order
pub fn available_moods(records: &[Echo]) -> Vec<String> {
    let mut moods: Vec<String> = Vec::new();
    for echo in records {
        if !moods.contains(&echo.mood) {
            moods.push(echo.mood.clone());
        }
    }
    moods
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use uuid::Uuid;

    fn echo(title: &str, mood: &str, created: &str, unlocked: bool) -> Echo {
        let created_at = created.parse().unwrap();
        Echo {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: title.to_string(),
            mood: mood.to_string(),
            created_at,
            unlock_date: created_at,
            duration_seconds: 20,
            unlocked,
            audio_url: String::new(),
        }
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let records = vec![
            echo("a", "calm", "2025-04-02T10:00:00Z", true),
            echo("b", "calm", "2025-03-28T10:00:00Z", true),
            echo("c", "calm", "2025-03-05T10:00:00Z", false),
        ];

        let groups = group_by_month(&records, &Utc);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].month, "April 2025");
        assert_eq!(groups[0].echoes[0].title, "a");
        assert_eq!(groups[1].month, "March 2025");
        let titles: Vec<&str> = groups[1].echoes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn test_grouping_uses_timezone() {
        let records = vec![echo("late", "calm", "2025-03-31T23:30:00Z", true)];
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();

        assert_eq!(group_by_month(&records, &Utc)[0].month, "March 2025");
        assert_eq!(group_by_month(&records, &plus_two)[0].month, "April 2025");
    }

    #[test]
    fn test_filter_by_query_and_mood() {
        let records = vec![
            echo("Morning Walk", "calm", "2025-03-01T10:00:00Z", true),
            echo("Evening walk", "happy", "2025-03-02T10:00:00Z", true),
            echo("Gym", "calm", "2025-03-03T10:00:00Z", true),
        ];

        assert_eq!(filter_echoes(&records, Some("WALK"), None).len(), 2);
        assert_eq!(filter_echoes(&records, Some("walk"), Some("calm")).len(), 1);
        assert_eq!(filter_echoes(&records, Some("  "), Some("all")).len(), 3);
        assert!(filter_echoes(&records, None, Some("anxious")).is_empty());
    }

    #[test]
    fn test_lock_filter() {
        let records = vec![
            echo("a", "calm", "2025-03-01T10:00:00Z", true),
            echo("b", "calm", "2025-03-02T10:00:00Z", false),
        ];
        assert_eq!(LockFilter::All.apply(&records).len(), 2);
        assert_eq!(LockFilter::Unlocked.apply(&records)[0].title, "a");
        assert_eq!(LockFilter::Locked.apply(&records)[0].title, "b");
    }

    #[test]
    fn test_available_moods_distinct() {
        let records = vec![
            echo("a", "calm", "2025-03-01T10:00:00Z", true),
            echo("b", "happy", "2025-03-02T10:00:00Z", true),
            echo("c", "calm", "2025-03-03T10:00:00Z", true),
        ];
        assert_eq!(available_moods(&records), vec!["calm", "happy"]);
    }
}
