//! "Unlocks in ..." text

use chrono::{DateTime, Utc};
use echo_common::human_time::pluralize;
use serde::Serialize;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Distance between `unlock_date` and `now` in whole days (rounded up),
/// shown as months once it exceeds 30 days.
///
/// The distance is absolute, so a past date reads the same as a future one.
/// Use [`unlock_countdown`] when the sign matters.
pub fn time_until_unlock(unlock_date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let millis = (unlock_date - now).num_milliseconds().abs();
    let days = (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    if days > 30 {
        pluralize(days / 30, "month")
    } else {
        pluralize(days, "day")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "remaining", rename_all = "snake_case")]
pub enum Countdown {
    Unlocked,
    Remaining(String),
}

pub fn unlock_countdown(unlock_date: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
    if unlock_date <= now {
        Countdown::Unlocked
    } else {
        Countdown::Remaining(time_until_unlock(unlock_date, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_days_round_up() {
        assert_eq!(time_until_unlock(now() + Duration::hours(1), now()), "1 day");
        assert_eq!(time_until_unlock(now() + Duration::hours(25), now()), "2 days");
        assert_eq!(time_until_unlock(now() + Duration::days(30), now()), "30 days");
        assert_eq!(time_until_unlock(now(), now()), "0 days");
    }

    #[test]
    fn test_months_after_thirty_days() {
        assert_eq!(
            time_until_unlock(now() + Duration::days(30) + Duration::minutes(1), now()),
            "1 month"
        );
        assert_eq!(time_until_unlock(now() + Duration::days(61), now()), "2 months");
        assert_eq!(time_until_unlock(now() + Duration::days(365), now()), "12 months");
    }

    #[test]
    fn test_past_dates_use_absolute_distance() {
        assert_eq!(time_until_unlock(now() - Duration::days(3), now()), "3 days");
    }

    #[test]
    fn test_countdown_is_signed() {
        assert_eq!(unlock_countdown(now() - Duration::days(3), now()), Countdown::Unlocked);
        assert_eq!(unlock_countdown(now(), now()), Countdown::Unlocked);
        assert_eq!(
            unlock_countdown(now() + Duration::days(3), now()),
            Countdown::Remaining("3 days".to_string())
        );
    }
}
