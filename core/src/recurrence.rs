//! Recurrence patterns and next-due computation.
//!
//! Patterns are stored as strings on the task; parsing is total and falls
//! back to daily for anything unrecognized. Monthly is a fixed 30 days, not
//! a calendar month.

use chrono::{DateTime, Duration, Utc};

/// Recognized recurrence patterns and their durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrencePattern {
    OneMinute,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrencePattern {
    /// Parse a stored pattern string. Unknown patterns fall back to daily.
    pub fn parse(s: &str) -> RecurrencePattern {
        match s {
            "1m" => RecurrencePattern::OneMinute,
            "5m" => RecurrencePattern::FiveMinutes,
            "10m" => RecurrencePattern::TenMinutes,
            "15m" => RecurrencePattern::FifteenMinutes,
            "30m" => RecurrencePattern::ThirtyMinutes,
            "1h" => RecurrencePattern::Hourly,
            "daily" => RecurrencePattern::Daily,
            "weekly" => RecurrencePattern::Weekly,
            "monthly" => RecurrencePattern::Monthly,
            _ => RecurrencePattern::Daily,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecurrencePattern::OneMinute => "1m",
            RecurrencePattern::FiveMinutes => "5m",
            RecurrencePattern::TenMinutes => "10m",
            RecurrencePattern::FifteenMinutes => "15m",
            RecurrencePattern::ThirtyMinutes => "30m",
            RecurrencePattern::Hourly => "1h",
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            RecurrencePattern::OneMinute => Duration::minutes(1),
            RecurrencePattern::FiveMinutes => Duration::minutes(5),
            RecurrencePattern::TenMinutes => Duration::minutes(10),
            RecurrencePattern::FifteenMinutes => Duration::minutes(15),
            RecurrencePattern::ThirtyMinutes => Duration::minutes(30),
            RecurrencePattern::Hourly => Duration::hours(1),
            RecurrencePattern::Daily => Duration::days(1),
            RecurrencePattern::Weekly => Duration::weeks(1),
            // 30 days, not a calendar month
            RecurrencePattern::Monthly => Duration::days(30),
        }
    }
}

/// Compute the next due instant for a pattern string.
///
/// `base` is the original due date when set, else the completion instant.
pub fn next_due(pattern: &str, base: DateTime<Utc>) -> DateTime<Utc> {
    base + RecurrencePattern::parse(pattern).duration()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pattern_durations() {
        assert_eq!(RecurrencePattern::parse("1m").duration(), Duration::minutes(1));
        assert_eq!(RecurrencePattern::parse("5m").duration(), Duration::minutes(5));
        assert_eq!(RecurrencePattern::parse("10m").duration(), Duration::minutes(10));
        assert_eq!(RecurrencePattern::parse("15m").duration(), Duration::minutes(15));
        assert_eq!(RecurrencePattern::parse("30m").duration(), Duration::minutes(30));
        assert_eq!(RecurrencePattern::parse("1h").duration(), Duration::hours(1));
        assert_eq!(RecurrencePattern::parse("daily").duration(), Duration::days(1));
        assert_eq!(RecurrencePattern::parse("weekly").duration(), Duration::weeks(1));
        assert_eq!(RecurrencePattern::parse("monthly").duration(), Duration::days(30));
    }

    #[test]
    fn test_unknown_pattern_falls_back_to_daily() {
        assert_eq!(RecurrencePattern::parse("fortnightly"), RecurrencePattern::Daily);
        assert_eq!(RecurrencePattern::parse(""), RecurrencePattern::Daily);
    }

    #[test]
    fn test_next_due_from_base() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            next_due("daily", base),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            next_due("weekly", base),
            Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap()
        );
        // Monthly is 30 days: Jan 1 + 30d = Jan 31
        assert_eq!(
            next_due("monthly", base),
            Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap()
        );
    }
}
