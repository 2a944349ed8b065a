use chrono::{DateTime, Datelike, FixedOffset, Offset, Timelike, Utc};

use crate::models::Season;

/// Calendar fields of one timestamp in the configured local offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFeatures {
    pub hour: u32,
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub season: Season,
}

pub fn temporal_features(timestamp: DateTime<Utc>, offset: FixedOffset) -> TemporalFeatures {
    let local = timestamp.with_timezone(&offset);
    let day_of_week = local.weekday().num_days_from_monday();

    TemporalFeatures {
        hour: local.hour(),
        day_of_week,
        is_weekend: day_of_week >= 5,
        season: Season::from_month(local.month()),
    }
}

/// Offset from minutes east of UTC, falling back to UTC when out of range.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weekday_and_weekend() {
        // 2024-06-15 is a Saturday.
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        let features = temporal_features(ts, offset_from_minutes(0));
        assert_eq!(features.day_of_week, 5);
        assert!(features.is_weekend);
        assert_eq!(features.hour, 8);
        assert_eq!(features.season, Season::Summer);

        let monday = Utc.with_ymd_and_hms(2024, 6, 17, 8, 0, 0).unwrap();
        let features = temporal_features(monday, offset_from_minutes(0));
        assert_eq!(features.day_of_week, 0);
        assert!(!features.is_weekend);
    }

    #[test]
    fn test_offset_shifts_calendar() {
        // 22:30 UTC on Feb 29 is 01:30 on Mar 1 at UTC+3.
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 22, 30, 0).unwrap();
        let features = temporal_features(ts, offset_from_minutes(180));
        assert_eq!(features.hour, 1);
        assert_eq!(features.season, Season::Spring);
        assert_eq!(features.day_of_week, 4);
    }
}
