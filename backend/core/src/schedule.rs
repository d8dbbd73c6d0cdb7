//! Weekly cycle boundaries.
//!
//! A boundary is a weekday and time-of-day in a fixed UTC offset. The first
//! boundary is the next occurrence on or after startup; every later one is
//! exactly seven days after the previous, never re-derived from "now".

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveTime, TimeDelta, Utc, Weekday};
use thiserror::Error;

/// Length of one cycle in days.
pub const CYCLE_DAYS: i64 = 7;

pub fn cycle_length() -> TimeDelta {
    TimeDelta::days(CYCLE_DAYS)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryParseError {
    #[error("unknown weekday '{0}'")]
    Weekday(String),
    #[error("time '{0}' is not HH:MM")]
    Time(String),
    #[error("UTC offset '{0}' is not +HH:MM")]
    Offset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyBoundary {
    weekday: Weekday,
    time: NaiveTime,
    offset: FixedOffset,
}

impl WeeklyBoundary {
    pub fn new(weekday: Weekday, time: NaiveTime, offset: FixedOffset) -> Self {
        Self { weekday, time, offset }
    }

    /// Parse `("sunday", "16:00", "+01:00")`-style settings.
    pub fn parse(weekday: &str, time: &str, offset: &str) -> Result<Self, BoundaryParseError> {
        let weekday = Weekday::from_str(weekday.trim())
            .map_err(|_| BoundaryParseError::Weekday(weekday.to_string()))?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .map_err(|_| BoundaryParseError::Time(time.to_string()))?;
        let offset = FixedOffset::from_str(offset.trim())
            .map_err(|_| BoundaryParseError::Offset(offset.to_string()))?;
        Ok(Self::new(weekday, time, offset))
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// Next boundary at or after `now`. A `now` that sits exactly on the
    /// boundary is returned unchanged.
    pub fn next_on_or_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let days_ahead = (7 + self.weekday.num_days_from_monday()
            - local.weekday().num_days_from_monday())
            % 7;
        let date = local.date_naive() + Days::new(u64::from(days_ahead));
        let local_naive = date.and_time(self.time);
        let utc_naive = local_naive - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        let candidate = DateTime::<Utc>::from_naive_utc_and_offset(utc_naive, Utc);

        if candidate < now {
            candidate + cycle_length()
        } else {
            candidate
        }
    }

    /// The boundary after `fired`, which must itself be a boundary.
    ///
    /// If the process slept through whole cycles, the missed ones are
    /// skipped and the next future boundary is returned.
    pub fn following(&self, fired: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = fired + cycle_length();
        if next < now {
            self.next_on_or_after(now)
        } else {
            next
        }
    }
}

impl fmt::Display for WeeklyBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} UTC{}", self.weekday, self.time.format("%H:%M"), self.offset)
    }
}

/// Human countdown used in logs: whole days when at least one day remains,
/// otherwise whole hours.
pub fn describe_remaining(remaining: TimeDelta) -> String {
    let days = remaining.num_days();
    if days > 0 {
        format!("{days} days")
    } else {
        format!("{} hours", remaining.num_hours().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sunday_16_utc() -> WeeklyBoundary {
        WeeklyBoundary::parse("sunday", "16:00", "+00:00").unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn next_boundary_later_same_week() {
        // 2024-06-12 is a Wednesday.
        let next = sunday_16_utc().next_on_or_after(utc(2024, 6, 12, 9, 30));
        assert_eq!(next, utc(2024, 6, 16, 16, 0));
    }

    #[test]
    fn now_on_the_boundary_fires_immediately() {
        let now = utc(2024, 6, 16, 16, 0);
        assert_eq!(sunday_16_utc().next_on_or_after(now), now);
    }

    #[test]
    fn boundary_day_after_the_time_rolls_a_week() {
        let next = sunday_16_utc().next_on_or_after(utc(2024, 6, 16, 16, 1));
        assert_eq!(next, utc(2024, 6, 23, 16, 0));
    }

    #[test]
    fn offset_is_applied() {
        let boundary = WeeklyBoundary::parse("Sun", "16:00", "+03:00").unwrap();
        let next = boundary.next_on_or_after(utc(2024, 6, 12, 0, 0));
        assert_eq!(next, utc(2024, 6, 16, 13, 0));
    }

    #[test]
    fn offset_can_shift_the_local_weekday() {
        // Saturday 23:00 UTC is already Sunday 01:00 at +02:00.
        let boundary = WeeklyBoundary::parse("sunday", "00:30", "+02:00").unwrap();
        let next = boundary.next_on_or_after(utc(2024, 6, 15, 23, 0));
        assert_eq!(next, utc(2024, 6, 22, 22, 30));
    }

    #[test]
    fn following_is_exactly_one_cycle_later() {
        let boundary = sunday_16_utc();
        let fired = utc(2024, 6, 16, 16, 0);
        let late_now = fired + TimeDelta::minutes(3);
        assert_eq!(boundary.following(fired, late_now), utc(2024, 6, 23, 16, 0));
    }

    #[test]
    fn following_skips_missed_cycles() {
        let boundary = sunday_16_utc();
        let fired = utc(2024, 6, 2, 16, 0);
        let now = utc(2024, 6, 19, 8, 0);
        assert_eq!(boundary.following(fired, now), utc(2024, 6, 23, 16, 0));
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            WeeklyBoundary::parse("funday", "16:00", "+00:00"),
            Err(BoundaryParseError::Weekday(_))
        ));
        assert!(matches!(
            WeeklyBoundary::parse("sunday", "25:00", "+00:00"),
            Err(BoundaryParseError::Time(_))
        ));
        assert!(matches!(
            WeeklyBoundary::parse("sunday", "16:00", "London"),
            Err(BoundaryParseError::Offset(_))
        ));
    }

    #[test]
    fn countdown_switches_to_hours_on_the_last_day() {
        assert_eq!(describe_remaining(TimeDelta::hours(50)), "2 days");
        assert_eq!(describe_remaining(TimeDelta::hours(23)), "23 hours");
        assert_eq!(describe_remaining(TimeDelta::minutes(-5)), "0 hours");
    }
}
