//! Day-granular date helpers. Every interval comparison in the engine works on
//! calendar days; timestamps are truncated before they reach the engine.

use std::sync::RwLock;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Deserializer};

/// The only date type the engine reasons about.
pub type CalendarDate = NaiveDate;

/// Calendar day of a timestamp in its own offset.
pub fn day_of<Tz: TimeZone>(ts: &DateTime<Tz>) -> CalendarDate {
    ts.date_naive()
}

/// `00:00:00` on the given day.
pub fn start_of_day(date: CalendarDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Last representable instant (`23:59:59.999999999`) of the given day.
pub fn end_of_day(date: CalendarDate) -> NaiveDateTime {
    let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    date.and_time(last)
}

/// Shift a date by a signed number of days. Saturates at the chrono range.
pub fn add_days(date: CalendarDate, days: i64) -> CalendarDate {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.unwrap_or(if days >= 0 { NaiveDate::MAX } else { NaiveDate::MIN })
}

pub fn next_day(date: CalendarDate) -> CalendarDate {
    add_days(date, 1)
}

pub fn prev_day(date: CalendarDate) -> CalendarDate {
    add_days(date, -1)
}

/// Signed number of days from `from` to `to`.
pub fn days_between(from: CalendarDate, to: CalendarDate) -> i64 {
    (to - from).num_days()
}

/// Parse either a plain `YYYY-MM-DD` date or a full timestamp and keep only
/// the calendar day.
pub fn parse_day(raw: &str) -> Option<CalendarDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(day_of(&ts));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.date())
}

/// Serde adapter for interval endpoints: accepts dates or timestamps and
/// truncates to the day.
pub fn deserialize_day<'de, D>(deserializer: D) -> Result<CalendarDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_day(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid calendar date: {raw}")))
}

/// Source of "today". Injected everywhere the engine needs the current date.
pub trait Clock: Send + Sync {
    fn today(&self) -> CalendarDate;
}

/// Wall clock in the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> CalendarDate {
        day_of(&Local::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    today: RwLock<CalendarDate>,
}

impl ManualClock {
    pub fn new(today: CalendarDate) -> Self {
        Self {
            today: RwLock::new(today),
        }
    }

    pub fn set(&self, date: CalendarDate) {
        match self.today.write() {
            Ok(mut guard) => *guard = date,
            Err(poisoned) => *poisoned.into_inner() = date,
        }
    }

    pub fn advance_days(&self, days: i64) {
        let next = add_days(self.today(), days);
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> CalendarDate {
        match self.today.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn d(y: i32, m: u32, day: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn day_arithmetic_crosses_month_boundaries() {
        assert_eq!(next_day(d(2024, 1, 31)), d(2024, 2, 1));
        assert_eq!(prev_day(d(2024, 3, 1)), d(2024, 2, 29)); // leap year
        assert_eq!(add_days(d(2024, 1, 1), -1), d(2023, 12, 31));
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 1, 31)), 30);
        assert_eq!(days_between(d(2024, 1, 31), d(2024, 1, 1)), -30);
    }

    #[test]
    fn add_days_saturates() {
        assert_eq!(add_days(NaiveDate::MAX, 1), NaiveDate::MAX);
        assert_eq!(add_days(NaiveDate::MIN, -1), NaiveDate::MIN);
    }

    #[test]
    fn start_and_end_of_day() {
        let s = start_of_day(d(2024, 5, 5));
        let e = end_of_day(d(2024, 5, 5));
        assert_eq!(s.date(), e.date());
        assert_eq!(s.hour(), 0);
        assert_eq!(e.hour(), 23);
        assert_eq!(e.minute(), 59);
        assert!(s < e);
    }

    #[test]
    fn parse_day_ignores_time_of_day() {
        assert_eq!(parse_day("2024-01-15"), Some(d(2024, 1, 15)));
        assert_eq!(parse_day("2024-01-15T23:59:00Z"), Some(d(2024, 1, 15)));
        assert_eq!(parse_day("2024-01-15T10:30:00+07:00"), Some(d(2024, 1, 15)));
        assert_eq!(parse_day("2024-01-15T10:30:00.250"), Some(d(2024, 1, 15)));
        assert_eq!(parse_day("not a date"), None);
    }

    #[test]
    fn deserialize_day_from_json() {
        let date: CalendarDate =
            deserialize_day(&mut serde_json::Deserializer::from_str("\"2024-02-01T08:00:00Z\""))
                .unwrap();
        assert_eq!(date, d(2024, 2, 1));
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(d(2024, 1, 1));
        assert_eq!(clock.today(), d(2024, 1, 1));
        clock.advance_days(14);
        assert_eq!(clock.today(), d(2024, 1, 15));
        clock.set(d(2025, 6, 1));
        assert_eq!(clock.today(), d(2025, 6, 1));
    }
}
