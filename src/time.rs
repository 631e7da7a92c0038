use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Day-first formats tried in order. Two-digit years go first because `%Y`
/// would otherwise accept "26" as the year 26. ISO forms are accepted too.
const DATE_FORMATS: [&str; 11] = [
    "%d-%m-%y",
    "%d/%m/%y",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d-%B-%Y",
    "%d %B %Y",
];

/// Parse a raw date string using the day-first convention.
///
/// A trailing time portion ("02-01-2026 00:00:00", "2026-01-02T10:00") is ignored.
pub fn parse_day_first(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let date_part = trimmed
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(trimmed);

    for candidate in [trimmed, date_part] {
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, fmt) {
                return Some(date);
            }
        }
    }
    None
}

/// A calendar month, stored as its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month(NaiveDate);

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Month)
    }

    pub fn of(date: NaiveDate) -> Self {
        Month(date.with_day(1).unwrap_or(date))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// The month `n` months later.
    pub fn plus(&self, n: u32) -> Month {
        Month(self.0.checked_add_months(Months::new(n)).unwrap_or(self.0))
    }

    pub fn succ(&self) -> Month {
        self.plus(1)
    }

    /// Number of months from `self` to `later` (negative if `later` is earlier).
    pub fn months_until(&self, later: &Month) -> i64 {
        (later.year() as i64 - self.year() as i64) * 12 + later.month() as i64 - self.month() as i64
    }

    /// Every month from `start` to `end`, inclusive.
    pub fn range_inclusive(start: Month, end: Month) -> Vec<Month> {
        let mut out = Vec::new();
        let mut current = start;
        while current <= end {
            out.push(current);
            current = current.succ();
        }
        out
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        Month::new(y.parse().ok()?, m.parse().ok()?)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Month::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid month '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_first() {
        assert_eq!(parse_day_first("02-01-2026"), NaiveDate::from_ymd_opt(2026, 1, 2));
        assert_eq!(parse_day_first("02/01/2026"), NaiveDate::from_ymd_opt(2026, 1, 2));
        assert_eq!(parse_day_first("13-12-2025"), NaiveDate::from_ymd_opt(2025, 12, 13));
    }

    #[test]
    fn test_iso_and_time_suffix() {
        assert_eq!(parse_day_first("2025-03-09"), NaiveDate::from_ymd_opt(2025, 3, 9));
        assert_eq!(
            parse_day_first("09-03-2025 00:00:00"),
            NaiveDate::from_ymd_opt(2025, 3, 9)
        );
        assert_eq!(
            parse_day_first("2025-03-09T12:30:00"),
            NaiveDate::from_ymd_opt(2025, 3, 9)
        );
        assert_eq!(parse_day_first("9 Mar 2025"), NaiveDate::from_ymd_opt(2025, 3, 9));
    }

    #[test]
    fn test_garbage_dates() {
        assert_eq!(parse_day_first(""), None);
        assert_eq!(parse_day_first("Date"), None);
        assert_eq!(parse_day_first("31-02-2025"), None);
    }

    #[test]
    fn test_month_arithmetic() {
        let nov = Month::new(2024, 11).unwrap();
        assert_eq!(nov.plus(3), Month::new(2025, 2).unwrap());
        assert_eq!(nov.months_until(&Month::new(2025, 2).unwrap()), 3);
        assert_eq!(
            Month::range_inclusive(nov, Month::new(2025, 1).unwrap()).len(),
            3
        );
        assert_eq!(nov.to_string(), "2024-11");
        assert_eq!(Month::parse("2024-11"), Some(nov));
        assert_eq!(Month::of(NaiveDate::from_ymd_opt(2024, 11, 30).unwrap()), nov);
    }
}
