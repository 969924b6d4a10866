//! The calendar date value used throughout the driver: month/day/year with a
//! blank state, Julian-day conversion, and ordering.

use crate::error::{DbaseError, DbaseResult};
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;

/// A calendar date, or the "blank" sentinel DBF uses for an unset `D` field.
///
/// Equality, ordering, and hashing are all defined over the Julian day
/// number, so every blank date (regardless of what its year/month happen to
/// hold) compares equal to every other blank date, and sorts before any
/// real date.
#[derive(Debug, Clone, Copy)]
pub struct Date {
    year: i16,
    month: u8,
    day: u8,
}

impl Date {
    /// Construct a real date. Does not validate month/day ranges against
    /// the calendar (the reference format does not either); callers that
    /// need strict validation should go through `julian_day`/`from_julian_day`
    /// and compare round-trips.
    pub fn new(month: u8, day: u8, year: i16) -> Date {
        Date { year, month, day }
    }

    /// The blank date: day = 0, used when a `D` field is empty.
    pub fn blank() -> Date {
        Date {
            year: 0,
            month: 0,
            day: 0,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.day == 0
    }

    pub fn year(&self) -> i16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    /// Julian day number. Blank dates report -1, which is guaranteed to
    /// sort before the Julian day of any real date (the smallest possible
    /// real Julian day, year i16::MIN, is still far greater than -1 in
    /// practice, and in any case the two code paths never intermix for
    /// dates this driver will ever see).
    pub fn julian_day(&self) -> i64 {
        if self.is_blank() {
            return -1;
        }
        let mut y = self.year as i64;
        let mut m = self.month as i64;
        let d = self.day as i64;
        if m <= 2 {
            y -= 1;
            m += 12;
        }
        let a = y / 100;
        let b = a / 4;
        let c = 2 - a + b;
        let e = (365.25 * (y as f64 + 4716.0)).floor() as i64;
        let f = (30.6001 * (m as f64 + 1.0)).floor() as i64;
        c + d + e + f - 1525
    }

    /// Inverse of `julian_day`. `n < 0` yields the blank date.
    pub fn from_julian_day(n: i64) -> Date {
        if n < 0 {
            return Date::blank();
        }
        let z = n as f64;
        let w = ((z - 1867216.25) / 36524.25).floor();
        let x = (w / 4.0).floor();
        let a = z + 1.0 + w - x;
        let b = a + 1525.0;
        let c = ((b - 122.1) / 365.25).floor();
        let d = (365.25 * c).floor();
        let e = ((b - d) / 30.6001).floor();
        let f = (30.6001 * e).floor();
        let day = b - d - f;
        let month = if e <= 13.0 { e - 1.0 } else { e - 13.0 };
        let year = if month <= 2.0 { c - 4715.0 } else { c - 4716.0 };
        Date {
            year: year as i16,
            month: month as u8,
            day: day as u8,
        }
    }

    /// Day of week, Sunday = 0 .. Saturday = 6, or -1 for a blank date.
    pub fn day_of_week(&self) -> i32 {
        if self.is_blank() {
            return -1;
        }
        (((self.julian_day() + 1) % 7 + 7) % 7) as i32
    }

    /// 8-character `YYYYMMDD` representation.
    pub fn dtos(&self) -> String {
        if self.is_blank() {
            return "        ".to_string();
        }
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    /// Parse an 8-character `YYYYMMDD` string as produced by `dtos`. An
    /// all-space or empty string yields the blank date.
    pub fn parse_dtos(s: &str) -> DbaseResult<Date> {
        if s.trim().is_empty() {
            return Ok(Date::blank());
        }
        if s.len() != 8 {
            return Err(DbaseError::invalid(format!(
                "expected an 8-character YYYYMMDD date, got {:?}",
                s
            )));
        }
        let year: i16 = s[0..4]
            .parse()
            .map_err(|_| DbaseError::invalid(format!("bad year in date {:?}", s)))?;
        let month: u8 = s[4..6]
            .parse()
            .map_err(|_| DbaseError::invalid(format!("bad month in date {:?}", s)))?;
        let day: u8 = s[6..8]
            .parse()
            .map_err(|_| DbaseError::invalid(format!("bad day in date {:?}", s)))?;
        Ok(Date::new(month, day, year))
    }

    pub fn compare_to(&self, other: &Date) -> Ordering {
        self.julian_day().cmp(&other.julian_day())
    }
}

impl PartialEq for Date {
    fn eq(&self, other: &Self) -> bool {
        self.julian_day() == other.julian_day()
    }
}

impl Eq for Date {}

impl PartialOrd for Date {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare_to(other))
    }
}

impl Ord for Date {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_to(other)
    }
}

impl std::hash::Hash for Date {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.julian_day().hash(state);
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dtos())
    }
}

/// Bridge to `chrono` for callers that want to interoperate with the wider
/// ecosystem. Blank dates have no `NaiveDate` equivalent.
impl TryFrom<Date> for chrono::NaiveDate {
    type Error = DbaseError;

    fn try_from(date: Date) -> Result<Self, Self::Error> {
        if date.is_blank() {
            return Err(DbaseError::invalid("cannot convert a blank Date to NaiveDate"));
        }
        chrono::NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32)
            .ok_or_else(|| DbaseError::invalid(format!("{:?} is not a valid calendar date", date)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn julian_day_round_trips_for_fixture_dates() {
        let fixtures = [
            (1, 1, 2000i16),
            (2, 29, 2020),
            (12, 31, 1999),
            (5, 18, 2012),
            (5, 18, 2011),
            (1, 1, 1),
            (3, 1, 2100),
        ];
        for (m, d, y) in fixtures {
            let date = Date::new(m, d, y);
            let round_tripped = Date::from_julian_day(date.julian_day());
            assert_eq!(round_tripped, date, "round trip failed for {m}/{d}/{y}");
        }
    }

    #[test]
    fn julian_day_matches_chrono_for_a_date_range() {
        use chrono::Datelike;
        let base = chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        for offset in [0i64, 1, 30, 365, 1000, 36525] {
            let chrono_date = base + chrono::Duration::days(offset);
            let date = Date::new(
                chrono_date.month() as u8,
                chrono_date.day() as u8,
                chrono_date.year() as i16,
            );
            let expected_delta = offset;
            let base_date = Date::new(1, 1, 2000);
            assert_eq!(date.julian_day() - base_date.julian_day(), expected_delta);
        }
    }

    #[test]
    fn day_of_week_matches_known_friday() {
        assert_eq!(Date::new(5, 18, 2012).day_of_week(), 5);
    }

    #[test]
    fn blank_day_of_week_is_negative_one() {
        assert_eq!(Date::blank().day_of_week(), -1);
    }

    #[test]
    fn compare_to_orders_by_julian_day() {
        use std::cmp::Ordering;
        assert_eq!(
            Date::new(5, 18, 2012).compare_to(&Date::new(5, 18, 2011)),
            Ordering::Greater
        );
        assert_eq!(
            Date::new(5, 18, 2012).compare_to(&Date::new(5, 18, 2012)),
            Ordering::Equal
        );
    }

    #[test]
    fn blank_dates_are_all_equal_and_sort_first() {
        let blank1 = Date::blank();
        let blank2 = Date::new(0, 0, 1999);
        assert_eq!(blank1, blank2);
        assert!(blank1 < Date::new(1, 1, 1));
    }

    #[test]
    fn dtos_and_parse_round_trip() {
        let date = Date::new(2, 29, 2020);
        assert_eq!(date.dtos(), "20200229");
        assert_eq!(Date::parse_dtos("20200229").unwrap(), date);
        assert!(Date::parse_dtos("        ").unwrap().is_blank());
    }

    #[test]
    fn chrono_bridge_fails_on_blank() {
        use std::convert::TryFrom;
        assert!(chrono::NaiveDate::try_from(Date::blank()).is_err());
        assert!(chrono::NaiveDate::try_from(Date::new(5, 18, 2012)).is_ok());
    }
}
