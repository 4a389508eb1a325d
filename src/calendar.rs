//! Hour-index arithmetic against a store's epoch attribute.
//!
//! Every store carries an epoch wall-clock string such as
//! `2016-01-01 00:00:00`. A datetime maps to the integer number of
//! whole hours since that epoch; fractional minutes are truncated
//! toward the enclosing hour. All datetimes are naive wall-clock
//! values in the same implicit zone as the epoch, so conversions are
//! identical on every host regardless of its timezone configuration.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::Result;
use crate::errinput;

/// Wall-clock format of the epoch attribute and all datetime inputs.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Hours in a non-leap calendar year.
pub const HOURS_PER_YEAR: u32 = 8760;

/// Hours in a leap calendar year.
pub const HOURS_PER_LEAP_YEAR: u32 = 8784;

/// Converts datetimes to hour indices and back, relative to one epoch.
#[derive(Debug, Clone)]
pub struct Calendar {
    epoch: NaiveDateTime,
    epoch_str: String,
}

impl Calendar {
    /// Parse the epoch attribute string.
    pub fn new(epoch: &str) -> Result<Self> {
        let parsed = NaiveDateTime::parse_from_str(epoch, DATETIME_FORMAT)
            .map_err(|e| crate::error::Error::InvalidInput(format!("bad epoch '{epoch}': {e}")))?;
        Ok(Self {
            epoch: parsed,
            epoch_str: epoch.to_string(),
        })
    }

    /// The epoch attribute string as stored.
    pub fn epoch_str(&self) -> &str {
        &self.epoch_str
    }

    /// Convert a `YYYY-MM-DD HH:MM:SS` string to an hour index.
    ///
    /// The seconds difference from the epoch is divided by 3600 and
    /// truncated toward zero; indices strictly less than zero are
    /// rejected.
    pub fn to_index(&self, datetime: &str) -> Result<u64> {
        let parsed = NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT).map_err(|e| {
            crate::error::Error::InvalidInput(format!("bad datetime '{datetime}': {e}"))
        })?;
        self.index_of(parsed)
    }

    /// Convert an hour index back to its datetime string.
    pub fn from_index(&self, index: u64) -> String {
        let at = self.epoch + Duration::hours(index as i64);
        at.format(DATETIME_FORMAT).to_string()
    }

    /// Hour index for a CSV `(YYYYMMDD, HHMM)` pair.
    pub fn index_for(&self, date: u32, time: u16) -> Result<u64> {
        self.index_of(csv_datetime(date, time)?)
    }

    /// Hour index of `YYYY-01-01 00:00:00`.
    pub fn year_start_index(&self, year: i32) -> Result<u64> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| crate::error::Error::InvalidInput(format!("bad year {year}")))?;
        self.index_of(start)
    }

    fn index_of(&self, at: NaiveDateTime) -> Result<u64> {
        let seconds = (at - self.epoch).num_seconds();
        let index = (seconds as f64 / 3600.0) as i64;
        if index < 0 {
            return errinput!(
                "datetime {} is before the epoch {}",
                at.format(DATETIME_FORMAT),
                self.epoch_str
            );
        }
        Ok(index as u64)
    }
}

/// Seconds between the Postgres timestamp epoch (2000-01-01) and the
/// Unix epoch.
const POSTGRES_EPOCH_IN_UNIX: i64 = 946_684_800;

/// Offset applied when converting upstream UTC timestamps into the
/// store's local wall-clock frame. The upstream feed is JST.
pub const UPSTREAM_UTC_OFFSET_SECONDS: i64 = 9 * 3600;

/// Convert a Postgres binary timestamp (big-endian microseconds since
/// 2000-01-01) into local wall-clock seconds since the Unix epoch.
pub fn pg_timestamp_to_local_seconds(bytes: &[u8]) -> Result<i64> {
    if bytes.len() < 8 {
        return errinput!("postgres timestamp needs 8 bytes, got {}", bytes.len());
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    let microseconds = i64::from_be_bytes(raw);

    let utc_seconds = microseconds / 1_000_000 + POSTGRES_EPOCH_IN_UNIX;
    Ok(utc_seconds - UPSTREAM_UTC_OFFSET_SECONDS)
}

/// True when `year` is a leap year.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Hours in the given calendar year (8784 for leap years, 8760 otherwise).
pub fn hours_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        HOURS_PER_LEAP_YEAR
    } else {
        HOURS_PER_YEAR
    }
}

/// Year and year-relative row (`(day_of_year - 1) * 24 + hour`) of a CSV
/// `(YYYYMMDD, HHMM)` pair. Minutes are truncated to the enclosing hour.
pub fn year_row(date: u32, time: u16) -> Result<(i32, u32)> {
    let at = csv_datetime(date, time)?;
    let row = (at.ordinal() - 1) * 24 + at.hour();
    Ok((at.year(), row))
}

fn csv_datetime(date: u32, time: u16) -> Result<NaiveDateTime> {
    let year = (date / 10_000) as i32;
    let month = (date / 100) % 100;
    let day = date % 100;
    let hour = (time / 100) as u32;
    let minute = (time % 100) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(|| {
            crate::error::Error::InvalidInput(format!("bad date/time {date:08}/{time:04}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> Calendar {
        Calendar::new("2016-01-01 00:00:00").expect("Failed to parse epoch")
    }

    #[test]
    fn test_to_index() {
        let cal = calendar();
        assert_eq!(cal.to_index("2016-01-01 00:00:00").unwrap(), 0);
        assert_eq!(cal.to_index("2016-01-01 01:00:00").unwrap(), 1);
        assert_eq!(cal.to_index("2016-01-02 00:00:00").unwrap(), 24);
        // 2016 is a leap year
        assert_eq!(cal.to_index("2017-01-01 00:00:00").unwrap(), 8784);
    }

    #[test]
    fn test_fractional_hours_truncate() {
        let cal = calendar();
        assert_eq!(cal.to_index("2016-01-01 00:30:00").unwrap(), 0);
        assert_eq!(cal.to_index("2016-01-01 01:59:59").unwrap(), 1);
    }

    #[test]
    fn test_before_epoch_rejected() {
        let cal = calendar();
        assert!(cal.to_index("2015-12-31 23:00:00").is_err());
    }

    #[test]
    fn test_bad_format_rejected() {
        let cal = calendar();
        assert!(cal.to_index("2016/01/01 00:00").is_err());
        assert!(cal.to_index("not a datetime").is_err());
    }

    #[test]
    fn test_from_index_roundtrip() {
        let cal = calendar();
        for index in [0, 1, 24, 8783, 8784, 100_000] {
            let datetime = cal.from_index(index);
            assert_eq!(cal.to_index(&datetime).unwrap(), index);
        }
    }

    #[test]
    fn test_index_for_csv_pair() {
        let cal = calendar();
        assert_eq!(cal.index_for(20160101, 0100).unwrap(), 1);
        assert_eq!(cal.index_for(20160102, 0000).unwrap(), 24);
        assert!(cal.index_for(20160132, 0000).is_err());
        assert!(cal.index_for(20160101, 2500).is_err());
    }

    #[test]
    fn test_year_helpers() {
        assert!(is_leap_year(2016));
        assert!(!is_leap_year(2017));
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert_eq!(hours_in_year(2016), 8784);
        assert_eq!(hours_in_year(2017), 8760);
    }

    #[test]
    fn test_year_start_index() {
        let cal = calendar();
        assert_eq!(cal.year_start_index(2016).unwrap(), 0);
        assert_eq!(cal.year_start_index(2017).unwrap(), 8784);
        assert_eq!(cal.year_start_index(2018).unwrap(), 8784 + 8760);
    }

    #[test]
    fn test_pg_timestamp_conversion() {
        // 2016-01-01 00:00:00 UTC in Postgres microseconds.
        let seconds_since_pg_epoch = 16 * 365 * 86_400 + 4 * 86_400; // four leap days
        let micros = (seconds_since_pg_epoch as i64) * 1_000_000;
        let bytes = micros.to_be_bytes();

        let local = pg_timestamp_to_local_seconds(&bytes).unwrap();
        assert_eq!(local, 1_451_606_400 - UPSTREAM_UTC_OFFSET_SECONDS);

        assert!(pg_timestamp_to_local_seconds(&bytes[..4]).is_err());
    }

    #[test]
    fn test_year_row() {
        assert_eq!(year_row(20160101, 0000).unwrap(), (2016, 0));
        assert_eq!(year_row(20160101, 2300).unwrap(), (2016, 23));
        assert_eq!(year_row(20160201, 0000).unwrap(), (2016, 31 * 24));
        // minutes truncate to the enclosing hour
        assert_eq!(year_row(20160101, 0145).unwrap(), (2016, 1));
        // last hour of a leap year
        assert_eq!(year_row(20161231, 2300).unwrap(), (2016, 8783));
    }
}
