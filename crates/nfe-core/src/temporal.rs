//! # Temporal Types — UTC Timestamps and Local Emission Time
//!
//! Lifecycle records store `Timestamp`, a UTC instant truncated to seconds.
//! The document itself carries local emission time with an explicit offset
//! (`dhEmi`, e.g. `2024-03-15T10:30:00-03:00`), produced by
//! [`Timestamp::to_local_rfc3339`].

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NfeError;

/// A UTC timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with any offset, normalizing to UTC.
    pub fn parse(s: &str) -> Result<Self, NfeError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| NfeError::Temporal(format!("invalid RFC 3339 timestamp {s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch milliseconds.
    pub fn epoch_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Local wall-clock time at `offset`, formatted as
    /// `YYYY-MM-DDTHH:MM:SS±HH:MM`.
    pub fn to_local_rfc3339(&self, offset: FixedOffset) -> String {
        self.0
            .with_timezone(&offset)
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string()
    }

    /// Calendar date at `offset`.
    pub fn local_date(&self, offset: FixedOffset) -> NaiveDate {
        self.0.with_timezone(&offset).date_naive()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Parse an offset such as `-03:00` or `+05:30`.
pub fn parse_offset(s: &str) -> Result<FixedOffset, NfeError> {
    let bad = || NfeError::Temporal(format!("invalid UTC offset {s:?}"));
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(bad()),
    };
    let (h, m) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = h.parse().map_err(|_| bad())?;
    let minutes: i32 = m.parse().map_err(|_| bad())?;
    if hours > 14 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_is_truncated() {
        let ts = Timestamp::now();
        assert_eq!(ts.as_datetime().nanosecond(), 0);
    }

    #[test]
    fn iso8601_has_z_suffix() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 15, 13, 30, 0).unwrap();
        assert_eq!(Timestamp::from_utc(dt).to_iso8601(), "2024-03-15T13:30:00Z");
    }

    #[test]
    fn local_rfc3339_applies_offset() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 15, 13, 30, 0).unwrap();
        let off = parse_offset("-03:00").unwrap();
        assert_eq!(
            Timestamp::from_utc(dt).to_local_rfc3339(off),
            "2024-03-15T10:30:00-03:00"
        );
    }

    #[test]
    fn local_date_crosses_midnight() {
        let dt = Utc.with_ymd_and_hms(2024, 4, 1, 1, 0, 0).unwrap();
        let off = parse_offset("-03:00").unwrap();
        assert_eq!(
            Timestamp::from_utc(dt).local_date(off),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
        );
    }

    #[test]
    fn parse_normalizes_offset() {
        let ts = Timestamp::parse("2024-03-15T10:30:00-03:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2024-03-15T13:30:00Z");
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn offset_parser_rejects_garbage() {
        assert!(parse_offset("03:00").is_err());
        assert!(parse_offset("-3").is_err());
        assert!(parse_offset("+15:00").is_err());
        assert_eq!(parse_offset("+05:30").unwrap().local_minus_utc(), 19_800);
    }
}
