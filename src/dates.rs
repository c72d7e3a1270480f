//! Day-granularity date handling.
//!
//! `event_date`, `action_date` and `completed_at` are compared and stored as
//! canonical `YYYY-MM-DD` strings. Callers may hand us a bare date, a
//! space-separated date-time (`YYYY-MM-DD HH:mm[:ss]`) or an ISO-8601
//! timestamp. Timestamps keep the calendar day as written in their own
//! offset: `2024-03-05T23:30:00-05:00` is the 5th, not the 6th.
//!
//! Stored `*_at` timestamps are instants, not days. Their calendar day is
//! read in the local zone (see [`day_in`]) so it lines up with the
//! local days users enter.
//!
//! The canonical form is zero-padded and fixed-width, so plain string
//! comparison orders days correctly.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use thiserror::Error;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized date '{0}' (expected YYYY-MM-DD, YYYY-MM-DD HH:mm[:ss] or ISO-8601)")]
pub struct InvalidDate(pub String);

/// Normalize any accepted date shape to `YYYY-MM-DD`. Idempotent.
pub fn normalize_day(input: &str) -> Result<String, InvalidDate> {
    parse_day(input).map(|d| d.format(DAY_FORMAT).to_string())
}

/// Parse any accepted date shape to a calendar day.
pub fn parse_day(input: &str) -> Result<NaiveDate, InvalidDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidDate(input.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.date());
        }
    }
    NaiveDate::parse_from_str(trimmed, DAY_FORMAT).map_err(|_| InvalidDate(input.to_string()))
}

/// Normalize an optional input, treating blank strings as absent.
pub fn normalize_optional_day(input: Option<&str>) -> Result<Option<String>, InvalidDate> {
    match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => normalize_day(value).map(Some),
        None => Ok(None),
    }
}

/// Calendar day of a stored timestamp as seen in `tz`. RFC 3339 instants
/// are converted into `tz`; naive forms are already wall-clock and kept.
pub fn day_in<Tz: TimeZone>(timestamp: &str, tz: &Tz) -> Result<String, InvalidDate> {
    match DateTime::parse_from_rfc3339(timestamp.trim()) {
        Ok(dt) => Ok(dt.with_timezone(tz).date_naive().format(DAY_FORMAT).to_string()),
        Err(_) => normalize_day(timestamp),
    }
}

/// Today's date in the local time zone, canonical form.
pub fn today_local() -> String {
    Local::now().date_naive().format(DAY_FORMAT).to_string()
}

/// The later of two canonical days.
pub fn max_day<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a >= b {
        a
    } else {
        b
    }
}

/// Whether an open record's action date has passed. Completed records and
/// records without an action date are never overdue.
pub fn is_overdue(action_date: Option<&str>, completed_at: Option<&str>, today: &str) -> bool {
    match (action_date, completed_at) {
        (Some(action), None) => action < today,
        _ => false,
    }
}
