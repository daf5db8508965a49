//! Timestamps embedded in generated file names.

use chrono::{DateTime, TimeZone};

/// Second-granularity stamp, e.g. `20261016_153045`.
///
/// Used for result files the client keeps.
pub fn file_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Microsecond-granularity stamp, e.g. `20261016_153045_123456`.
///
/// Used for the server's intermediate files, which only live for one exchange.
pub fn precise_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S_%6f").to_string()
}
