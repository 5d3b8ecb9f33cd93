//! Timestamp utilities and local-time conversion
//!
//! Uploaded sheets carry naive local datetimes; everything downstream of
//! canonicalization works in UTC. The conversion pair here is the single
//! place local time enters or leaves the system.

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Truncate a timestamp to whole microseconds
///
/// Stored timestamps are RFC 3339 text with microsecond precision, so
/// anything finer would not survive a round trip.
pub fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    let micros = dt.nanosecond() / 1_000;
    dt.with_nanosecond(micros * 1_000).unwrap_or(dt)
}

/// Convert a naive local datetime to UTC
///
/// An ambiguous local time (DST fold) resolves to the earliest instant with
/// a warning. Returns None for a nonexistent local time (spring-forward gap);
/// the caller decides how to report it.
pub fn naive_local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, latest) => {
            tracing::warn!(
                "Ambiguous local time {}: resolving to earliest of {} / {}",
                naive,
                earliest,
                latest
            );
            Some(earliest.with_timezone(&Utc))
        }
        LocalResult::None => None,
    }
}

/// Convert a UTC timestamp back to naive local time
pub fn utc_to_naive_local(utc: DateTime<Utc>) -> NaiveDateTime {
    utc.with_timezone(&Local).naive_local()
}

/// Format a UTC timestamp as ISO-8601 with microsecond precision and "Z"
pub fn format_utc_micros(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}
