//! Date/time utilities for Hangar.
//!
//! Timestamps are stored as UTC text in a fixed-width layout so that string
//! comparison in SQL matches chronological order.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage layout for every timestamp column.
pub const DB_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a UTC instant for storage.
pub fn to_db(dt: &DateTime<Utc>) -> String {
    dt.format(DB_FORMAT).to_string()
}

/// Current time in storage layout.
pub fn now_db() -> String {
    to_db(&Utc::now())
}

/// Parse a stored timestamp.
///
/// Accepts the storage layout, the plain SQLite `datetime()` layout without
/// fractional seconds, and RFC3339.
pub fn parse_db(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a stored timestamp to RFC3339 for API consumers.
///
/// Returns the input unchanged when it cannot be parsed.
pub fn to_rfc3339(s: &str) -> String {
    match parse_db(s) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => s.to_string(),
    }
}
