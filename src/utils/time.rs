/// Timestamp helpers for grant rows.
///
/// Grant timestamps (`date_requested`, `date_approved`) are stored as
/// RFC 3339 UTC strings so they sort lexically and read the same in SQLite.
use chrono::{DateTime, Utc};

/// Generate current UTC timestamp in RFC 3339 format.
///
/// # Format
/// RFC 3339: "2025-12-17T02:30:00Z"
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp and convert to UTC.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn parse_to_utc(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
