//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp `minutes` before `reference`
pub fn minutes_before(reference: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    reference - Duration::minutes(minutes)
}
