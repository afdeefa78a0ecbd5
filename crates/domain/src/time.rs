//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for tick times, record times, timer deadlines, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whole milliseconds elapsed from `earlier` to `later` (negative if reversed).
#[must_use]
pub fn millis_between(earlier: Timestamp, later: Timestamp) -> i64 {
    (later - earlier).num_milliseconds()
}

/// `ts` shifted forward by `millis` milliseconds.
#[must_use]
pub fn add_millis(ts: Timestamp, millis: u64) -> Timestamp {
    i64::try_from(millis)
        .ok()
        .and_then(chrono::Duration::try_milliseconds)
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
