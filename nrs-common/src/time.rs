//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Storage format for response timestamps (UTC, no offset)
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current UTC time formatted for a TIMESTAMP column
pub fn db_timestamp() -> String {
    now().format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Display format for article publish dates ("March 04, 2025")
pub const DISPLAY_DATE_FORMAT: &str = "%B %d, %Y";

/// Synthetic "recent" publish date: today minus 0..=`max_days_ago` days
pub fn recent_display_date<R: Rng + ?Sized>(rng: &mut R, max_days_ago: i64) -> String {
    let days_ago = rng.gen_range(0..=max_days_ago.max(0));
    (now() - Duration::days(days_ago))
        .format(DISPLAY_DATE_FORMAT)
        .to_string()
}
