use std::time::Duration;

use chrono::{DateTime, Utc};

/// Processed outbox rows older than this are eligible for purging.
pub fn purge_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| now.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
