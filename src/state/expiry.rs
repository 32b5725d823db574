//! Staleness rules that decide when a task may run
//!
//! A task is expired once strictly more than the expiration window has passed
//! since its last update. Pending tasks (`New`, `Running`) never wait; the
//! task store applies the same rule when claiming.

use chrono::{DateTime, Duration, Utc};

/// Returns true if `updated_at` is older than `window` at instant `now`
pub fn is_expired(updated_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - updated_at > window
}

/// The cut-off timestamp: anything updated strictly before it is expired
pub fn expiry_threshold(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now - window
}
