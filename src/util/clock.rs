//! Wall-clock helpers shared by the audit trail and job retention.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Milliseconds elapsed since `since_ms`, saturating at zero for timestamps in the future.
#[must_use]
pub fn elapsed_ms(since_ms: u128) -> u128 {
    now_ms().saturating_sub(since_ms)
}
