//! Per-rule cooldown gate.

use chrono::{DateTime, Duration, Utc};

/// A triggered rule may dispatch if it never has, or if at least
/// `cooldown` has passed since the last dispatch.
pub fn cooldown_elapsed(
    last_dispatch: Option<DateTime<Utc>>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> bool {
    match last_dispatch {
        None => true,
        Some(last) => now - last >= cooldown,
    }
}
