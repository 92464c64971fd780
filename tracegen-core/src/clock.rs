//! Wall-clock helpers shared by the context store and the engine.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
