//! Cross-platform wall clock.
//!
//! Grants record the moment they were minted. `std::time::SystemTime::now`
//! panics on `wasm32-unknown-unknown`, so the browser build reads the clock
//! through `web_time` instead.

use chrono::{DateTime, Utc};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current system time.
#[cfg(not(target_arch = "wasm32"))]
pub fn now() -> SystemTime {
    SystemTime::now()
}

/// Returns the current system time.
#[cfg(target_arch = "wasm32")]
pub fn now() -> SystemTime {
    use web_time::web::SystemTimeExt;
    web_time::SystemTime::now().to_std()
}

/// Returns the current time as a UTC timestamp, suitable for stamping
/// records that are serialized as RFC 3339 strings.
pub fn timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::from(now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_returns_reasonable_timestamp() {
        let seconds = now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        // 2020-01-01T00:00:00Z
        assert!(seconds > 1_577_836_800);
    }

    #[test]
    fn it_agrees_with_system_time() {
        let before = DateTime::<Utc>::from(now());
        let stamp = timestamp();
        assert!(stamp >= before);
    }
}
