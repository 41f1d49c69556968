//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as microseconds since the Unix epoch.
///
/// All entry timestamps (`first_seen_at`, `last_seen_at`, `last_reset_at`)
/// use this resolution. Returns 0 if the system clock reads before the epoch.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_micros_is_positive_and_non_decreasing() {
        let a = now_micros();
        let b = now_micros();
        assert!(a > 0);
        assert!(b >= a);
    }
}
