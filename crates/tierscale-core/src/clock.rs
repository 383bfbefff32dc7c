//! Wall-clock helpers.
//!
//! Enqueue timestamps cross process boundaries, so they are plain Unix
//! milliseconds rather than `Instant`s.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current Unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whole milliseconds in `d`, saturating.
pub fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_millis_is_monotone_enough() {
        let a = epoch_millis();
        let b = epoch_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }

    #[test]
    fn as_millis_truncates() {
        assert_eq!(as_millis(Duration::from_micros(1_999)), 1);
    }
}
