//! Recovery backoff formula (§4.10): `next = now + min(1800, 30 * 2^min(10, retry-1))`
//! seconds, bounded exponential capped at 30 minutes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

pub fn next_retry_at(retry_count: i32, now: DateTime<Utc>) -> DateTime<Utc> {
    let exponent = (retry_count - 1).clamp(0, 10);
    let seconds = 1800i64.min(30i64 * 2i64.pow(exponent as u32));
    now + ChronoDuration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps_at_thirty_minutes() {
        let now = Utc::now();
        assert_eq!((next_retry_at(1, now) - now).num_seconds(), 30);
        assert_eq!((next_retry_at(2, now) - now).num_seconds(), 60);
        assert_eq!((next_retry_at(6, now) - now).num_seconds(), 960);
        // retry_count 12 -> exponent clamps at 10 -> 30 * 1024 = 30720, capped at 1800.
        assert_eq!((next_retry_at(12, now) - now).num_seconds(), 1800);
    }

    #[test]
    fn retry_count_zero_or_negative_does_not_panic() {
        let now = Utc::now();
        assert_eq!((next_retry_at(0, now) - now).num_seconds(), 30);
        assert_eq!((next_retry_at(-5, now) - now).num_seconds(), 30);
    }
}
