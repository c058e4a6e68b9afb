//! Wall-clock helpers

/// Current time as fractional seconds since the Unix epoch
///
/// This is the timestamp format used by message `ts`, task timestamps, and
/// presence `last_seen`.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_secs_is_recent() {
        let now = now_secs();
        // Well after 2020, well before 2100
        assert!(now > 1_577_836_800.0);
        assert!(now < 4_102_444_800.0);
    }

    #[test]
    fn test_now_secs_monotone_enough() {
        let a = now_secs();
        let b = now_secs();
        assert!(b >= a);
    }
}
