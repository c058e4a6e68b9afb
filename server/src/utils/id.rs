//! Message identifier minting
//!
//! Identifiers are ULIDs: 26 Crockford base-32 characters, the first 10
//! encoding the wall-clock millisecond MSB-first, the remaining 16 carrying
//! 80 bits of thread-safe randomness. Lexicographic order agrees with
//! generation time on a non-retrograde clock, which is what makes `id > since`
//! replay queries and DESC history ordering work.

use ulid::Ulid;

/// Length of every minted identifier
pub const ID_LEN: usize = 26;

/// Mint a fresh sortable identifier
pub fn mint() -> String {
    Ulid::new().to_string()
}

/// Decode the millisecond timestamp encoded in an identifier's prefix
///
/// Returns `None` if the string is not a valid identifier.
pub fn timestamp_ms(id: &str) -> Option<u64> {
    Ulid::from_string(id).ok().map(|u| u.timestamp_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CROCKFORD: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

    #[test]
    fn test_mint_shape() {
        let id = mint();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| CROCKFORD.contains(c)));
    }

    #[test]
    fn test_mint_unique() {
        let a = mint();
        let b = mint();
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let before = chrono::Utc::now().timestamp_millis() as u64;
        let id = mint();
        let after = chrono::Utc::now().timestamp_millis() as u64;

        let ms = timestamp_ms(&id).unwrap();
        assert!(ms >= before && ms <= after, "{} not in [{}, {}]", ms, before, after);
    }

    #[test]
    fn test_lexicographic_order_tracks_time() {
        let mut ids = Vec::new();
        for _ in 0..50 {
            ids.push(mint());
        }
        let mut sorted = ids.clone();
        sorted.sort();
        // Ids minted in sequence on one clock sort in mint order. Within a
        // single millisecond order is probabilistic, so compare timestamps.
        for pair in sorted.windows(2) {
            assert!(timestamp_ms(&pair[0]).unwrap() <= timestamp_ms(&pair[1]).unwrap());
        }
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(timestamp_ms("not-an-id").is_none());
        assert!(timestamp_ms("").is_none());
    }
}
