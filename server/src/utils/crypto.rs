//! Hashing helpers for the content-addressed blob store

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Exact shape of a blob digest string: `sha256:` + 64 lowercase hex chars
static DIGEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^sha256:[0-9a-f]{64}$").expect("digest regex"));

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Digest string for `data` in the `sha256:<hex>` wire format
pub fn digest_string(data: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(data))
}

/// Validate a digest string before it is allowed anywhere near the filesystem
pub fn is_valid_digest(s: &str) -> bool {
    DIGEST_RE.is_match(s)
}
