//! Blob store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("blob not found: {digest}")]
    NotFound { digest: String },

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = BlobStoreError::NotFound {
            digest: "sha256:abc".to_string(),
        };
        assert_eq!(err.to_string(), "blob not found: sha256:abc");
    }
}
