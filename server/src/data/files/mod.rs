//! Content-addressed blob store
//!
//! Blobs live as flat files named by their digest string
//! (`sha256:<64 hex chars>`). The store is write-once: storing bytes that
//! already exist under their digest is a successful no-op, and nothing is
//! ever deleted.

pub mod error;

use std::path::{Path, PathBuf};

use tokio::fs;

pub use error::BlobStoreError;

use crate::utils::crypto::{digest_string, is_valid_digest};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open (creating if needed) the blob directory
    pub async fn init(root: PathBuf) -> Result<Self, BlobStoreError> {
        fs::create_dir_all(&root).await?;
        tracing::debug!(path = %root.display(), "BlobStore initialized");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store bytes under their own digest. Returns `(digest, size)`.
    pub async fn store(&self, data: &[u8]) -> Result<(String, usize), BlobStoreError> {
        let digest = digest_string(data);
        let path = self.blob_path(&digest)?;

        // Content-addressed: identical digest means identical bytes
        if fs::try_exists(&path).await? {
            tracing::trace!(digest, "blob already exists, skipping write");
            return Ok((digest, data.len()));
        }

        fs::write(&path, data).await?;
        tracing::debug!(digest, size = data.len(), "blob stored");
        Ok((digest, data.len()))
    }

    /// Read a blob by digest string
    pub async fn read(&self, digest: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.blob_path(digest)?;

        // Read directly; map ENOENT to NotFound instead of a separate
        // exists() check, which would be a TOCTOU race.
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobStoreError::NotFound {
                    digest: digest.to_string(),
                }
            } else {
                BlobStoreError::Io(e)
            }
        })
    }

    /// Resolve the on-disk path for a digest
    ///
    /// The digest must match the exact wire pattern before any filesystem
    /// access, and the joined path must remain inside the blob root.
    fn blob_path(&self, digest: &str) -> Result<PathBuf, BlobStoreError> {
        if !is_valid_digest(digest) {
            return Err(BlobStoreError::InvalidDigest(digest.to_string()));
        }

        let path = self.root.join(digest);
        if !path.starts_with(&self.root) {
            return Err(BlobStoreError::InvalidDigest(digest.to_string()));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::init(dir.path().join("blobs")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_store_and_read_round_trip() {
        let (_dir, store) = store().await;

        let (digest, size) = store.store(b"hello blobs").await.unwrap();
        assert!(digest.starts_with("sha256:"));
        assert_eq!(size, 11);

        let data = store.read(&digest).await.unwrap();
        assert_eq!(data, b"hello blobs");
    }

    #[tokio::test]
    async fn test_store_twice_same_digest_no_error() {
        let (_dir, store) = store().await;

        let (first, _) = store.store(b"same bytes").await.unwrap();
        let (second, _) = store.store(b"same bytes").await.unwrap();
        assert_eq!(first, second);

        assert_eq!(store.read(&first).await.unwrap(), b"same bytes");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = store().await;
        let digest = format!("sha256:{}", "a".repeat(64));

        let err = store.read(&digest).await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_digest_rejected_before_filesystem() {
        let (_dir, store) = store().await;

        for bad in [
            "sha256:../../etc/passwd",
            "sha256:short",
            "not-a-digest",
            "",
        ] {
            let err = store.read(bad).await.unwrap_err();
            assert!(matches!(err, BlobStoreError::InvalidDigest(_)), "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_stored_file_named_by_digest() {
        let (_dir, store) = store().await;
        let (digest, _) = store.store(b"xyz").await.unwrap();

        let on_disk = store.root().join(&digest);
        assert!(on_disk.exists());
    }
}
