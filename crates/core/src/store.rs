//! Asset store seam and key scheme.
//!
//! The runner reads source SVG blobs and writes result artifacts
//! through this trait. The S3 implementation lives in
//! `nestrun-storage`; tests use the in-memory one.

use async_trait::async_trait;

/// Byte-blob storage addressed by string keys.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fetch the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `bytes` under `key` with the given content type.
    ///
    /// Returns a backend-specific location reference for the stored
    /// object (e.g. `s3://bucket/key`).
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError>;
}

/// Key of a source SVG blob: `{owner_id}/{part_id}.svg`.
pub fn part_key(owner_id: &str, part_id: &str) -> String {
    format!("{owner_id}/{part_id}.svg")
}

/// Key of a result artifact: `result/{job_uuid}/result.svg`.
pub fn result_key(job_uuid: &str) -> String {
    format!("result/{job_uuid}/result.svg")
}

/// Errors from the asset store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No blob exists under the requested key.
    #[error("asset {key} not found")]
    NotFound { key: String },

    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_key_scheme() {
        assert_eq!(part_key("user-7", "p-1"), "user-7/p-1.svg");
    }

    #[test]
    fn result_key_scheme() {
        assert_eq!(
            result_key("c0ffee00-0000-4000-8000-000000000000"),
            "result/c0ffee00-0000-4000-8000-000000000000/result.svg"
        );
    }
}
