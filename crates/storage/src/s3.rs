//! S3-backed asset store.
//!
//! Credentials come from the standard AWS provider chain (environment,
//! shared config, instance metadata); only the bucket and region are
//! supplied by the runner's own configuration.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use nestrun_core::store::{AssetStore, StoreError};

/// Asset store over one S3 bucket.
pub struct S3AssetStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3AssetStore {
    /// Load AWS configuration from the default provider chain and
    /// build a store for `bucket` in `region`.
    pub async fn connect(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;

        tracing::info!(bucket = %bucket, "Connected S3 asset store");

        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
        }
    }

    /// Bucket this store reads from and writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    StoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Backend(service.to_string())
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.into_service_error().to_string()))?;

        let location = format!("s3://{}/{}", self.bucket, key);
        tracing::info!(key = %key, size, location = %location, "Uploaded object to S3");
        Ok(location)
    }
}
