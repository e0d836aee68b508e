//! In-memory asset store used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use nestrun_core::store::{AssetStore, StoreError};
use tokio::sync::RwLock;

/// Asset store backed by a process-local map.
#[derive(Default)]
pub struct MemoryAssetStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob without going through the trait.
    pub async fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.into(), bytes.into());
    }

    /// All keys currently stored, unordered.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StoreError> {
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }
}
