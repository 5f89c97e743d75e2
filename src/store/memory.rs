//! In-memory content store
//!
//! Stands in for the remote blob service during tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Cid, ContentStore, StoreError};

/// A content store backed by a process-local map
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<Cid, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Drop a blob, simulating store-side data loss. Test hook.
    pub async fn remove(&self, cid: &Cid) -> bool {
        self.blobs.write().await.remove(cid).is_some()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<Cid, StoreError> {
        let cid = Cid::for_bytes(&bytes);
        self.blobs.write().await.entry(cid).or_insert(bytes);
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .await
            .get(cid)
            .cloned()
            .ok_or(StoreError::NotFound(*cid))
    }

    async fn exists(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(self.blobs.read().await.contains_key(cid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryStore::new();
        let cid = store.put(b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get(&cid).await.unwrap(), b"hello");
        assert!(store.exists(&cid).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_is_idempotent_per_content() {
        let store = MemoryStore::new();
        let a = store.put(b"same bytes".to_vec()).await.unwrap();
        let b = store.put(b"same bytes".to_vec()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = MemoryStore::new();
        let cid = Cid::for_bytes(b"never stored");
        assert!(matches!(
            store.get(&cid).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(!store.exists(&cid).await.unwrap());
    }
}
