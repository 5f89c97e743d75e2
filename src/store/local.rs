//! Local file system content store
//!
//! Blobs are laid out under the base directory sharded by the first hex
//! byte of the content identifier, `<base>/<hh>/<full-hex>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs as tokio_fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{Cid, ContentStore, StoreConfig, StoreError};

/// A content store that uses the local file system
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    /// Create a new local store, creating the base directory if needed
    pub async fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let base_dir = config.base_dir;
        if !base_dir.exists() {
            tokio_fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Get the path for a specific content identifier
    fn blob_path(&self, cid: &Cid) -> PathBuf {
        let hex_id = cid.to_hex();
        self.base_dir.join(&hex_id[..2]).join(hex_id)
    }

    async fn ensure_dir(&self, path: &Path) -> Result<(), StoreError> {
        let parent = path.parent().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Invalid blob path",
            ))
        })?;
        if !parent.exists() {
            tokio_fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<Cid, StoreError> {
        let cid = Cid::for_bytes(&bytes);
        let path = self.blob_path(&cid);

        // Content-addressed: an existing file already holds these bytes.
        if path.exists() {
            return Ok(cid);
        }

        self.ensure_dir(&path).await?;

        let mut file = tokio_fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(cid);

        if !path.exists() {
            return Err(StoreError::NotFound(*cid));
        }

        let mut file = tokio_fs::File::open(&path).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;

        Ok(data)
    }

    async fn exists(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(self.blob_path(cid).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(StoreConfig {
            base_dir: dir.path().to_path_buf(),
        })
        .await
        .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, store) = temp_store().await;
        let cid = store.put(b"persisted revision".to_vec()).await.unwrap();
        assert_eq!(store.get(&cid).await.unwrap(), b"persisted revision");
    }

    #[tokio::test]
    async fn test_sharded_layout() {
        let (dir, store) = temp_store().await;
        let cid = store.put(b"x".to_vec()).await.unwrap();
        let hex_id = cid.to_hex();
        let expected = dir.path().join(&hex_id[..2]).join(&hex_id);
        assert!(expected.is_file());
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (_dir, store) = temp_store().await;
        let cid = Cid::for_bytes(b"missing");
        assert!(matches!(
            store.get(&cid).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_same_content_twice() {
        let (_dir, store) = temp_store().await;
        let a = store.put(b"dup".to_vec()).await.unwrap();
        let b = store.put(b"dup".to_vec()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.get(&a).await.unwrap(), b"dup");
    }
}
