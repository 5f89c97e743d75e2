//! Content-addressed blob storage
//!
//! Every revision snapshot and patch payload is persisted as an immutable
//! blob keyed by the SHA-256 of its bytes. Blobs never change once written,
//! so concurrent reads of the same [`Cid`] are always race-free.

pub mod local;
pub mod memory;

use std::fmt;
use std::path::PathBuf;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use local::LocalStore;
pub use memory::MemoryStore;

pub const CID_SIZE: usize = 32;

/// Error types for content store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob not found: {0}")]
    NotFound(Cid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Content identifier: the SHA-256 of the stored bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; CID_SIZE]);

impl Cid {
    /// Compute the identifier the store will assign to `bytes`.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut id = [0u8; CID_SIZE];
        id.copy_from_slice(&digest);
        Cid(id)
    }

    pub fn as_bytes(&self) -> &[u8; CID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, StoreError> {
        let raw = hex::decode(s)
            .map_err(|e| StoreError::Serialization(format!("Invalid CID hex: {}", e)))?;
        if raw.len() != CID_SIZE {
            return Err(StoreError::Serialization(format!(
                "Invalid CID length: {}",
                raw.len()
            )));
        }
        let mut id = [0u8; CID_SIZE];
        id.copy_from_slice(&raw);
        Ok(Cid(id))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.to_hex())
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Trait for content-addressed blob stores
///
/// `put` of identical bytes always returns the identical [`Cid`]; the hash
/// is the address. Transient transport failures surface as
/// [`StoreError::Unavailable`] and are safe to retry.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob and return its content identifier
    async fn put(&self, bytes: Vec<u8>) -> Result<Cid, StoreError>;

    /// Retrieve a blob by its identifier
    async fn get(&self, cid: &Cid) -> Result<Vec<u8>, StoreError>;

    /// Check whether a blob exists
    async fn exists(&self, cid: &Cid) -> Result<bool, StoreError>;
}

/// Configuration for the file-backed store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base directory for blob files
    pub base_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./labnote_data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_is_deterministic() {
        let a = Cid::for_bytes(b"notebook body");
        let b = Cid::for_bytes(b"notebook body");
        assert_eq!(a, b);
        assert_ne!(a, Cid::for_bytes(b"other body"));
    }

    #[test]
    fn test_cid_hex_round_trip() {
        let cid = Cid::for_bytes(b"payload");
        let parsed = Cid::from_hex(&cid.to_hex()).unwrap();
        assert_eq!(parsed, cid);
        assert_eq!(cid.to_hex().len(), CID_SIZE * 2);
    }

    #[test]
    fn test_cid_serde_as_hex_string() {
        let cid = Cid::for_bytes(b"payload");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{}\"", cid.to_hex()));
        let back: Cid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }

    #[test]
    fn test_cid_rejects_bad_hex() {
        assert!(Cid::from_hex("zz").is_err());
        assert!(Cid::from_hex("abcd").is_err());
    }
}
