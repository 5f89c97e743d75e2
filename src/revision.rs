//! Revision snapshot model and persisted commit payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::PatchSet;
use crate::store::StoreError;

/// The full materialized state of a notebook at one commit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Revision {
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Revision {
    pub fn new(title: impl Into<String>, description: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// The blob stored in the content store for one commit
///
/// `title` and `description` are overwritten wholesale on every commit, so a
/// patch payload carries them as plain values; only `body` is diffed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitPayload {
    Snapshot {
        revision: Revision,
    },
    Patch {
        title: String,
        description: String,
        patch: PatchSet,
        created_at: DateTime<Utc>,
    },
}

impl CommitPayload {
    pub fn snapshot(revision: Revision) -> Self {
        CommitPayload::Snapshot { revision }
    }

    pub fn patch(revision: &Revision, patch: PatchSet) -> Self {
        CommitPayload::Patch {
            title: revision.title.clone(),
            description: revision.description.clone(),
            patch,
            created_at: revision.created_at,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_diff;

    #[test]
    fn test_snapshot_payload_round_trip() {
        let payload = CommitPayload::snapshot(Revision::new("T", "D", "hello"));
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(CommitPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_patch_payload_carries_whole_metadata() {
        let next = Revision::new("New title", "New description", "hello world");
        let payload = CommitPayload::patch(&next, compute_diff("hello", "hello world"));
        let bytes = payload.to_bytes().unwrap();
        match CommitPayload::from_bytes(&bytes).unwrap() {
            CommitPayload::Patch { title, description, patch, .. } => {
                assert_eq!(title, "New title");
                assert_eq!(description, "New description");
                assert_eq!(patch.base_len, 5);
                assert_eq!(patch.target_len, 11);
            }
            other => panic!("expected patch payload, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_kind_is_tagged() {
        let payload = CommitPayload::snapshot(Revision::new("T", "", ""));
        let json = String::from_utf8(payload.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"kind\":\"snapshot\""));
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        assert!(matches!(
            CommitPayload::from_bytes(b"not json"),
            Err(StoreError::Serialization(_))
        ));
    }
}
