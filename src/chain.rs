//! Append-only commit chains with compare-and-swap head advance
//!
//! The head pointer of each document is the only mutable shared state in
//! the engine. [`CommitChain::append_commit`] is the single place it moves:
//! an append names the head it expects, and loses with
//! [`ChainError::StaleParent`] if another writer got there first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::Cid;

pub type DocumentId = Uuid;
pub type CommitId = Uuid;

/// Error types for chain operations
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Stale parent for document {document}: expected head {expected:?}, found {actual:?}")]
    StaleParent {
        document: DocumentId,
        expected: Option<CommitId>,
        actual: Option<CommitId>,
    },

    #[error("Unknown document: {0}")]
    UnknownDocument(DocumentId),

    #[error("Unknown commit: {0}")]
    UnknownCommit(CommitId),
}

/// Whether a commit's stored blob is a full revision or a diff against its parent
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Snapshot,
    Patch,
}

/// One node in a document's history
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub id: CommitId,
    pub document: DocumentId,
    pub parent: Option<CommitId>,
    pub content_ref: Cid,
    pub kind: CommitKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct ChainState {
    commits: HashMap<CommitId, Commit>,
    heads: HashMap<DocumentId, CommitId>,
}

/// Commit storage and head pointers for all documents
#[derive(Default)]
pub struct CommitChain {
    state: RwLock<ChainState>,
}

impl CommitChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commit, atomically advancing the document's head.
    ///
    /// `expected_parent` is the head the caller observed; `None` creates a
    /// root commit and requires that the document has no head yet. Exactly
    /// one of two concurrent appends against the same head succeeds.
    pub async fn append_commit(
        &self,
        document: DocumentId,
        expected_parent: Option<CommitId>,
        content_ref: Cid,
        kind: CommitKind,
    ) -> Result<CommitId, ChainError> {
        let mut state = self.state.write().await;

        let actual = state.heads.get(&document).copied();
        if actual != expected_parent {
            return Err(ChainError::StaleParent {
                document,
                expected: expected_parent,
                actual,
            });
        }

        let id = Uuid::new_v4();
        let commit = Commit {
            id,
            document,
            parent: expected_parent,
            content_ref,
            kind,
            timestamp: Utc::now(),
        };

        state.commits.insert(id, commit);
        state.heads.insert(document, id);

        log::debug!(
            "Appended {:?} commit {} to document {} (parent {:?})",
            kind,
            id,
            document,
            expected_parent
        );

        Ok(id)
    }

    /// Current head of a document, if it has one
    pub async fn head(&self, document: DocumentId) -> Option<CommitId> {
        self.state.read().await.heads.get(&document).copied()
    }

    /// Look up a single commit
    pub async fn get(&self, id: CommitId) -> Result<Commit, ChainError> {
        self.state
            .read()
            .await
            .commits
            .get(&id)
            .cloned()
            .ok_or(ChainError::UnknownCommit(id))
    }

    /// Full history of a document, newest first.
    ///
    /// Re-walks parent links from the current head on every call; commit ids
    /// are fresh UUIDs and parents are fixed at append time, so the walk is
    /// finite and terminates at the root.
    pub async fn history(&self, document: DocumentId) -> Result<Vec<Commit>, ChainError> {
        let state = self.state.read().await;
        let head = *state
            .heads
            .get(&document)
            .ok_or(ChainError::UnknownDocument(document))?;

        let mut out = Vec::new();
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            let commit = state
                .commits
                .get(&id)
                .ok_or(ChainError::UnknownCommit(id))?;
            cursor = commit.parent;
            out.push(commit.clone());
        }
        Ok(out)
    }
}
