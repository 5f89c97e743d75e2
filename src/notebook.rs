//! Notebook registry and the caller-facing versioning operations
//!
//! A notebook is a chain of commits over content-addressed blobs. The
//! engine materializes any historical revision purely from those blobs,
//! appends edits as patches against the previous head, and forks a
//! notebook into an independently owned copy-on-fork document.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::chain::{ChainError, Commit, CommitChain, CommitId, CommitKind, DocumentId};
use crate::diff::{apply_diff, compute_diff, DiffError};
use crate::revision::{CommitPayload, Revision};
use crate::store::{Cid, ContentStore, StoreError};

pub type PrincipalId = Uuid;

/// Error types for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Patch and base text disagree; rejected before any store write
    #[error("Malformed patch: {0}")]
    MalformedPatch(String),

    /// Another writer advanced the head first; retry against the new head
    #[error("Stale parent for document {document}")]
    StaleParent { document: DocumentId },

    /// The acting principal does not own the notebook
    #[error("Principal {actor} does not own document {document}")]
    NotOwner {
        document: DocumentId,
        actor: PrincipalId,
    },

    /// An ancestor blob is missing or unreadable; fatal for this read
    #[error("Broken chain at commit {commit}: blob {cid} unreadable")]
    BrokenChain { commit: CommitId, cid: Cid },

    /// The chain root was reached without finding a snapshot commit
    #[error("No snapshot ancestor reachable from commit {0}")]
    NoSnapshotAncestor(CommitId),

    #[error("Notebook not found: {0}")]
    NotFound(DocumentId),

    #[error("Unknown commit: {0}")]
    UnknownCommit(CommitId),

    /// Transient content store failure; safe to retry with backoff
    #[error("Content store error: {0}")]
    Store(StoreError),
}

impl From<ChainError> for EngineError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::StaleParent { document, .. } => EngineError::StaleParent { document },
            ChainError::UnknownDocument(id) => EngineError::NotFound(id),
            ChainError::UnknownCommit(id) => EngineError::UnknownCommit(id),
        }
    }
}

impl From<DiffError> for EngineError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::MalformedPatch(msg) => EngineError::MalformedPatch(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

/// Configuration for the notebook engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Emit a full snapshot commit once a run of this many consecutive
    /// patch commits would form, bounding materialization cost. 0 disables
    /// automatic snapshots.
    pub snapshot_interval: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 32,
        }
    }
}

/// Registry entry for one notebook
#[derive(Clone, Debug)]
pub struct NotebookRecord {
    pub id: DocumentId,
    pub owner: PrincipalId,
    pub created_at: DateTime<Utc>,
}

/// The versioning engine: registry, commit chains, and blob storage
pub struct NotebookEngine {
    store: Arc<dyn ContentStore>,
    chain: CommitChain,
    records: RwLock<HashMap<DocumentId, NotebookRecord>>,
    config: EngineConfig,
}

impl NotebookEngine {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn ContentStore>, config: EngineConfig) -> Self {
        Self {
            store,
            chain: CommitChain::new(),
            records: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The underlying commit chain, for read-side callers
    pub fn chain(&self) -> &CommitChain {
        &self.chain
    }

    /// Create a notebook with a root snapshot commit
    pub async fn create_notebook(
        &self,
        owner: PrincipalId,
        revision: Revision,
    ) -> Result<DocumentId, EngineError> {
        let document = Uuid::new_v4();

        let payload = CommitPayload::snapshot(revision);
        let cid = self.store.put(payload.to_bytes()?).await?;
        self.chain
            .append_commit(document, None, cid, CommitKind::Snapshot)
            .await?;

        let record = NotebookRecord {
            id: document,
            owner,
            created_at: Utc::now(),
        };
        self.records.write().await.insert(document, record);

        log::info!("Created notebook {} owned by {}", document, owner);
        Ok(document)
    }

    /// Commit an edit against the current head
    pub async fn commit_edit(
        &self,
        document: DocumentId,
        actor: PrincipalId,
        revision: Revision,
    ) -> Result<CommitId, EngineError> {
        let base = self.head(document).await?;
        self.commit_edit_from(document, actor, base, revision).await
    }

    /// Commit an edit against the head the caller based its changes on.
    ///
    /// If the head has moved past `base`, fails with
    /// [`EngineError::StaleParent`]; the caller re-materializes the new head
    /// and retries, or surfaces the conflict.
    pub async fn commit_edit_from(
        &self,
        document: DocumentId,
        actor: PrincipalId,
        base: CommitId,
        revision: Revision,
    ) -> Result<CommitId, EngineError> {
        self.check_owner(document, actor).await?;

        let base_revision = self.materialize(document, base).await?;
        let patch = compute_diff(&base_revision.body, &revision.body);

        // Validate the round trip before anything is written.
        let replayed = apply_diff(&base_revision.body, &patch)?;
        if replayed != revision.body {
            return Err(EngineError::MalformedPatch(
                "patch does not reproduce the edited body".to_string(),
            ));
        }

        let kind = if self.snapshot_due(base).await? {
            CommitKind::Snapshot
        } else {
            CommitKind::Patch
        };
        let payload = match kind {
            CommitKind::Snapshot => CommitPayload::snapshot(revision),
            CommitKind::Patch => CommitPayload::patch(&revision, patch),
        };

        // A failed put must never be followed by a chain append.
        let cid = self.store.put(payload.to_bytes()?).await?;
        let commit = self
            .chain
            .append_commit(document, Some(base), cid, kind)
            .await?;

        log::debug!(
            "Committed {:?} edit {} to notebook {} by {}",
            kind,
            commit,
            document,
            actor
        );
        Ok(commit)
    }

    /// Commit a forced full snapshot, resetting the patch-chain distance
    pub async fn commit_snapshot(
        &self,
        document: DocumentId,
        actor: PrincipalId,
        revision: Revision,
    ) -> Result<CommitId, EngineError> {
        self.check_owner(document, actor).await?;

        let base = self.head(document).await?;
        let payload = CommitPayload::snapshot(revision);
        let cid = self.store.put(payload.to_bytes()?).await?;
        let commit = self
            .chain
            .append_commit(document, Some(base), cid, CommitKind::Snapshot)
            .await?;

        log::debug!(
            "Committed snapshot {} to notebook {} by {}",
            commit,
            document,
            actor
        );
        Ok(commit)
    }

    /// Fork a notebook into an independently owned copy.
    ///
    /// The source's head revision is materialized and stored as the root
    /// snapshot of a brand-new document. The fork shares no chain state with
    /// the source; later edits on either side are invisible to the other.
    pub async fn fork(
        &self,
        source: DocumentId,
        new_owner: PrincipalId,
    ) -> Result<DocumentId, EngineError> {
        let head = self.head(source).await?;
        let revision = self.materialize(source, head).await?;

        let document = Uuid::new_v4();
        let payload = CommitPayload::snapshot(revision);
        let cid = self.store.put(payload.to_bytes()?).await?;
        self.chain
            .append_commit(document, None, cid, CommitKind::Snapshot)
            .await?;

        let record = NotebookRecord {
            id: document,
            owner: new_owner,
            created_at: Utc::now(),
        };
        self.records.write().await.insert(document, record);

        log::info!(
            "Forked notebook {} at commit {} into {} owned by {}",
            source,
            head,
            document,
            new_owner
        );
        Ok(document)
    }

    /// Reconstruct the full revision at a commit.
    ///
    /// Walks parent links back to the nearest snapshot, then replays the
    /// collected patches oldest-first. Pure over immutable blobs: repeated
    /// calls yield identical revisions.
    pub async fn materialize(
        &self,
        document: DocumentId,
        commit: CommitId,
    ) -> Result<Revision, EngineError> {
        if !self.records.read().await.contains_key(&document) {
            return Err(EngineError::NotFound(document));
        }
        let target = self.chain.get(commit).await?;
        if target.document != document {
            return Err(EngineError::UnknownCommit(commit));
        }
        self.reconstruct(target).await
    }

    /// History of a notebook, newest first
    pub async fn history(&self, document: DocumentId) -> Result<Vec<Commit>, EngineError> {
        if !self.records.read().await.contains_key(&document) {
            return Err(EngineError::NotFound(document));
        }
        Ok(self.chain.history(document).await?)
    }

    /// Current head commit of a notebook
    pub async fn head(&self, document: DocumentId) -> Result<CommitId, EngineError> {
        if !self.records.read().await.contains_key(&document) {
            return Err(EngineError::NotFound(document));
        }
        self.chain
            .head(document)
            .await
            .ok_or(EngineError::NotFound(document))
    }

    /// Owning principal of a notebook
    pub async fn owner(&self, document: DocumentId) -> Result<PrincipalId, EngineError> {
        self.records
            .read()
            .await
            .get(&document)
            .map(|r| r.owner)
            .ok_or(EngineError::NotFound(document))
    }

    async fn check_owner(
        &self,
        document: DocumentId,
        actor: PrincipalId,
    ) -> Result<(), EngineError> {
        let owner = self.owner(document).await?;
        if owner != actor {
            return Err(EngineError::NotOwner { document, actor });
        }
        Ok(())
    }

    /// True when appending one more patch after `base` would reach the
    /// configured snapshot interval.
    async fn snapshot_due(&self, base: CommitId) -> Result<bool, EngineError> {
        if self.config.snapshot_interval == 0 {
            return Ok(false);
        }

        let mut run = 0usize;
        let mut cursor = Some(base);
        while let Some(id) = cursor {
            let commit = self.chain.get(id).await?;
            if commit.kind == CommitKind::Snapshot {
                break;
            }
            run += 1;
            cursor = commit.parent;
        }
        Ok(run + 1 >= self.config.snapshot_interval)
    }

    async fn load_payload(&self, commit: &Commit) -> Result<CommitPayload, EngineError> {
        let bytes = match self.store.get(&commit.content_ref).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(cid)) => {
                log::warn!("Commit {} references missing blob {}", commit.id, cid);
                return Err(EngineError::BrokenChain {
                    commit: commit.id,
                    cid,
                });
            }
            Err(other) => return Err(other.into()),
        };
        let payload = CommitPayload::from_bytes(&bytes).map_err(|e| {
            log::warn!("Commit {} payload unreadable: {}", commit.id, e);
            EngineError::BrokenChain {
                commit: commit.id,
                cid: commit.content_ref,
            }
        })?;

        let kind_matches = matches!(
            (&payload, commit.kind),
            (CommitPayload::Snapshot { .. }, CommitKind::Snapshot)
                | (CommitPayload::Patch { .. }, CommitKind::Patch)
        );
        if !kind_matches {
            log::warn!(
                "Commit {} payload kind disagrees with commit metadata",
                commit.id
            );
            return Err(EngineError::BrokenChain {
                commit: commit.id,
                cid: commit.content_ref,
            });
        }
        Ok(payload)
    }

    async fn reconstruct(&self, target: Commit) -> Result<Revision, EngineError> {
        let target_id = target.id;

        // Walk back to the nearest snapshot, collecting the patch payloads
        // in between (newest first).
        let mut patches: Vec<(CommitId, Cid, CommitPayload)> = Vec::new();
        let mut cursor = target;
        let snapshot = loop {
            let payload = self.load_payload(&cursor).await?;
            match payload {
                CommitPayload::Snapshot { revision } => break revision,
                CommitPayload::Patch { .. } => {
                    let parent = match cursor.parent {
                        Some(parent) => parent,
                        None => return Err(EngineError::NoSnapshotAncestor(target_id)),
                    };
                    patches.push((cursor.id, cursor.content_ref, payload));
                    cursor = self.chain.get(parent).await?;
                }
            }
        };

        // Replay oldest-first on the snapshot body; the target commit's
        // payload supplies the non-diffed metadata fields wholesale.
        let mut body = snapshot.body;
        let mut title = snapshot.title;
        let mut description = snapshot.description;
        let mut created_at = snapshot.created_at;

        for (commit_id, cid, payload) in patches.into_iter().rev() {
            if let CommitPayload::Patch {
                title: t,
                description: d,
                patch,
                created_at: ts,
            } = payload
            {
                body = apply_diff(&body, &patch).map_err(|e| {
                    log::warn!("Stored patch at commit {} does not apply: {}", commit_id, e);
                    EngineError::BrokenChain {
                        commit: commit_id,
                        cid,
                    }
                })?;
                title = t;
                description = d;
                created_at = ts;
            }
        }

        Ok(Revision {
            title,
            description,
            body,
            created_at,
        })
    }
}
