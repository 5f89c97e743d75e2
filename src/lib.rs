// Labnote - Versioned Notebook Engine

pub mod chain;
pub mod diff;
pub mod notebook;
pub mod revision;
pub mod store;

pub use chain::{Commit, CommitChain, CommitId, CommitKind, DocumentId};
pub use diff::{apply_diff, compute_diff, DiffError, Op, PatchSet};
pub use notebook::{EngineConfig, EngineError, NotebookEngine, PrincipalId};
pub use revision::{CommitPayload, Revision};
pub use store::{Cid, ContentStore, LocalStore, MemoryStore, StoreConfig, StoreError};
