//! Core library for shade
//!
//! Everything here works on plain directories; nothing in this crate talks to
//! the commit store. The git side lives in `libshade-git`.

pub mod config;
pub mod error;
pub mod files;
pub mod filter;
pub mod sync;
pub mod transaction;
pub mod types;

pub use config::{load_config, save_config, ShadeConfig, DEFAULT_SHADOW_DIR};
pub use error::ShadeError;
pub use files::{FileEntry, SandboxedFiles};
pub use filter::{normalize_rel_path, should_include_path};
pub use sync::{copy_tree, sync_live_to_shadow, sync_shadow_to_config, SyncStats, EXPORT_DIR, TRANSACTIONS_DIR, VCS_DIR};
pub use transaction::{apply_operations, compensate, validate_operations, TransactionStore};
pub use types::history::{
    CheckpointResult, CleanupResult, CommitInfo, PendingChanges, PendingChangesSummary,
    RestoreFilesResult, RollbackResult, NOT_ENABLED_MESSAGE,
};
pub use types::transaction::{
    OpKind, RollbackMetadata, TransactionAbortResult, TransactionCommitResult,
    TransactionOperation, TransactionState, TransactionStatus, TransactionValidationResult,
};
