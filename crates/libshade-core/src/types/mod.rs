pub mod history;
pub mod transaction;

pub use history::{
    CheckpointResult, CleanupResult, CommitInfo, PendingChanges, PendingChangesSummary,
    RestoreFilesResult, RollbackResult,
};
pub use transaction::{
    OpKind, RollbackMetadata, TransactionAbortResult, TransactionCommitResult,
    TransactionOperation, TransactionState, TransactionStatus, TransactionValidationResult,
};
