use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ShadeError;

/// Lifecycle of a transaction.
///
/// `open -> validated -> committed`, with `failed` and `aborted` as the other
/// terminal states. Staging after validation drops back to `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Open,
    Validated,
    Committed,
    Aborted,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Open => "open",
            TransactionStatus::Validated => "validated",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Operations can still be staged and the transaction applied
    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionStatus::Open | TransactionStatus::Validated)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Write,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Write => "write",
            OpKind::Delete => "delete",
        }
    }
}

/// One staged file operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOperation {
    pub op: OpKind,
    /// Path relative to the live directory
    pub path: String,
    /// Required for writes, absent for deletes
    #[serde(default)]
    pub content: Option<String>,
}

impl TransactionOperation {
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            op: OpKind::Write,
            path: path.into(),
            content: Some(content.into()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Delete,
            path: path.into(),
            content: None,
        }
    }
}

/// What an apply touched, kept for compensation and audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackMetadata {
    /// Live paths whose pre-image was copied into the backup directory
    #[serde(default)]
    pub backup_files: Vec<String>,
    /// Live paths that did not exist before the apply
    #[serde(default)]
    pub created_files: Vec<String>,
    /// Every path touched, in operation order, first touch only
    #[serde(default)]
    pub touched_paths: Vec<String>,
}

impl RollbackMetadata {
    pub fn has_touched(&self, path: &str) -> bool {
        self.touched_paths.iter().any(|p| p == path)
    }
}

/// Persisted transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionState {
    pub transaction_id: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub operations: Vec<TransactionOperation>,
    #[serde(default)]
    pub rollback_metadata: RollbackMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionState {
    pub fn new(transaction_id: impl Into<String>, context: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: transaction_id.into(),
            context,
            status: TransactionStatus::Open,
            operations: Vec::new(),
            rollback_metadata: RollbackMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append an operation. Re-opens a validated transaction since the
    /// operation set changed.
    pub fn stage(&mut self, operation: TransactionOperation) -> Result<(), ShadeError> {
        if !self.status.is_pending() {
            return Err(ShadeError::Transaction(format!(
                "Cannot stage operations for transaction in state {}",
                self.status
            )));
        }
        self.operations.push(operation);
        self.status = TransactionStatus::Open;
        self.touch();
        Ok(())
    }

    /// Record a validation outcome
    pub fn mark_validated(&mut self, valid: bool) {
        self.status = if valid {
            TransactionStatus::Validated
        } else {
            TransactionStatus::Failed
        };
        self.touch();
    }

    pub fn mark_committed(&mut self, metadata: RollbackMetadata) {
        self.status = TransactionStatus::Committed;
        self.rollback_metadata = metadata;
        self.touch();
    }

    pub fn mark_failed(&mut self, metadata: RollbackMetadata) {
        self.status = TransactionStatus::Failed;
        self.rollback_metadata = metadata;
        self.touch();
    }

    /// Cancel without touching live files. Committed transactions are final.
    pub fn abort(&mut self) -> Result<(), ShadeError> {
        if self.status == TransactionStatus::Committed {
            return Err(ShadeError::Transaction(
                "Committed transactions cannot be aborted".to_string(),
            ));
        }
        self.status = TransactionStatus::Aborted;
        self.touch();
        Ok(())
    }

    /// Structural checks that need no filesystem access
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.operations.is_empty() {
            errors.push("Transaction has no staged operations".to_string());
        }
        for operation in &self.operations {
            if operation.op == OpKind::Write && operation.content.is_none() {
                errors.push(format!("Write operation missing content for {}", operation.path));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCommitResult {
    pub success: bool,
    pub transaction: TransactionState,
    pub commit_hash: Option<String>,
    pub rollback_metadata: RollbackMetadata,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAbortResult {
    pub success: bool,
    pub transaction: TransactionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_reopens_validated() {
        let mut tx = TransactionState::new("t1", Map::new());
        tx.stage(TransactionOperation::write("a.yaml", "x")).unwrap();
        tx.mark_validated(true);
        assert_eq!(tx.status, TransactionStatus::Validated);

        tx.stage(TransactionOperation::delete("b.yaml")).unwrap();
        assert_eq!(tx.status, TransactionStatus::Open);
        assert_eq!(tx.operations.len(), 2);
    }

    #[test]
    fn test_stage_rejected_in_terminal_states() {
        for status in [
            TransactionStatus::Committed,
            TransactionStatus::Aborted,
            TransactionStatus::Failed,
        ] {
            let mut tx = TransactionState::new("t1", Map::new());
            tx.status = status;
            let result = tx.stage(TransactionOperation::delete("a.yaml"));
            assert!(matches!(result, Err(ShadeError::Transaction(_))), "{}", status);
        }
    }

    #[test]
    fn test_abort_rules() {
        let mut tx = TransactionState::new("t1", Map::new());
        tx.mark_failed(RollbackMetadata::default());
        tx.abort().unwrap();
        assert_eq!(tx.status, TransactionStatus::Aborted);

        let mut committed = TransactionState::new("t2", Map::new());
        committed.mark_committed(RollbackMetadata::default());
        assert!(committed.abort().is_err());
        assert_eq!(committed.status, TransactionStatus::Committed);
    }

    #[test]
    fn test_structural_errors() {
        let mut tx = TransactionState::new("t1", Map::new());
        assert_eq!(tx.structural_errors(), vec!["Transaction has no staged operations"]);

        tx.operations.push(TransactionOperation {
            op: OpKind::Write,
            path: "a.yaml".into(),
            content: None,
        });
        let errors = tx.structural_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("a.yaml"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let tx = TransactionState::new("t1", Map::new());
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["status"], "open");
        assert_eq!(json["rollback_metadata"]["touched_paths"], serde_json::json!([]));

        let op = serde_json::to_value(TransactionOperation::delete("x")).unwrap();
        assert_eq!(op["op"], "delete");
    }
}
