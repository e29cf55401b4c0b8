//! Atomic multi-file edits on the live directory
//!
//! `begin` -> `stage_*` -> `validate` -> `commit` | `abort`. Every step loads
//! the record from disk and saves it back, so a crash between steps leaves a
//! record that can be inspected or aborted later.

use libshade_core::{
    apply_operations, compensate, validate_operations, SandboxedFiles, ShadeError,
    TransactionAbortResult, TransactionCommitResult, TransactionOperation, TransactionState,
    TransactionStore, TransactionValidationResult, TRANSACTIONS_DIR,
};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::manager::ShadowManager;

impl ShadowManager {
    fn transaction_store(&mut self) -> Result<TransactionStore, ShadeError> {
        let repo = self.repo_or_not_initialized()?;
        Ok(TransactionStore::new(repo.shadow_root().join(TRANSACTIONS_DIR)))
    }

    fn sandbox(&self) -> Result<SandboxedFiles, ShadeError> {
        SandboxedFiles::new(&self.config.live_root)
    }

    /// Open a new transaction with optional caller context
    pub fn begin_transaction(
        &mut self,
        context: Option<Map<String, Value>>,
    ) -> Result<TransactionState, ShadeError> {
        self.transaction_store()?.begin(context)
    }

    /// Stage a whole-file write. The path must resolve inside the live directory.
    pub fn stage_file_write(
        &mut self,
        transaction_id: &str,
        path: &str,
        content: &str,
    ) -> Result<TransactionState, ShadeError> {
        self.stage(transaction_id, TransactionOperation::write(path, content))
    }

    /// Stage a delete. The path must resolve inside the live directory.
    pub fn stage_file_delete(
        &mut self,
        transaction_id: &str,
        path: &str,
    ) -> Result<TransactionState, ShadeError> {
        self.stage(transaction_id, TransactionOperation::delete(path))
    }

    fn stage(
        &mut self,
        transaction_id: &str,
        operation: TransactionOperation,
    ) -> Result<TransactionState, ShadeError> {
        let store = self.transaction_store()?;
        self.sandbox()?.resolve(&operation.path)?;

        let mut transaction = store.load(transaction_id)?;
        transaction.stage(operation)?;
        store.save(&transaction)?;
        Ok(transaction)
    }

    /// Check the staged operations and record the outcome
    pub fn validate_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<TransactionValidationResult, ShadeError> {
        let store = self.transaction_store()?;
        let files = self.sandbox()?;

        let mut transaction = store.load(transaction_id)?;
        ensure_pending(&transaction, "validate")?;

        let result = validate_operations(&transaction, &files);
        transaction.mark_validated(result.valid);
        store.save(&transaction)?;
        Ok(result)
    }

    /// Apply the staged operations to the live directory and commit them.
    ///
    /// An invalid transaction is marked failed and reported with
    /// `success: false`; live files are untouched. If applying fails part
    /// way, every touched file is put back before the error is returned.
    pub fn commit_transaction(
        &mut self,
        transaction_id: &str,
        message: Option<&str>,
    ) -> Result<TransactionCommitResult, ShadeError> {
        let store = self.transaction_store()?;
        let files = self.sandbox()?;

        let mut transaction = store.load(transaction_id)?;
        ensure_pending(&transaction, "commit")?;

        let validation = validate_operations(&transaction, &files);
        if !validation.valid {
            transaction.mark_validated(false);
            store.save(&transaction)?;
            let error = validation.errors.join("; ");
            warn!("Transaction {} is invalid: {}", transaction_id, error);
            return Ok(TransactionCommitResult {
                success: false,
                rollback_metadata: transaction.rollback_metadata.clone(),
                transaction,
                commit_hash: None,
                error: Some(error),
            });
        }

        let backup_dir = store.backup_dir(transaction_id);
        let metadata = match apply_operations(&transaction.operations, &files, &backup_dir) {
            Ok(metadata) => metadata,
            Err((e, metadata)) => {
                error!("Transaction {} failed, compensating: {}", transaction_id, e);
                compensate(&files, &backup_dir, &metadata);
                transaction.mark_failed(metadata);
                store.save(&transaction)?;
                return Err(match e {
                    ShadeError::PathSecurity(_) => e,
                    other => ShadeError::Transaction(format!(
                        "Transaction {} failed: {}",
                        transaction_id, other
                    )),
                });
            }
        };

        let message = match message {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => format!("Transaction apply: {}", transaction_id),
        };
        let commit_hash = self.commit_changes(Some(&message), false, true);

        transaction.mark_committed(metadata);
        store.save(&transaction)?;
        info!(
            "Committed transaction {} ({} operation(s))",
            transaction_id,
            transaction.operations.len()
        );

        Ok(TransactionCommitResult {
            success: true,
            rollback_metadata: transaction.rollback_metadata.clone(),
            transaction,
            commit_hash,
            error: None,
        })
    }

    /// Cancel a transaction without touching live files
    pub fn abort_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<TransactionAbortResult, ShadeError> {
        let store = self.transaction_store()?;
        let mut transaction = store.load(transaction_id)?;
        transaction.abort()?;
        store.save(&transaction)?;
        info!("Aborted transaction {}", transaction_id);
        Ok(TransactionAbortResult {
            success: true,
            transaction,
        })
    }

    pub fn get_transaction(&mut self, transaction_id: &str) -> Result<TransactionState, ShadeError> {
        self.transaction_store()?.load(transaction_id)
    }

    /// Every known transaction, most recently updated first
    pub fn list_transactions(&mut self) -> Result<Vec<TransactionState>, ShadeError> {
        self.transaction_store()?.list()
    }
}

fn ensure_pending(transaction: &TransactionState, action: &str) -> Result<(), ShadeError> {
    if transaction.status.is_pending() {
        return Ok(());
    }
    Err(ShadeError::Transaction(format!(
        "Cannot {} transaction in state {}",
        action, transaction.status
    )))
}
