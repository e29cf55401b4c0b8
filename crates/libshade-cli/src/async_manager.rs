//! Async front end for [`ShadowManager`]
//!
//! Every call is moved onto tokio's blocking pool and takes the manager's
//! mutex there, so sync walks, commits and truncation never stall the runtime
//! and never overlap for one shadow repository.

use std::sync::{Arc, Mutex};

use libshade_core::{
    CheckpointResult, CleanupResult, CommitInfo, PendingChanges, RestoreFilesResult,
    RollbackResult, ShadeConfig, ShadeError, TransactionAbortResult, TransactionCommitResult,
    TransactionState, TransactionValidationResult,
};
use serde_json::{Map, Value};
use tracing::error;

use crate::manager::ShadowManager;

/// Cloneable handle; clones share one manager
#[derive(Clone)]
pub struct AsyncShadowManager {
    inner: Arc<Mutex<ShadowManager>>,
}

impl AsyncShadowManager {
    pub fn new(config: ShadeConfig) -> Self {
        Self::from_manager(ShadowManager::new(config))
    }

    pub fn from_manager(manager: ShadowManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Run `f` against the manager on the blocking pool
    async fn run<T, F>(&self, f: F) -> Result<T, ShadeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ShadowManager) -> T + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut manager = inner
                .lock()
                .map_err(|_| ShadeError::Internal("shadow manager lock poisoned".to_string()))?;
            Ok(f(&mut manager))
        })
        .await
        .map_err(|e| ShadeError::Internal(format!("blocking task failed: {}", e)))?
    }

    /// Like [`run`](Self::run) for availability-first calls: worker failures
    /// are logged and replaced by `fallback`
    async fn run_or<T, F>(&self, fallback: T, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut ShadowManager) -> T + Send + 'static,
    {
        match self.run(f).await {
            Ok(value) => value,
            Err(e) => {
                error!("{}", e);
                fallback
            }
        }
    }

    pub async fn init(&self) -> bool {
        self.run_or(false, |m| m.init()).await
    }

    pub async fn try_init(&self) -> Result<(), ShadeError> {
        self.run(|m| m.try_init()).await?
    }

    pub async fn is_initialized(&self) -> bool {
        self.run_or(false, |m| m.is_initialized()).await
    }

    pub async fn is_processing_request(&self) -> bool {
        self.run_or(false, |m| m.is_processing_request()).await
    }

    pub async fn commit_changes(
        &self,
        message: Option<String>,
        skip_if_processing: bool,
        force: bool,
    ) -> Option<String> {
        self.run_or(None, move |m| {
            m.commit_changes(message.as_deref(), skip_if_processing, force)
        })
        .await
    }

    pub async fn create_checkpoint(&self, description: String) -> CheckpointResult {
        self.run_or(CheckpointResult::not_enabled(), move |m| {
            m.create_checkpoint(&description)
        })
        .await
    }

    pub async fn end_request_processing(&self) {
        self.run_or((), |m| m.end_request_processing()).await
    }

    pub async fn commit_count(&self) -> usize {
        self.run_or(0, |m| m.commit_count()).await
    }

    pub async fn get_history(&self, limit: usize) -> Vec<CommitInfo> {
        self.run_or(Vec::new(), move |m| m.get_history(limit)).await
    }

    pub async fn get_pending_changes(&self) -> PendingChanges {
        self.run_or(PendingChanges::default(), |m| m.get_pending_changes())
            .await
    }

    pub async fn get_diff(&self, from: Option<String>, to: Option<String>) -> String {
        self.run_or(String::new(), move |m| m.get_diff(from.as_deref(), to.as_deref()))
            .await
    }

    pub async fn rollback(&self, commit: String) -> Result<RollbackResult, ShadeError> {
        self.run(move |m| m.rollback(&commit)).await?
    }

    pub async fn restore_files_from_commit(
        &self,
        commit: Option<String>,
        patterns: Vec<String>,
    ) -> Result<RestoreFilesResult, ShadeError> {
        self.run(move |m| m.restore_files_from_commit(commit.as_deref(), &patterns))
            .await?
    }

    pub async fn cleanup_commits(&self) -> CleanupResult {
        self.run_or(CleanupResult::not_enabled(), |m| m.cleanup_commits())
            .await
    }

    pub async fn begin_transaction(
        &self,
        context: Option<Map<String, Value>>,
    ) -> Result<TransactionState, ShadeError> {
        self.run(move |m| m.begin_transaction(context)).await?
    }

    pub async fn stage_file_write(
        &self,
        transaction_id: String,
        path: String,
        content: String,
    ) -> Result<TransactionState, ShadeError> {
        self.run(move |m| m.stage_file_write(&transaction_id, &path, &content))
            .await?
    }

    pub async fn stage_file_delete(
        &self,
        transaction_id: String,
        path: String,
    ) -> Result<TransactionState, ShadeError> {
        self.run(move |m| m.stage_file_delete(&transaction_id, &path))
            .await?
    }

    pub async fn validate_transaction(
        &self,
        transaction_id: String,
    ) -> Result<TransactionValidationResult, ShadeError> {
        self.run(move |m| m.validate_transaction(&transaction_id))
            .await?
    }

    pub async fn commit_transaction(
        &self,
        transaction_id: String,
        message: Option<String>,
    ) -> Result<TransactionCommitResult, ShadeError> {
        self.run(move |m| m.commit_transaction(&transaction_id, message.as_deref()))
            .await?
    }

    pub async fn abort_transaction(
        &self,
        transaction_id: String,
    ) -> Result<TransactionAbortResult, ShadeError> {
        self.run(move |m| m.abort_transaction(&transaction_id))
            .await?
    }

    pub async fn get_transaction(&self, transaction_id: String) -> Result<TransactionState, ShadeError> {
        self.run(move |m| m.get_transaction(&transaction_id)).await?
    }

    pub async fn list_transactions(&self) -> Result<Vec<TransactionState>, ShadeError> {
        self.run(|m| m.list_transactions()).await?
    }
}
