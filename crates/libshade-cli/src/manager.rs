//! The shadow manager: one owner for one shadow repository
//!
//! Read-style operations (history, pending changes, diff, auto-commit,
//! checkpoint, cleanup) never fail outright; they log and hand back a neutral
//! result. Rollback, restore and transaction commit change live files and
//! return typed errors instead.

use chrono::Utc;
use libshade_core::{
    CheckpointResult, CleanupResult, CommitInfo, PendingChanges, RestoreFilesResult,
    RollbackResult, ShadeConfig, ShadeError, NOT_ENABLED_MESSAGE,
};
use libshade_git::ShadowRepo;
use tracing::{debug, error, info, warn};

/// Coordinates sync, commits, cleanup, rollback and transactions for one
/// live directory.
pub struct ShadowManager {
    pub(crate) config: ShadeConfig,
    pub(crate) repo: Option<ShadowRepo>,
    processing_request: bool,
}

impl ShadowManager {
    /// Manager for `config`; nothing touches the disk until [`init`](Self::init)
    pub fn new(config: ShadeConfig) -> Self {
        Self {
            config,
            repo: None,
            processing_request: false,
        }
    }

    pub fn config(&self) -> &ShadeConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.repo.is_some()
    }

    /// A checkpoint is open and auto-commits with `skip_if_processing` are held
    pub fn is_processing_request(&self) -> bool {
        self.processing_request
    }

    /// Create or load the shadow repository, reporting failures
    pub fn try_init(&mut self) -> Result<(), ShadeError> {
        let repo = ShadowRepo::init(&self.config)?;
        self.repo = Some(repo);
        Ok(())
    }

    /// Create or load the shadow repository. Failures are logged and leave
    /// the manager uninitialised. Returns whether a repository is loaded.
    pub fn init(&mut self) -> bool {
        if let Err(e) = self.try_init() {
            error!("Failed to initialise shadow repository: {}", e);
        }
        self.is_initialized()
    }

    pub(crate) fn repo_or_not_initialized(&mut self) -> Result<&mut ShadowRepo, ShadeError> {
        self.repo
            .as_mut()
            .ok_or_else(|| ShadeError::NotInitialized(NOT_ENABLED_MESSAGE.to_string()))
    }

    /// Sync and commit. Returns the short hash, or `None` when nothing was
    /// committed for any reason, failures included.
    pub fn commit_changes(
        &mut self,
        message: Option<&str>,
        skip_if_processing: bool,
        force: bool,
    ) -> Option<String> {
        if skip_if_processing && self.processing_request {
            debug!("Skipping auto-commit, request processing in progress");
            return None;
        }
        let repo = self.repo.as_mut()?;
        match repo.commit(message, force) {
            Ok(outcome) => outcome.short_hash().map(str::to_string),
            Err(e) => {
                error!("Failed to commit changes: {}", e);
                None
            }
        }
    }

    /// Force a commit, tag it, and mark a request as in flight.
    ///
    /// Falls back to the current HEAD when there was nothing to commit. Pair
    /// with [`end_request_processing`](Self::end_request_processing).
    pub fn create_checkpoint(&mut self, description: &str) -> CheckpointResult {
        if self.repo.is_none() {
            return CheckpointResult::not_enabled();
        }

        let message = format!("Checkpoint before: {}", description);
        let commit_hash = self
            .commit_changes(Some(&message), false, true)
            .or_else(|| self.repo.as_ref().and_then(|r| r.head_short()));

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let tag = format!("checkpoint_{}", timestamp);

        if commit_hash.is_some() {
            if let Some(repo) = self.repo.as_ref() {
                match repo.create_tag(&tag, &message) {
                    Ok(_) => info!("Created checkpoint tag: {}", tag),
                    Err(e) => warn!("Failed to create tag {}: {}", tag, e),
                }
            }
        }

        self.processing_request = true;

        CheckpointResult {
            success: true,
            message: format!("Checkpoint created: {}", tag),
            commit_hash,
            tag: Some(tag),
            timestamp: Some(timestamp),
        }
    }

    /// Re-enable auto-commits after a checkpointed request
    pub fn end_request_processing(&mut self) {
        self.processing_request = false;
    }

    /// Commits on the first-parent chain, 0 when uninitialised
    pub fn commit_count(&self) -> usize {
        self.repo.as_ref().map(|r| r.commit_count()).unwrap_or(0)
    }

    /// Last `limit` commits, newest first
    pub fn get_history(&self, limit: usize) -> Vec<CommitInfo> {
        let Some(repo) = self.repo.as_ref() else {
            return Vec::new();
        };
        repo.history(limit).unwrap_or_else(|e| {
            error!("Failed to get history: {}", e);
            Vec::new()
        })
    }

    /// Uncommitted changes, with the working diff attached when there are any
    pub fn get_pending_changes(&self) -> PendingChanges {
        let Some(repo) = self.repo.as_ref() else {
            return PendingChanges::default();
        };
        match repo.pending_changes() {
            Ok(mut pending) => {
                if pending.has_changes {
                    pending.diff = self.get_diff(None, None);
                }
                pending
            }
            Err(e) => {
                error!("Failed to get pending changes: {}", e);
                PendingChanges::with_error(e.to_string())
            }
        }
    }

    /// Diff text; empty when uninitialised or on any failure
    pub fn get_diff(&self, from: Option<&str>, to: Option<&str>) -> String {
        let Some(repo) = self.repo.as_ref() else {
            return String::new();
        };
        repo.diff(from, to).unwrap_or_else(|e| {
            error!("Failed to get diff: {}", e);
            String::new()
        })
    }

    /// Make the live directory match `commit`
    pub fn rollback(&mut self, commit: &str) -> Result<RollbackResult, ShadeError> {
        let repo = self.repo_or_not_initialized()?;
        repo.rollback(commit).map_err(|e| {
            error!("Failed to rollback: {}", e);
            operation_failure("Rollback", e)
        })
    }

    /// Restore files matching `patterns` (all when empty) from `commit`
    /// (HEAD when `None`) into the live directory
    pub fn restore_files_from_commit(
        &mut self,
        commit: Option<&str>,
        patterns: &[String],
    ) -> Result<RestoreFilesResult, ShadeError> {
        let repo = self.repo_or_not_initialized()?;
        let (label, restored) = repo.restore_files(commit, patterns).map_err(|e| {
            error!("Failed to restore files from commit: {}", e);
            operation_failure("Restore", e)
        })?;
        Ok(RestoreFilesResult::new(label, restored))
    }

    /// Truncate history to `max_backups` when it has grown past it
    pub fn cleanup_commits(&mut self) -> CleanupResult {
        let max_backups = self.config.max_backups;
        let Some(repo) = self.repo.as_mut() else {
            return CleanupResult::not_enabled();
        };

        let before = repo.commit_count();
        if before <= max_backups {
            return CleanupResult {
                success: true,
                message: format!("No cleanup needed — {} commits (max: {})", before, max_backups),
                commits_before: before,
                commits_after: before,
            };
        }

        match repo.truncate(max_backups) {
            Ok(after) => {
                info!("Manual cleanup: {} -> {} commits", before, after);
                CleanupResult {
                    success: true,
                    message: format!("Cleanup complete: {} → {} commits", before, after),
                    commits_before: before,
                    commits_after: after,
                }
            }
            Err(e) => {
                error!("Cleanup failed: {}", e);
                CleanupResult {
                    success: false,
                    message: format!("Cleanup failed: {}", e),
                    commits_before: 0,
                    commits_after: 0,
                }
            }
        }
    }
}

/// Keep typed errors callers act on; fold the rest into a VCS failure
fn operation_failure(operation: &str, err: ShadeError) -> ShadeError {
    match err {
        ShadeError::Vcs(_)
        | ShadeError::NotInitialized(_)
        | ShadeError::Configuration(_)
        | ShadeError::PathSecurity(_)
        | ShadeError::InvalidArgs(_) => err,
        other => ShadeError::Vcs(format!("{} failed: {}", operation, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn manager(dir: &std::path::Path) -> ShadowManager {
        let mut manager = ShadowManager::new(ShadeConfig::new(dir));
        assert!(manager.init());
        manager
    }

    #[test]
    fn test_uninitialised_reads_are_neutral() {
        let dir = tempdir().unwrap();
        let mut manager = ShadowManager::new(ShadeConfig::new(dir.path()));

        assert!(manager.commit_changes(None, false, true).is_none());
        assert!(manager.get_history(10).is_empty());
        assert_eq!(manager.get_pending_changes(), PendingChanges::default());
        assert_eq!(manager.get_diff(None, None), "");
        assert_eq!(manager.commit_count(), 0);

        let checkpoint = manager.create_checkpoint("anything");
        assert!(!checkpoint.success);
        assert_eq!(checkpoint.message, NOT_ENABLED_MESSAGE);
        assert!(!manager.is_processing_request());

        let cleanup = manager.cleanup_commits();
        assert!(!cleanup.success);
    }

    #[test]
    fn test_uninitialised_mutations_are_errors() {
        let dir = tempdir().unwrap();
        let mut manager = ShadowManager::new(ShadeConfig::new(dir.path()));

        assert!(matches!(manager.rollback("abcd1234"), Err(ShadeError::NotInitialized(_))));
        assert!(matches!(
            manager.restore_files_from_commit(None, &[]),
            Err(ShadeError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_failed_init_stays_uninitialised() {
        let dir = tempdir().unwrap();
        let config = ShadeConfig::new(dir.path()).with_shadow_dir_name("");
        let mut manager = ShadowManager::new(config);
        assert!(!manager.init());
        assert!(manager.try_init().is_err());
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_checkpoint_sets_and_clears_processing_flag() {
        let dir = tempdir().unwrap();
        let mut manager = manager(dir.path());
        fs::write(dir.path().join("a.yaml"), "a: 1\n").unwrap();

        let checkpoint = manager.create_checkpoint("rename lights");
        assert!(checkpoint.success);
        let tag = checkpoint.tag.clone().unwrap();
        assert!(tag.starts_with("checkpoint_"));
        assert_eq!(checkpoint.commit_hash.as_ref().unwrap().len(), 8);
        assert!(manager.is_processing_request());
        assert_eq!(manager.get_history(1)[0].message, "Checkpoint before: rename lights");

        // held while processing
        fs::write(dir.path().join("a.yaml"), "a: 2\n").unwrap();
        assert!(manager.commit_changes(None, true, false).is_none());

        manager.end_request_processing();
        assert!(manager.commit_changes(None, true, false).is_some());
    }

    #[test]
    fn test_checkpoint_falls_back_to_head() {
        let dir = tempdir().unwrap();
        let mut manager = manager(dir.path());
        fs::write(dir.path().join("a.yaml"), "a: 1\n").unwrap();
        let head = manager.commit_changes(Some("base"), false, false).unwrap();

        let checkpoint = manager.create_checkpoint("no changes");
        assert_eq!(checkpoint.commit_hash, Some(head));
        assert_eq!(manager.commit_count(), 1);
    }

    #[test]
    fn test_checkpoint_on_empty_repository_has_no_hash() {
        let dir = tempdir().unwrap();
        let mut manager = manager(dir.path());

        let checkpoint = manager.create_checkpoint("empty");
        assert!(checkpoint.success);
        assert!(checkpoint.commit_hash.is_none());
        assert!(manager.is_processing_request());
    }

    #[test]
    fn test_pending_changes_carry_diff() {
        let dir = tempdir().unwrap();
        let mut manager = manager(dir.path());
        fs::write(dir.path().join("a.yaml"), "value: 1\n").unwrap();
        manager.commit_changes(Some("base"), false, false).unwrap();

        fs::write(dir.path().join("a.yaml"), "value: 2\n").unwrap();
        let pending = manager.get_pending_changes();
        assert!(pending.has_changes);
        assert_eq!(pending.files_modified, vec!["a.yaml"]);
        assert!(pending.diff.contains("+value: 2"));
        assert!(pending.error.is_none());
    }

    #[test]
    fn test_cleanup_messages() {
        let dir = tempdir().unwrap();
        let config = ShadeConfig::new(dir.path()).with_max_backups(100);
        let mut manager = ShadowManager::new(config);
        assert!(manager.init());

        for n in 0..4 {
            fs::write(dir.path().join("a.yaml"), format!("n: {}\n", n)).unwrap();
            manager.commit_changes(None, false, false).unwrap();
        }
        let result = manager.cleanup_commits();
        assert!(result.success);
        assert_eq!(result.commits_before, 4);
        assert_eq!(result.commits_after, 4);
        assert!(result.message.starts_with("No cleanup needed"));

        manager.config.max_backups = 2;
        let result = manager.cleanup_commits();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.commits_before, 4);
        assert!(result.commits_after <= 2);
        assert!(manager.commit_count() <= 2);
    }
}
