//! The shadow repository: a linear git history over the shadow tree
//!
//! `ShadowRepo` owns the `git2::Repository` for one shadow directory and
//! implements commit, status, diff, history, rollback and restore on top of
//! the live <-> shadow sync from `libshade-core`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{
    Commit, DiffFormat, DiffOptions, IndexAddOption, ObjectType, Oid, Repository, ResetType,
    Signature, Status, StatusOptions, Tree,
};
use glob::Pattern;
use libshade_core::{
    sync_live_to_shadow, sync_shadow_to_config, CommitInfo, PendingChanges, RollbackResult,
    ShadeConfig, ShadeError, TRANSACTIONS_DIR,
};
use tracing::{debug, info, warn};

use crate::truncate::truncate_history;
use crate::GitError;

/// Author, committer and tagger name for every shade commit
pub const SHADE_NAME: &str = "shade";

/// Author, committer and tagger email for every shade commit
pub const SHADE_EMAIL: &str = "shade@localhost";

/// Length of the abbreviated commit ids handed to callers
pub const SHORT_HASH_LEN: usize = 8;

/// Fewest commits an automatic truncation keeps, unless `max_backups` is lower
pub const MIN_KEEP_AFTER_CLEANUP: usize = 10;

/// What [`ShadowRepo::commit`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Shadow tree already matched HEAD
    Clean,
    /// Changes were synced into the shadow tree but auto-commit is off
    SyncedOnly,
    Committed { oid: Oid, short: String },
}

impl CommitOutcome {
    pub fn short_hash(&self) -> Option<&str> {
        match self {
            CommitOutcome::Committed { short, .. } => Some(short),
            _ => None,
        }
    }
}

/// Abbreviated form of a commit id
pub fn short_id(oid: Oid) -> String {
    let mut hex = oid.to_string();
    hex.truncate(SHORT_HASH_LEN);
    hex
}

fn signature() -> Result<Signature<'static>, GitError> {
    Ok(Signature::now(SHADE_NAME, SHADE_EMAIL)?)
}

/// Commits to keep when an automatic cleanup triggers.
///
/// Leaves a band of ten commits below the cap so large caps do not truncate
/// on every commit, but never keeps more than `max_backups`.
pub fn cleanup_keep_count(max_backups: usize) -> usize {
    MIN_KEEP_AFTER_CLEANUP
        .max(max_backups.saturating_sub(10))
        .min(max_backups)
}

/// Commits to keep if a commit count of `count` should trigger cleanup.
///
/// Cleanup triggers once the chain reaches `max_backups`, and only when it
/// would actually cut something.
pub fn cleanup_target(count: usize, max_backups: usize) -> Option<usize> {
    let keep = cleanup_keep_count(max_backups);
    (count >= max_backups && count > keep).then_some(keep)
}

/// Shadow repository handle
pub struct ShadowRepo {
    repo: Repository,
    config: ShadeConfig,
    shadow_root: PathBuf,
}

impl ShadowRepo {
    /// Create the shadow directory and repository, or load them if present.
    /// Safe to call repeatedly.
    pub fn init(config: &ShadeConfig) -> Result<Self, ShadeError> {
        config.validate()?;
        let shadow_root = config.shadow_root();
        fs::create_dir_all(&shadow_root)?;
        fs::create_dir_all(shadow_root.join(TRANSACTIONS_DIR))?;

        let repo = if shadow_root.join(".git").is_dir() {
            let repo = Repository::open(&shadow_root).map_err(GitError::from)?;
            info!("Shadow repository loaded from {}", shadow_root.display());
            repo
        } else {
            let repo = Repository::init(&shadow_root).map_err(GitError::from)?;
            info!("Shadow repository initialised in {}", shadow_root.display());
            repo
        };

        let shadow = Self {
            repo,
            config: config.clone(),
            shadow_root,
        };
        shadow.prepare()?;
        Ok(shadow)
    }

    /// Open an existing shadow repository; missing `.git` is a configuration error
    pub fn open(config: &ShadeConfig) -> Result<Self, ShadeError> {
        config.validate()?;
        let shadow_root = config.shadow_root();
        if !shadow_root.join(".git").is_dir() {
            return Err(GitError::NotARepo(shadow_root.display().to_string()).into());
        }
        let repo = Repository::open(&shadow_root).map_err(GitError::from)?;
        let shadow = Self {
            repo,
            config: config.clone(),
            shadow_root,
        };
        shadow.prepare()?;
        Ok(shadow)
    }

    /// Re-read the repository from disk after `.git` was replaced or rewritten
    pub fn reopen(&mut self) -> Result<(), ShadeError> {
        if !self.shadow_root.join(".git").is_dir() {
            return Err(GitError::NotARepo(self.shadow_root.display().to_string()).into());
        }
        self.repo = Repository::open(&self.shadow_root).map_err(GitError::from)?;
        self.prepare()
    }

    /// Identity and exclude entries; re-applied whenever `.git` may be new
    fn prepare(&self) -> Result<(), ShadeError> {
        let mut config = self.repo.config().map_err(GitError::from)?;
        config.set_str("user.name", SHADE_NAME).map_err(GitError::from)?;
        config.set_str("user.email", SHADE_EMAIL).map_err(GitError::from)?;

        let info_dir = self.repo.path().join("info");
        fs::create_dir_all(&info_dir)?;
        let exclude_path = info_dir.join("exclude");
        let entry = format!("/{}/", TRANSACTIONS_DIR);
        let existing = fs::read_to_string(&exclude_path).unwrap_or_default();
        if !existing.lines().any(|line| line.trim() == entry) {
            let mut updated = existing;
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&entry);
            updated.push('\n');
            fs::write(&exclude_path, updated)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &ShadeConfig {
        &self.config
    }

    pub fn shadow_root(&self) -> &Path {
        &self.shadow_root
    }

    pub fn live_root(&self) -> &Path {
        &self.config.live_root
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn head_commit(&self) -> Option<Commit<'_>> {
        self.repo.head().ok()?.peel_to_commit().ok()
    }

    pub fn head_oid(&self) -> Option<Oid> {
        self.head_commit().map(|c| c.id())
    }

    pub fn head_short(&self) -> Option<String> {
        self.head_oid().map(short_id)
    }

    /// Resolve a full or abbreviated id (or any revspec) to a commit
    pub fn resolve_commit(&self, rev: &str) -> Result<Commit<'_>, GitError> {
        self.repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| GitError::CommitNotFound(rev.to_string()))
    }

    fn status_options() -> StatusOptions {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);
        opts
    }

    /// Staged, unstaged or untracked changes exist in the shadow tree
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        let statuses = self.repo.statuses(Some(&mut Self::status_options()))?;
        Ok(statuses
            .iter()
            .any(|e| e.status() != Status::CURRENT && !e.status().contains(Status::IGNORED)))
    }

    /// Length of the first-parent chain from HEAD, 0 without HEAD
    pub fn commit_count(&self) -> usize {
        let Some(mut current) = self.head_commit() else {
            return 0;
        };
        let mut count = 1;
        // a shallow boundary has no reachable parent
        while let Ok(parent) = current.parent(0) {
            count += 1;
            current = parent;
        }
        count
    }

    /// Stage every change (including deletions) and commit on top of HEAD
    pub fn commit_all(&self, message: &str) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let sig = signature()?;
        let parent = self.head_commit();
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        Ok(oid)
    }

    /// Sync live -> shadow and commit if anything changed.
    ///
    /// Without `force`, a disabled auto-commit leaves the synced changes
    /// uncommitted. After a commit that brings the chain to `max_backups`,
    /// history is truncated if that cuts anything (see [`cleanup_target`]);
    /// a failed truncation is only logged.
    pub fn commit(&mut self, message: Option<&str>, force: bool) -> Result<CommitOutcome, ShadeError> {
        sync_live_to_shadow(
            &self.config.live_root,
            &self.shadow_root,
            &self.config.shadow_dir_name,
        )?;

        if !self.is_dirty()? {
            debug!("No changes to commit");
            return Ok(CommitOutcome::Clean);
        }
        if !self.config.auto_commit && !force {
            debug!("Auto-commit disabled, changes synced but not committed");
            return Ok(CommitOutcome::SyncedOnly);
        }

        let message = match message {
            Some(m) if !m.trim().is_empty() => m.to_string(),
            _ => format!("Auto-commit by shade at {}", Utc::now().to_rfc3339()),
        };
        let oid = self.commit_all(&message)?;
        let short = short_id(oid);
        info!("Committed changes: {} - {}", short, message);

        let count = self.commit_count();
        if let Some(keep) = cleanup_target(count, self.config.max_backups) {
            info!(
                "Cleanup triggered: {} commits >= max {}, keeping {}",
                count, self.config.max_backups, keep
            );
            match truncate_history(&self.shadow_root, keep) {
                Ok(after) => debug!("History truncated to {} commits", after),
                Err(e) => warn!("Cleanup failed: {}", e),
            }
            if let Err(e) = self.reopen() {
                warn!("Failed to reload repository after cleanup: {}", e);
            }
        }

        Ok(CommitOutcome::Committed { oid, short })
    }

    /// Truncate history to `keep` commits and reload. Returns the new count.
    pub fn truncate(&mut self, keep: usize) -> Result<usize, ShadeError> {
        let result = truncate_history(&self.shadow_root, keep);
        // the clone strategy may have swapped .git even on late failures
        self.reopen()?;
        Ok(result?)
    }

    /// Working tree changes against HEAD, after syncing live -> shadow
    pub fn pending_changes(&self) -> Result<PendingChanges, ShadeError> {
        sync_live_to_shadow(
            &self.config.live_root,
            &self.shadow_root,
            &self.config.shadow_dir_name,
        )?;
        Ok(self.status()?)
    }

    /// Classify every changed path into exactly one of modified/added/deleted
    pub fn status(&self) -> Result<PendingChanges, GitError> {
        let statuses = self.repo.statuses(Some(&mut Self::status_options()))?;

        let mut modified = BTreeSet::new();
        let mut added = BTreeSet::new();
        let mut deleted = BTreeSet::new();

        for entry in statuses.iter() {
            let status = entry.status();
            let Some(path) = entry.path() else {
                continue;
            };
            let path = path.to_string();
            if status.intersects(Status::INDEX_NEW | Status::WT_NEW) {
                added.insert(path);
            } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
                deleted.insert(path);
            } else if status.intersects(
                Status::INDEX_MODIFIED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE
                    | Status::WT_MODIFIED
                    | Status::WT_TYPECHANGE
                    | Status::WT_RENAMED,
            ) {
                modified.insert(path);
            }
        }

        Ok(PendingChanges::from_sets(
            modified.into_iter().collect(),
            added.into_iter().collect(),
            deleted.into_iter().collect(),
        ))
    }

    /// Unified diff text.
    ///
    /// Two commits: diff their trees. One commit: that commit against HEAD.
    /// None: HEAD against the working tree, untracked files included.
    /// Empty when there is no HEAD.
    pub fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<String, GitError> {
        let Some(head) = self.head_commit() else {
            return Ok(String::new());
        };
        let head_tree = head.tree()?;

        let diff = match (from, to) {
            (Some(a), Some(b)) => {
                let a = self.resolve_commit(a)?.tree()?;
                let b = self.resolve_commit(b)?.tree()?;
                self.repo.diff_tree_to_tree(Some(&a), Some(&b), None)?
            }
            (Some(a), None) | (None, Some(a)) => {
                let a = self.resolve_commit(a)?.tree()?;
                self.repo.diff_tree_to_tree(Some(&a), Some(&head_tree), None)?
            }
            (None, None) => {
                let mut opts = DiffOptions::new();
                opts.include_untracked(true)
                    .recurse_untracked_dirs(true)
                    .show_untracked_content(true);
                self.repo
                    .diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut opts))?
            }
        };

        let mut out = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                out.push(line.origin());
            }
            out.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(out)
    }

    /// Up to `limit` commits, HEAD first, along the first-parent chain
    pub fn history(&self, limit: usize) -> Result<Vec<CommitInfo>, GitError> {
        if self.head_commit().is_none() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        walk.simplify_first_parent()?;

        let mut commits = Vec::new();
        for oid in walk.take(limit) {
            let commit = self.repo.find_commit(oid?)?;
            let author = commit.author();
            let date = Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            commits.push(CommitInfo {
                hash: short_id(commit.id()),
                message: String::from_utf8_lossy(commit.message_raw_bytes()).trim().to_string(),
                author: format!(
                    "{} <{}>",
                    String::from_utf8_lossy(author.name_bytes()),
                    String::from_utf8_lossy(author.email_bytes())
                ),
                date,
                files_changed: commit.parent_count(),
            });
        }
        Ok(commits)
    }

    /// Annotated tag on HEAD
    pub fn create_tag(&self, name: &str, message: &str) -> Result<Oid, GitError> {
        let head = self
            .head_commit()
            .ok_or_else(|| GitError::CommitNotFound("HEAD".to_string()))?;
        let sig = signature()?;
        Ok(self.repo.tag(name, head.as_object(), &sig, message, false)?)
    }

    /// Make the live directory match `target` exactly.
    ///
    /// Pending live changes are committed first so the pre-rollback state
    /// stays reachable in history.
    pub fn rollback(&mut self, target: &str) -> Result<RollbackResult, ShadeError> {
        self.resolve_commit(target)?;

        self.commit(Some(&format!("Before rollback to {}", target)), true)?;

        let commit = self.resolve_commit(target)?;
        self.repo
            .reset(commit.as_object(), ResetType::Hard, None)
            .map_err(GitError::from)?;

        sync_shadow_to_config(
            &self.shadow_root,
            &self.config.live_root,
            None,
            true,
            &self.config.shadow_dir_name,
        )?;

        info!("Rolled back to commit: {}", target);
        Ok(RollbackResult {
            success: true,
            commit: target.to_string(),
            message: format!("Rolled back to {}", target),
        })
    }

    /// Write blobs from `commit` (default HEAD) into the shadow tree, then
    /// copy them to the live directory.
    ///
    /// With patterns, only blobs whose full path matches one of them are
    /// restored and only those paths are copied back; a non-matching blob is
    /// skipped and the walk carries on. Returns the commit label used and the
    /// restored paths in walk order.
    pub fn restore_files(
        &self,
        commit: Option<&str>,
        patterns: &[String],
    ) -> Result<(String, Vec<String>), ShadeError> {
        let (label, commit) = match commit {
            Some(rev) if !rev.is_empty() => (rev.to_string(), self.resolve_commit(rev)?),
            _ => {
                let head = self
                    .head_commit()
                    .ok_or_else(|| GitError::CommitNotFound("HEAD".to_string()))?;
                (short_id(head.id()), head)
            }
        };

        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    ShadeError::InvalidArgs(format!("invalid file pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let root = commit.tree().map_err(GitError::from)?;
        let restored = self.write_tree_blobs(root, &compiled)?;

        let only_paths = if compiled.is_empty() {
            None
        } else {
            Some(restored.as_slice())
        };
        sync_shadow_to_config(
            &self.shadow_root,
            &self.config.live_root,
            only_paths,
            false,
            &self.config.shadow_dir_name,
        )?;

        info!("Restored {} file(s) from {}", restored.len(), label);
        Ok((label, restored))
    }

    fn write_tree_blobs<'r>(
        &'r self,
        root: Tree<'r>,
        patterns: &[Pattern],
    ) -> Result<Vec<String>, GitError> {
        let mut restored = Vec::new();
        let mut stack = vec![(root, String::new())];

        while let Some((tree, prefix)) = stack.pop() {
            for entry in tree.iter() {
                let Some(name) = entry.name() else {
                    continue;
                };
                let full_name = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", prefix, name)
                };
                match entry.kind() {
                    Some(ObjectType::Tree) => {
                        stack.push((self.repo.find_tree(entry.id())?, full_name));
                    }
                    Some(ObjectType::Blob) => {
                        if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&full_name)) {
                            continue;
                        }
                        let blob = self.repo.find_blob(entry.id())?;
                        let dest = self.shadow_root.join(&full_name);
                        if let Some(parent) = dest.parent() {
                            fs::create_dir_all(parent)?;
                        }
                        fs::write(&dest, blob.content())?;
                        restored.push(full_name);
                    }
                    _ => {}
                }
            }
        }
        Ok(restored)
    }
}
