//! History truncation
//!
//! Two strategies behind one trait, tried in order:
//! - [`CloneStrategy`]: depth-limited `git clone` of the repository and a
//!   swap of the `.git` directory. Needs a working `git` on `PATH`; also
//!   drops the discarded objects.
//! - [`GraftStrategy`]: pure libgit2. Orphans the oldest kept commit and
//!   rewrites the newer ones on top of it.
//!
//! A clone failure restores the original `.git` and falls through to the
//! graft.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use git2::{Oid, Repository};
use libshade_core::copy_tree;
use tracing::{debug, info, warn};

use crate::process::{git_available, run_git, LONG_TIMEOUT, QUERY_TIMEOUT};
use crate::GitError;

/// Branch assumed when the current one cannot be detected
pub const DEFAULT_BRANCH: &str = "master";

/// A way of cutting history down to the most recent commits
pub trait TruncateStrategy {
    fn name(&self) -> &'static str;

    /// Keep at most `keep` commits on the first-parent chain of HEAD.
    /// Returns the resulting commit count.
    fn truncate(&self, repo_path: &Path, keep: usize) -> Result<usize, GitError>;
}

/// Strategies usable on this host, preferred first
pub fn available_strategies() -> Vec<Box<dyn TruncateStrategy>> {
    if git_available() {
        vec![Box::new(CloneStrategy), Box::new(GraftStrategy)]
    } else {
        debug!("git executable not found, using graft truncation only");
        vec![Box::new(GraftStrategy)]
    }
}

/// Truncate the repository at `repo_path` to at most `keep` commits
pub fn truncate_history(repo_path: &Path, keep: usize) -> Result<usize, GitError> {
    truncate_with(&available_strategies(), repo_path, keep)
}

/// Like [`truncate_history`] with an explicit strategy list
pub fn truncate_with(
    strategies: &[Box<dyn TruncateStrategy>],
    repo_path: &Path,
    keep: usize,
) -> Result<usize, GitError> {
    if keep == 0 {
        return Err(GitError::InvalidArgs("commits to keep must be at least 1".to_string()));
    }
    if !repo_path.join(".git").is_dir() {
        return Err(GitError::NotARepo(repo_path.display().to_string()));
    }

    let mut last_err = None;
    for strategy in strategies {
        match strategy.truncate(repo_path, keep) {
            Ok(count) => {
                info!("Truncated history via {}: {} commits remain", strategy.name(), count);
                return Ok(count);
            }
            Err(e) => {
                warn!("{} truncation failed: {}", strategy.name(), e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| GitError::Truncate("no truncation strategy available".to_string())))
}

/// Shallow clone plus `.git` swap
pub struct CloneStrategy;

impl CloneStrategy {
    fn current_branch(repo_path: &Path) -> String {
        match run_git(&["branch", "--show-current"], repo_path, QUERY_TIMEOUT) {
            Ok(branch) if !branch.is_empty() => branch,
            Ok(_) => DEFAULT_BRANCH.to_string(),
            Err(e) => {
                debug!("branch detection failed, assuming {}: {}", DEFAULT_BRANCH, e);
                DEFAULT_BRANCH.to_string()
            }
        }
    }

    /// Put the cloned `.git` in place, restoring the original on failure
    fn swap_git_dir(git_dir: &Path, cloned: &Path, backup: &Path) -> Result<(), GitError> {
        copy_tree(git_dir, backup)?;
        fs::remove_dir_all(git_dir)?;
        if let Err(e) = copy_tree(cloned, git_dir) {
            warn!("Failed to install truncated .git, restoring original: {}", e);
            let _ = fs::remove_dir_all(git_dir);
            copy_tree(backup, git_dir)?;
            return Err(e.into());
        }
        Ok(())
    }
}

impl TruncateStrategy for CloneStrategy {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn truncate(&self, repo_path: &Path, keep: usize) -> Result<usize, GitError> {
        let repo_path = fs::canonicalize(repo_path)?;
        let git_dir = repo_path.join(".git");
        let branch = Self::current_branch(&repo_path);

        let scratch = tempfile::Builder::new().prefix("shade-truncate-").tempdir()?;
        let clone_path = scratch.path().join("cloned_repo");
        let clone_str = clone_path.to_string_lossy().into_owned();
        let url = format!("file://{}", repo_path.display());
        let depth = keep.to_string();

        info!("Cloning repository with depth={} from {}", keep, url);
        run_git(
            &[
                "clone",
                "--quiet",
                "--depth",
                &depth,
                "--branch",
                &branch,
                "--single-branch",
                &url,
                &clone_str,
            ],
            scratch.path(),
            LONG_TIMEOUT,
        )?;

        let cloned_git = clone_path.join(".git");
        if !cloned_git.is_dir() {
            return Err(GitError::Truncate("cloned .git directory does not exist".to_string()));
        }
        // the clone must not point back at the repository it replaces
        if let Ok(cloned) = Repository::open(&clone_path) {
            let _ = cloned.remote_delete("origin");
        }

        Self::swap_git_dir(&git_dir, &cloned_git, &scratch.path().join("git_backup"))?;
        info!("Replaced .git directory with shallow clone");

        if let Err(e) = run_git(&["gc", "--prune=now", "--quiet"], &repo_path, LONG_TIMEOUT) {
            warn!("git gc after truncation failed: {}", e);
        }

        let count = run_git(
            &["rev-list", "--count", "--first-parent", "HEAD"],
            &repo_path,
            QUERY_TIMEOUT,
        )
        .ok()
        .and_then(|out| out.parse::<usize>().ok())
        .unwrap_or(keep);
        Ok(count)
    }
}

/// Orphan-and-rewrite truncation through libgit2
pub struct GraftStrategy;

impl TruncateStrategy for GraftStrategy {
    fn name(&self) -> &'static str {
        "graft"
    }

    fn truncate(&self, repo_path: &Path, keep: usize) -> Result<usize, GitError> {
        let repo = Repository::open(repo_path)?;
        let head = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|_| GitError::Truncate("repository has no HEAD".to_string()))?;
        let old_head = head.id();

        // HEAD first, one more than we keep
        let mut chain = vec![head];
        while chain.len() < keep + 1 {
            let Some(last) = chain.last() else { break };
            match last.parent(0) {
                Ok(parent) => chain.push(parent),
                Err(_) => break,
            }
        }
        if chain.len() <= keep {
            return Ok(chain.len());
        }

        let mut remap: HashMap<Oid, Oid> = HashMap::new();
        for (i, commit) in chain[..keep].iter().enumerate().rev() {
            let parents = if i == keep - 1 {
                Vec::new()
            } else {
                commit
                    .parent_ids()
                    .map(|p| repo.find_commit(remap.get(&p).copied().unwrap_or(p)))
                    .collect::<Result<Vec<_>, _>>()?
            };
            let parent_refs: Vec<_> = parents.iter().collect();
            let message = String::from_utf8_lossy(commit.message_raw_bytes()).into_owned();
            let new_id = repo.commit(
                None,
                &commit.author(),
                &commit.committer(),
                &message,
                &commit.tree()?,
                &parent_refs,
            )?;
            remap.insert(commit.id(), new_id);
        }

        let new_head = remap
            .get(&old_head)
            .copied()
            .ok_or_else(|| GitError::Truncate("rewritten HEAD missing".to_string()))?;

        let mut repointed = Vec::new();
        for reference in repo.references()? {
            let reference = reference?;
            if reference.target() == Some(old_head) {
                if let Some(name) = reference.name() {
                    repointed.push(name.to_string());
                }
            }
        }
        for name in &repointed {
            repo.reference(name, new_head, true, "shade: truncate history")?;
            debug!("Repointed {} to {}", name, new_head);
        }
        if repo.head_detached()? {
            repo.set_head_detached(new_head)?;
        }

        Ok(keep)
    }
}
