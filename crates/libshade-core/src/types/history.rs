use serde::{Deserialize, Serialize};

/// Message carried by neutral results when no repository is loaded
pub const NOT_ENABLED_MESSAGE: &str = "Git versioning not enabled";

/// One commit as shown in history listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Abbreviated (8 hex chars) commit id
    pub hash: String,
    /// Message with surrounding whitespace trimmed
    pub message: String,
    /// `Name <email>`
    pub author: String,
    /// Commit time, RFC 3339 UTC
    pub date: String,
    /// Number of parents. A cheap stand-in for the number of changed
    /// files; not an exact diff size.
    pub files_changed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChangesSummary {
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub total: usize,
}

/// Uncommitted changes in the shadow tree relative to HEAD
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChanges {
    pub has_changes: bool,
    pub files_modified: Vec<String>,
    pub files_added: Vec<String>,
    pub files_deleted: Vec<String>,
    pub summary: PendingChangesSummary,
    #[serde(default)]
    pub diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingChanges {
    /// Build from the three disjoint path sets; `has_changes` and the summary
    /// are derived.
    pub fn from_sets(modified: Vec<String>, added: Vec<String>, deleted: Vec<String>) -> Self {
        let summary = PendingChangesSummary {
            modified: modified.len(),
            added: added.len(),
            deleted: deleted.len(),
            total: modified.len() + added.len() + deleted.len(),
        };
        Self {
            has_changes: summary.total > 0,
            files_modified: modified,
            files_added: added,
            files_deleted: deleted,
            summary,
            diff: String::new(),
            error: None,
        }
    }

    /// Empty change set reporting why it could not be computed
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointResult {
    pub success: bool,
    pub message: String,
    /// `None` when there was neither a new commit nor a HEAD to fall back on
    pub commit_hash: Option<String>,
    pub tag: Option<String>,
    pub timestamp: Option<String>,
}

impl CheckpointResult {
    pub fn not_enabled() -> Self {
        Self {
            success: false,
            message: NOT_ENABLED_MESSAGE.to_string(),
            commit_hash: None,
            tag: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub commit: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFilesResult {
    pub success: bool,
    pub commit: String,
    pub restored_files: Vec<String>,
    pub count: usize,
}

impl RestoreFilesResult {
    pub fn new(commit: impl Into<String>, restored_files: Vec<String>) -> Self {
        Self {
            success: true,
            commit: commit.into(),
            count: restored_files.len(),
            restored_files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub success: bool,
    pub message: String,
    pub commits_before: usize,
    pub commits_after: usize,
}

impl CleanupResult {
    pub fn not_enabled() -> Self {
        Self {
            success: false,
            message: NOT_ENABLED_MESSAGE.to_string(),
            commits_before: 0,
            commits_after: 0,
        }
    }
}
