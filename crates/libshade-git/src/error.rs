use libshade_core::ShadeError;
use thiserror::Error;

/// Errors from the commit store and the history truncator
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No `.git` where one was expected; never retried
    #[error("Not a git repository: {0}")]
    NotARepo(String),

    #[error("git {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("git {command} timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// The external toolchain is missing or unusable
    #[error("git executable unavailable: {0}")]
    Unavailable(String),

    #[error("History truncation failed: {0}")]
    Truncate(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),
}

impl From<GitError> for ShadeError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::NotARepo(_) => ShadeError::Configuration(err.to_string()),
            GitError::InvalidArgs(msg) => ShadeError::InvalidArgs(msg),
            GitError::CommitNotFound(_) => ShadeError::Vcs(err.to_string()),
            GitError::Io(e) => ShadeError::Io(e),
            other => ShadeError::Vcs(other.to_string()),
        }
    }
}
