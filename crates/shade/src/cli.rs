use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shade", about = "Versioned shadow copies of a live configuration directory", version)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress human-readable output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Live directory to version (defaults to the current directory)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Read settings from a TOML file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Name of the shadow directory inside the live directory
    #[arg(long, global = true)]
    pub shadow_dir: Option<String>,

    /// Commit count at which history is truncated
    #[arg(long, global = true)]
    pub max_backups: Option<usize>,

    /// Sync without committing unless a command forces it
    #[arg(long, global = true)]
    pub no_auto_commit: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the shadow repository (or load an existing one)
    Init,

    /// Sync the live directory and commit any changes
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Commit even when auto-commit is disabled
        #[arg(long)]
        force: bool,
    },

    /// Show uncommitted changes
    Status,

    /// Show a diff between two commits, or HEAD against the working tree
    Diff {
        /// Older commit
        from: Option<String>,

        /// Newer commit
        to: Option<String>,
    },

    /// Show recent commits
    Log {
        /// Number of commits to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Commit and tag the current state before a change
    Checkpoint {
        /// What is about to change
        description: String,
    },

    /// Make the live directory match a commit
    Rollback {
        /// Commit hash, tag or other revision
        commit: String,
    },

    /// Restore files from a commit into the live directory
    Restore {
        /// Revision to restore from (default: HEAD)
        #[arg(long)]
        commit: Option<String>,

        /// Glob patterns selecting files (default: all)
        patterns: Vec<String>,
    },

    /// Truncate history down to max-backups commits
    Cleanup,

    /// Atomic multi-file edits
    Tx {
        #[command(subcommand)]
        cmd: TxCommand,
    },
}

#[derive(Clone, Subcommand)]
pub enum TxCommand {
    /// Open a new transaction
    Begin {
        /// JSON object stored with the transaction
        #[arg(long)]
        context: Option<String>,
    },

    /// Stage a file write
    Write {
        /// Transaction ID
        id: String,

        /// Path relative to the live directory
        path: String,

        /// New content
        #[arg(long, conflicts_with = "from_file")]
        content: Option<String>,

        /// Read new content from a file ('-' for stdin)
        #[arg(long)]
        from_file: Option<PathBuf>,
    },

    /// Stage a file delete
    Delete {
        /// Transaction ID
        id: String,

        /// Path relative to the live directory
        path: String,
    },

    /// Check staged operations
    Validate {
        /// Transaction ID
        id: String,
    },

    /// Apply staged operations and commit them
    Commit {
        /// Transaction ID
        id: String,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Cancel a transaction without touching files
    Abort {
        /// Transaction ID
        id: String,
    },

    /// Show a transaction record
    Show {
        /// Transaction ID
        id: String,
    },

    /// List transactions, most recently updated first
    List,
}
