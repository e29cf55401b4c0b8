//! Git integration for shade
//!
//! - `ShadowRepo`: commit, status, diff, history, rollback and restore over
//!   the shadow tree
//! - History truncation through a shallow clone or a native graft
//! - Bounded invocation of the external `git` executable

mod error;
pub mod process;
mod repo;
pub mod truncate;

pub use error::GitError;
pub use repo::{
    cleanup_keep_count, cleanup_target, short_id, CommitOutcome, ShadowRepo, MIN_KEEP_AFTER_CLEANUP, SHADE_EMAIL,
    SHADE_NAME, SHORT_HASH_LEN,
};
pub use truncate::{
    available_strategies, truncate_history, truncate_with, CloneStrategy, GraftStrategy,
    TruncateStrategy, DEFAULT_BRANCH,
};
