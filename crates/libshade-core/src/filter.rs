//! Path filtering: which live files are worth versioning
//!
//! Pure logic. No filesystem access and no state, so the same inputs always
//! give the same answer. Paths are relative to the live directory and may use
//! either separator.

use std::sync::OnceLock;
use glob::Pattern;

/// Top-level directories that are never descended into
pub const EXCLUDED_DIRS: &[&str] = &[
    ".storage",
    ".cloud",
    ".homeassistant",
    "www",
    "media",
    "storage",
    "tmp",
    "node_modules",
    "__pycache__",
];

/// Exact filenames holding secrets
pub const SECRET_FILES: &[&str] = &["secrets.yaml", ".secrets.yaml"];

const SECRET_PATTERNS: &[&str] = &["*.pem", "*.key", "*.crt"];

const DB_PATTERNS: &[&str] = &[
    "*.db",
    "*.db-shm",
    "*.db-wal",
    "*.db-journal",
    "*.sqlite",
    "*.sqlite3",
    "home-assistant_v2.db*",
];

const LOG_PATTERNS: &[&str] = &["*.log", "*.log.*", "home-assistant.log"];

const BACKUP_PATTERNS: &[&str] = &["*.bak", "*.backup", "*.old", "*.tmp", "*.temp", "*~"];

/// Files below these prefixes are excluded even if their directory was not pruned
const EXCLUDED_PREFIXES: &[&str] = &[
    ".storage/",
    ".cloud/",
    ".homeassistant/",
    "www/",
    "media/",
    "storage/",
    "tmp/",
];

struct CompiledPatterns {
    secrets: Vec<Pattern>,
    databases: Vec<Pattern>,
    logs: Vec<Pattern>,
    backups: Vec<Pattern>,
}

fn compile(patterns: &[&str]) -> Vec<Pattern> {
    patterns.iter().filter_map(|p| Pattern::new(p).ok()).collect()
}

fn patterns() -> &'static CompiledPatterns {
    static PATTERNS: OnceLock<CompiledPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CompiledPatterns {
        secrets: compile(SECRET_PATTERNS),
        databases: compile(DB_PATTERNS),
        logs: compile(LOG_PATTERNS),
        backups: compile(BACKUP_PATTERNS),
    })
}

/// Forward-slash form of a relative path without leading `./` or `/`
pub fn normalize_rel_path(rel_path: &str) -> String {
    let mut path = rel_path.replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path.trim_start_matches('/').to_string()
}

/// Decide whether `rel_path` should be mirrored into the shadow tree.
///
/// Rules, first match wins:
/// 1. first segment is `.git` or the shadow directory: excluded
/// 2. directories: excluded if the first segment is in [`EXCLUDED_DIRS`]
/// 3. files: excluded if secret, key/cert, database, log, backup/temp, or
///    below one of the excluded prefixes
pub fn should_include_path(rel_path: &str, is_dir: bool, shadow_dir_name: &str) -> bool {
    let rel_path = normalize_rel_path(rel_path);
    let first = rel_path.split('/').next().unwrap_or("");

    if first == ".git" || first == shadow_dir_name {
        return false;
    }

    if is_dir {
        return !EXCLUDED_DIRS.contains(&first);
    }

    let filename = rel_path.rsplit('/').next().unwrap_or("");
    let compiled = patterns();

    if SECRET_FILES.contains(&filename) {
        return false;
    }
    if compiled.secrets.iter().any(|p| p.matches(filename)) {
        return false;
    }

    let matches_name_or_path = |set: &[Pattern]| {
        set.iter().any(|p| p.matches(filename) || p.matches(&rel_path))
    };
    if matches_name_or_path(&compiled.databases)
        || matches_name_or_path(&compiled.logs)
        || matches_name_or_path(&compiled.backups)
    {
        return false;
    }

    !EXCLUDED_PREFIXES.iter().any(|prefix| rel_path.starts_with(prefix))
}
