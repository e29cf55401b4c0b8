//! Live directory <-> shadow tree synchronisation
//!
//! Filesystem only; nothing here reads or writes version-control metadata.
//! Both directions are best-effort: a single failed copy or delete is logged
//! and counted, the pass carries on.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::error::ShadeError;
use crate::filter::{normalize_rel_path, should_include_path};

/// Version-control metadata directory, skipped at every depth
pub const VCS_DIR: &str = ".git";

/// Shadow subtree reserved for exports, never touched by sync
pub const EXPORT_DIR: &str = "export";

/// Shadow subtree holding transaction records and backups
pub const TRANSACTIONS_DIR: &str = ".shade_transactions";

/// Counters from one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Files copied to the destination
    pub copied: usize,
    /// Files removed from the destination
    pub removed: usize,
    /// Copies or removals that failed and were skipped
    pub failed: usize,
}

/// A file found by a walk, as (forward-slash relative path, absolute path)
type WalkedFile = (String, PathBuf);

/// Walk `root` and return every regular file, pruning directories before
/// descending into them when `keep_dir` rejects their relative path.
fn walk_files<F>(root: &Path, keep_dir: F) -> Vec<WalkedFile>
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    let prune_root = root.to_path_buf();
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(false);
    builder.filter_entry(move |entry| {
        if entry.depth() == 0 {
            return true;
        }
        if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
            return true;
        }
        if entry.file_name() == VCS_DIR {
            return false;
        }
        match relative_path(&prune_root, entry.path()) {
            Some(rel) => keep_dir(&rel),
            None => false,
        }
    });

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "walk error under {}", root.display());
                continue;
            }
        };
        if entry.depth() == 0 || entry.file_type().is_some_and(|ft| ft.is_dir()) {
            continue;
        }
        // symlinks count when they point at a regular file
        if !entry.path().is_file() {
            continue;
        }
        match relative_path(root, entry.path()) {
            Some(rel) => files.push((rel, entry.path().to_path_buf())),
            None => warn!("skipping non UTF-8 path {}", entry.path().display()),
        }
    }
    files
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        parts.push(component.as_os_str().to_str()?);
    }
    Some(parts.join("/"))
}

/// Whether a top-level shadow entry belongs to the reserved set
fn is_reserved_shadow_dir(rel_dir: &str) -> bool {
    let first = rel_dir.split('/').next().unwrap_or("");
    first == VCS_DIR || first == EXPORT_DIR || first == TRANSACTIONS_DIR
}

/// Every file under the shadow root except the reserved subtrees
fn shadow_files(shadow_root: &Path) -> Vec<WalkedFile> {
    walk_files(shadow_root, |rel_dir| !is_reserved_shadow_dir(rel_dir))
}

/// Every live file the path filter tracks
fn tracked_live_files(live_root: &Path, shadow_dir_name: &str) -> Vec<WalkedFile> {
    let shadow_dir_name_owned = shadow_dir_name.to_string();
    walk_files(live_root, move |rel_dir| {
        should_include_path(rel_dir, true, &shadow_dir_name_owned)
    })
    .into_iter()
    .filter(|(rel, _)| should_include_path(rel, false, shadow_dir_name))
    .collect()
}

/// Copy `src` over `dst`, creating parents and carrying the modification time
pub(crate) fn copy_preserving_mtime(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    let modified = fs::metadata(src)?.modified()?;
    File::options().write(true).open(dst)?.set_modified(modified)?;
    Ok(())
}

/// Copy the whole tree under `src` into `dst`, hidden entries included.
///
/// Unlike the sync passes nothing is filtered and the first failure aborts
/// the copy. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<usize> {
    let walker = WalkBuilder::new(src)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut copied = 0;
    for result in walker {
        let entry = result.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        copied += 1;
    }
    Ok(copied)
}

/// Turn a caller-supplied relative path into a safe relative `PathBuf`
fn safe_relative(rel_path: &str) -> Option<PathBuf> {
    let normalized = normalize_rel_path(rel_path);
    let path = PathBuf::from(&normalized);
    let all_normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    if normalized.is_empty() || !all_normal {
        return None;
    }
    Some(path)
}

/// Mirror the filtered live tree into the shadow tree.
///
/// After this call the shadow tree equals the filtered snapshot of the live
/// tree, apart from the reserved `.git/`, `export/` and transaction subtrees.
/// A file whose copy fails keeps its previous shadow version instead of being
/// treated as deleted.
pub fn sync_live_to_shadow(
    live_root: &Path,
    shadow_root: &Path,
    shadow_dir_name: &str,
) -> Result<SyncStats, ShadeError> {
    if !live_root.is_dir() {
        return Err(ShadeError::NotFound(format!(
            "live directory does not exist: {}",
            live_root.display()
        )));
    }
    fs::create_dir_all(shadow_root)?;

    let mut stats = SyncStats::default();
    let mut included: BTreeSet<String> = BTreeSet::new();

    for (rel, src) in tracked_live_files(live_root, shadow_dir_name) {
        let dst = shadow_root.join(&rel);
        match copy_preserving_mtime(&src, &dst) {
            Ok(()) => stats.copied += 1,
            Err(e) => {
                warn!("Failed to copy {} to shadow tree: {}", src.display(), e);
                stats.failed += 1;
            }
        }
        included.insert(rel);
    }

    for (rel, path) in shadow_files(shadow_root) {
        if included.contains(&rel) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed obsolete shadow file: {}", rel);
                stats.removed += 1;
            }
            Err(e) => {
                warn!("Failed to remove obsolete shadow file {}: {}", rel, e);
                stats.failed += 1;
            }
        }
    }

    debug!(
        copied = stats.copied,
        removed = stats.removed,
        failed = stats.failed,
        "live -> shadow sync finished"
    );
    Ok(stats)
}

/// Copy shadow files back into the live directory.
///
/// - `only_paths`: copy exactly these relative paths (missing sources are
///   skipped); `None` copies every shadow file outside the reserved subtrees.
/// - `delete_missing`: delete tracked live files that have no shadow
///   counterpart. This is the only destructive path and is meant for
///   rollback/restore.
pub fn sync_shadow_to_config(
    shadow_root: &Path,
    live_root: &Path,
    only_paths: Option<&[String]>,
    delete_missing: bool,
    shadow_dir_name: &str,
) -> Result<SyncStats, ShadeError> {
    if !shadow_root.is_dir() {
        return Err(ShadeError::NotFound(format!(
            "shadow directory does not exist: {}",
            shadow_root.display()
        )));
    }
    fs::create_dir_all(live_root)?;

    let mut stats = SyncStats::default();
    let copy_one = |rel: &Path, stats: &mut SyncStats| {
        let src = shadow_root.join(rel);
        if !src.is_file() {
            return;
        }
        match copy_preserving_mtime(&src, &live_root.join(rel)) {
            Ok(()) => stats.copied += 1,
            Err(e) => {
                warn!("Failed to restore {} to live directory: {}", rel.display(), e);
                stats.failed += 1;
            }
        }
    };

    match only_paths {
        Some(paths) => {
            for rel in paths {
                match safe_relative(rel) {
                    Some(rel) => copy_one(&rel, &mut stats),
                    None => warn!("Skipping unsafe restore path: {}", rel),
                }
            }
        }
        None => {
            for (rel, _) in shadow_files(shadow_root) {
                copy_one(Path::new(&rel), &mut stats);
            }
        }
    }

    if delete_missing {
        let in_shadow: BTreeSet<String> =
            shadow_files(shadow_root).into_iter().map(|(rel, _)| rel).collect();

        for (rel, path) in tracked_live_files(live_root, shadow_dir_name) {
            if in_shadow.contains(&rel) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed file from live directory during rollback: {}", rel);
                    stats.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to remove {} from live directory during rollback: {}", rel, e);
                    stats.failed += 1;
                }
            }
        }
    }

    Ok(stats)
}
