//! Properties of the live <-> shadow sync on real directory trees

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use libshade_core::{sync_live_to_shadow, sync_shadow_to_config, EXPORT_DIR};
use tempfile::tempdir;

const SHADOW: &str = "shade_git";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every file below `root` as relative path -> content, skipping `.git` and
/// the shadow directory
fn snapshot(root: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if entry.file_type().unwrap().is_dir() {
                if entry.file_name() != ".git" && entry.file_name() != SHADOW {
                    stack.push(path);
                }
                continue;
            }
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            files.insert(rel, fs::read_to_string(&path).unwrap_or_default());
        }
    }
    files
}

fn populate_live(live: &Path) {
    write(live, "configuration.yaml", "name: Test\n");
    write(live, "automations.yaml", "- id: one\n");
    write(live, "packages/lights.yaml", "light: []\n");
    write(live, "secrets.yaml", "password: hunter2\n");
    write(live, "home-assistant.log", "log line\n");
    write(live, "home-assistant_v2.db", "binary");
    write(live, ".storage/core.config", "{}");
    write(live, "www/card.js", "js");
    write(live, "automations.yaml.bak", "old");
}

#[test]
fn test_live_to_shadow_mirrors_filtered_tree() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);

    let stats = sync_live_to_shadow(live, &shadow, SHADOW).unwrap();
    assert_eq!(stats.copied, 3);
    assert_eq!(stats.failed, 0);

    let mirrored: Vec<_> = snapshot(&shadow).into_keys().collect();
    assert_eq!(
        mirrored,
        vec!["automations.yaml", "configuration.yaml", "packages/lights.yaml"]
    );
}

#[test]
fn test_sync_is_idempotent() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);

    sync_live_to_shadow(live, &shadow, SHADOW).unwrap();
    let first = snapshot(&shadow);
    let second_stats = sync_live_to_shadow(live, &shadow, SHADOW).unwrap();
    let second = snapshot(&shadow);

    assert_eq!(first, second);
    assert_eq!(second_stats.removed, 0);
}

#[test]
fn test_deleted_and_newly_excluded_files_leave_shadow() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);
    sync_live_to_shadow(live, &shadow, SHADOW).unwrap();

    fs::remove_file(live.join("automations.yaml")).unwrap();
    let stats = sync_live_to_shadow(live, &shadow, SHADOW).unwrap();

    assert_eq!(stats.removed, 1);
    assert!(!shadow.join("automations.yaml").exists());
}

#[test]
fn test_reserved_shadow_subtrees_untouched() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);
    write(&shadow, &format!("{}/report.yaml", EXPORT_DIR), "kept\n");
    write(&shadow, ".git/HEAD", "ref: refs/heads/master\n");
    write(&shadow, ".shade_transactions/abc.json", "{}");

    sync_live_to_shadow(live, &shadow, SHADOW).unwrap();

    assert_eq!(fs::read_to_string(shadow.join("export/report.yaml")).unwrap(), "kept\n");
    assert!(shadow.join(".git/HEAD").exists());
    assert!(shadow.join(".shade_transactions/abc.json").exists());

    // and nothing reserved flows back into the live directory
    sync_shadow_to_config(&shadow, live, None, false, SHADOW).unwrap();
    assert!(!live.join("export").exists());
    assert!(!live.join(".shade_transactions").exists());
}

#[test]
fn test_round_trip_reproduces_tracked_content() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);

    let before = snapshot(live);
    sync_live_to_shadow(live, &shadow, SHADOW).unwrap();
    let stats = sync_shadow_to_config(&shadow, live, None, true, SHADOW).unwrap();
    let after = snapshot(live);

    assert_eq!(stats.removed, 0);
    assert_eq!(before, after);
}

#[test]
fn test_delete_missing_removes_only_tracked_files() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);
    sync_live_to_shadow(live, &shadow, SHADOW).unwrap();

    write(live, "packages/new.yaml", "added after sync\n");

    let stats = sync_shadow_to_config(&shadow, live, None, true, SHADOW).unwrap();
    assert_eq!(stats.removed, 1);
    assert!(!live.join("packages/new.yaml").exists());
    // excluded files are never considered for deletion
    assert!(live.join("secrets.yaml").exists());
    assert!(live.join("home-assistant_v2.db").exists());
    assert!(live.join(".storage/core.config").exists());
}

#[test]
fn test_only_paths_copies_exactly_those() {
    let dir = tempdir().unwrap();
    let live = dir.path();
    let shadow = live.join(SHADOW);
    populate_live(live);
    sync_live_to_shadow(live, &shadow, SHADOW).unwrap();

    write(&shadow, "configuration.yaml", "name: Restored\n");
    write(&shadow, "automations.yaml", "- id: restored\n");

    let only = vec!["configuration.yaml".to_string(), "missing.yaml".to_string()];
    let stats = sync_shadow_to_config(&shadow, live, Some(&only), false, SHADOW).unwrap();

    assert_eq!(stats.copied, 1);
    assert_eq!(fs::read_to_string(live.join("configuration.yaml")).unwrap(), "name: Restored\n");
    assert_eq!(fs::read_to_string(live.join("automations.yaml")).unwrap(), "- id: one\n");
    assert!(!live.join("missing.yaml").exists());

    let none: Vec<String> = Vec::new();
    let stats = sync_shadow_to_config(&shadow, live, Some(&none), false, SHADOW).unwrap();
    assert_eq!(stats.copied, 0);
}
