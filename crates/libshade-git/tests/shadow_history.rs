//! History-level behaviour of the shadow repository

use std::fs;

use libshade_core::{ShadeConfig, ShadeError};
use libshade_git::{GraftStrategy, ShadowRepo, TruncateStrategy};
use tempfile::tempdir;

fn commit_version(repo: &mut ShadowRepo, n: usize) -> String {
    fs::write(repo.live_root().join("configuration.yaml"), format!("version: {}\n", n)).unwrap();
    repo.commit(Some(&format!("commit {}", n)), false)
        .unwrap()
        .short_hash()
        .expect("commit expected")
        .to_string()
}

#[test]
fn test_commit_count_is_monotonic() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path()).with_max_backups(100)).unwrap();

    for n in 1..=6 {
        commit_version(&mut repo, n);
        assert_eq!(repo.commit_count(), n);
    }
}

#[test]
fn test_truncation_keeps_recent_messages_in_order() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path()).with_max_backups(100)).unwrap();
    for n in 1..=9 {
        commit_version(&mut repo, n);
    }

    GraftStrategy.truncate(repo.shadow_root(), 4).unwrap();
    repo.reopen().unwrap();

    assert!(repo.commit_count() <= 4);
    let messages: Vec<_> = repo.history(10).unwrap().into_iter().map(|c| c.message).collect();
    assert_eq!(messages, vec!["commit 9", "commit 8", "commit 7", "commit 6"]);

    // the repository stays usable afterwards
    commit_version(&mut repo, 10);
    assert_eq!(repo.history(1).unwrap()[0].message, "commit 10");
}

#[test]
fn test_manual_truncate_reloads_repository() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path()).with_max_backups(100)).unwrap();
    for n in 1..=7 {
        commit_version(&mut repo, n);
    }

    let after = repo.truncate(3).unwrap();
    assert!(after <= 3);
    assert!(repo.commit_count() <= 3);
    assert_eq!(repo.history(1).unwrap()[0].message, "commit 7");
    assert!(!repo.is_dirty().unwrap());
}

#[test]
fn test_automatic_cleanup_bounds_history() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path()).with_max_backups(12)).unwrap();

    for n in 1..=15 {
        commit_version(&mut repo, n);
        assert!(repo.commit_count() <= 12, "count {} after commit {}", repo.commit_count(), n);
    }
    assert_eq!(repo.history(1).unwrap()[0].message, "commit 15");
}

#[test]
fn test_rollback_restores_live_content_and_deletions() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path())).unwrap();

    let first = commit_version(&mut repo, 1);
    fs::write(dir.path().join("scripts.yaml"), "script: {}\n").unwrap();
    commit_version(&mut repo, 2);

    // uncommitted work is preserved in history before rolling back
    fs::write(dir.path().join("configuration.yaml"), "version: draft\n").unwrap();

    let result = repo.rollback(&first).unwrap();
    assert!(result.success);
    assert_eq!(result.message, format!("Rolled back to {}", first));

    assert_eq!(
        fs::read_to_string(dir.path().join("configuration.yaml")).unwrap(),
        "version: 1\n"
    );
    assert!(!dir.path().join("scripts.yaml").exists());
}

#[test]
fn test_rollback_to_unknown_commit_fails_without_changes() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path())).unwrap();
    commit_version(&mut repo, 1);

    let err = repo.rollback("ffffffff").unwrap_err();
    assert!(matches!(err, ShadeError::Vcs(_)));
    assert_eq!(repo.commit_count(), 1);
}

#[test]
fn test_restore_with_patterns_skips_non_matching_blobs() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path())).unwrap();

    fs::create_dir_all(dir.path().join("packages")).unwrap();
    fs::write(dir.path().join("automations.yaml"), "a: old\n").unwrap();
    fs::write(dir.path().join("packages/lights.yaml"), "l: old\n").unwrap();
    fs::write(dir.path().join("packages/notes.txt"), "n: old\n").unwrap();
    let first = commit_version(&mut repo, 1);

    fs::write(dir.path().join("automations.yaml"), "a: new\n").unwrap();
    fs::write(dir.path().join("packages/lights.yaml"), "l: new\n").unwrap();
    fs::write(dir.path().join("packages/notes.txt"), "n: new\n").unwrap();
    commit_version(&mut repo, 2);

    let (label, restored) = repo
        .restore_files(Some(&first), &["packages/*.yaml".to_string()])
        .unwrap();
    assert_eq!(label, first);
    assert_eq!(restored, vec!["packages/lights.yaml"]);

    assert_eq!(fs::read_to_string(dir.path().join("packages/lights.yaml")).unwrap(), "l: old\n");
    assert_eq!(fs::read_to_string(dir.path().join("packages/notes.txt")).unwrap(), "n: new\n");
    assert_eq!(fs::read_to_string(dir.path().join("automations.yaml")).unwrap(), "a: new\n");
}

#[test]
fn test_restore_without_patterns_restores_everything_from_head() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path())).unwrap();
    let head = commit_version(&mut repo, 1);

    fs::write(dir.path().join("configuration.yaml"), "version: broken\n").unwrap();

    let (label, restored) = repo.restore_files(None, &[]).unwrap();
    assert_eq!(label, head);
    assert_eq!(restored, vec!["configuration.yaml"]);
    assert_eq!(
        fs::read_to_string(dir.path().join("configuration.yaml")).unwrap(),
        "version: 1\n"
    );
}

#[test]
fn test_checkpoint_tag_points_at_head() {
    let dir = tempdir().unwrap();
    let mut repo = ShadowRepo::init(&ShadeConfig::new(dir.path())).unwrap();
    let head = commit_version(&mut repo, 1);

    repo.create_tag("checkpoint_20240101_000000", "Checkpoint before: test").unwrap();

    let tagged = repo.resolve_commit("checkpoint_20240101_000000").unwrap();
    assert_eq!(libshade_git::short_id(tagged.id()), head);
}
