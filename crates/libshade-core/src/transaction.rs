//! Transaction persistence and the apply/compensate half of the protocol
//!
//! Records live as `<dir>/<id>.json`, pre-image copies under
//! `<dir>/backups/<id>/`. The store itself knows nothing about commits; the
//! manager drives validation, apply and the follow-up commit.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ShadeError;
use crate::files::SandboxedFiles;
use crate::sync::copy_preserving_mtime;
use crate::types::transaction::{
    OpKind, RollbackMetadata, TransactionOperation, TransactionState, TransactionValidationResult,
};

const BACKUPS_DIR: &str = "backups";

/// Durable transaction records for one shadow repository
#[derive(Debug, Clone)]
pub struct TransactionStore {
    dir: PathBuf,
}

impl TransactionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, transaction_id: &str) -> Result<PathBuf, ShadeError> {
        let well_formed = !transaction_id.is_empty()
            && transaction_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(ShadeError::transaction_not_found(transaction_id));
        }
        Ok(self.dir.join(format!("{}.json", transaction_id)))
    }

    /// Directory holding pre-image copies for one transaction
    pub fn backup_dir(&self, transaction_id: &str) -> PathBuf {
        self.dir.join(BACKUPS_DIR).join(transaction_id)
    }

    /// Create and persist a new `open` transaction
    pub fn begin(&self, context: Option<Map<String, Value>>) -> Result<TransactionState, ShadeError> {
        let transaction_id = uuid::Uuid::new_v4().simple().to_string();
        let transaction = TransactionState::new(transaction_id, context.unwrap_or_default());
        self.save(&transaction)?;
        info!("Began transaction {}", transaction.transaction_id);
        Ok(transaction)
    }

    pub fn load(&self, transaction_id: &str) -> Result<TransactionState, ShadeError> {
        let path = self.record_path(transaction_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ShadeError::transaction_not_found(transaction_id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist a record; written to a temp file first and renamed into place
    pub fn save(&self, transaction: &TransactionState) -> Result<(), ShadeError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(&transaction.transaction_id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(transaction)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// All readable records, most recently updated first
    pub fn list(&self) -> Result<Vec<TransactionState>, ShadeError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut transactions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(ShadeError::from)
                .and_then(|c| serde_json::from_str::<TransactionState>(&c).map_err(ShadeError::from));
            match parsed {
                Ok(tx) => transactions.push(tx),
                Err(e) => warn!("Skipping unreadable transaction record {}: {}", path.display(), e),
            }
        }
        transactions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(transactions)
    }
}

/// Check every operation against the sandbox and the structural rules.
///
/// Path escapes are reported as validation errors here rather than raised,
/// since the record on disk may have been edited after staging.
pub fn validate_operations(
    transaction: &TransactionState,
    files: &SandboxedFiles,
) -> TransactionValidationResult {
    let mut errors = transaction.structural_errors();
    for operation in &transaction.operations {
        match files.relative(&operation.path) {
            Ok(key) if key.is_empty() => {
                errors.push(format!("Operation path names the config directory itself: {}", operation.path));
            }
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }
    }
    TransactionValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

/// Apply staged operations to the live directory.
///
/// Paths are keyed by their canonical form below the live root. Each file is
/// backed up (or recorded as newly created) on its first touch only, so the metadata always describes the pre-transaction state. On
/// error the metadata gathered so far is returned with it, ready for
/// [`compensate`].
pub fn apply_operations(
    operations: &[TransactionOperation],
    files: &SandboxedFiles,
    backup_dir: &Path,
) -> Result<RollbackMetadata, (ShadeError, RollbackMetadata)> {
    let mut metadata = RollbackMetadata::default();
    for operation in operations {
        if let Err(e) = apply_one(operation, files, backup_dir, &mut metadata) {
            return Err((e, metadata));
        }
    }
    Ok(metadata)
}

fn apply_one(
    operation: &TransactionOperation,
    files: &SandboxedFiles,
    backup_dir: &Path,
    metadata: &mut RollbackMetadata,
) -> Result<(), ShadeError> {
    // one key per live file, whatever spelling was staged
    let key = files.relative(&operation.path)?;
    if key.is_empty() {
        return Err(ShadeError::InvalidArgs(format!(
            "Operation path names the config directory itself: {}",
            operation.path
        )));
    }
    let target = files.root().join(&key);

    if !metadata.has_touched(&key) {
        metadata.touched_paths.push(key.clone());
        if target.exists() {
            copy_preserving_mtime(&target, &backup_dir.join(&key))?;
            metadata.backup_files.push(key.clone());
        } else if operation.op == OpKind::Write {
            metadata.created_files.push(key.clone());
        }
    }

    match operation.op {
        OpKind::Write => {
            let content = operation.content.as_deref().unwrap_or_default();
            files.write(&key, content)?;
        }
        OpKind::Delete => {
            if target.exists() {
                files.delete(&key)?;
            }
        }
    }
    Ok(())
}

/// Undo a partial apply: remove created files, then restore every backup.
/// Individual failures are logged; the pass always runs to the end.
pub fn compensate(files: &SandboxedFiles, backup_dir: &Path, metadata: &RollbackMetadata) {
    for created in &metadata.created_files {
        match files.resolve(created) {
            Ok(target) if target.is_file() => {
                if let Err(e) = fs::remove_file(&target) {
                    warn!("Failed to remove created file {} during compensation: {}", created, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping created file {} during compensation: {}", created, e),
        }
    }

    for backed_up in &metadata.backup_files {
        let backup = backup_dir.join(backed_up.trim_start_matches('/'));
        if !backup.is_file() {
            continue;
        }
        let restored = files
            .resolve(backed_up)
            .and_then(|target| copy_preserving_mtime(&backup, &target).map_err(ShadeError::from));
        match restored {
            Ok(()) => debug!("Restored {} from transaction backup", backed_up),
            Err(e) => warn!("Failed to restore {} during compensation: {}", backed_up, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::TransactionStatus;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, SandboxedFiles, TransactionStore) {
        let dir = tempdir().unwrap();
        let live = dir.path().join("live");
        fs::create_dir_all(&live).unwrap();
        let files = SandboxedFiles::new(&live).unwrap();
        let store = TransactionStore::new(dir.path().join("tx"));
        (dir, files, store)
    }

    #[test]
    fn test_begin_load_save() {
        let (_dir, _files, store) = setup();
        let mut context = Map::new();
        context.insert("reason".into(), Value::from("tidy lights"));

        let mut tx = store.begin(Some(context)).unwrap();
        assert_eq!(tx.transaction_id.len(), 32);
        assert_eq!(tx.status, TransactionStatus::Open);

        tx.stage(TransactionOperation::write("a.yaml", "x: 1")).unwrap();
        store.save(&tx).unwrap();

        let loaded = store.load(&tx.transaction_id).unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(loaded.context["reason"], "tidy lights");
    }

    #[test]
    fn test_unknown_and_malformed_ids() {
        let (_dir, _files, store) = setup();
        assert!(matches!(store.load("deadbeef"), Err(ShadeError::NotFound(_))));
        assert!(matches!(store.load("../../etc/passwd"), Err(ShadeError::NotFound(_))));
    }

    #[test]
    fn test_list_newest_first() {
        let (_dir, _files, store) = setup();
        assert!(store.list().unwrap().is_empty());

        let first = store.begin(None).unwrap();
        let mut second = store.begin(None).unwrap();
        second.updated_at = first.updated_at + chrono::Duration::seconds(5);
        store.save(&second).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].transaction_id, second.transaction_id);
    }

    #[test]
    fn test_validate_reports_escapes() {
        let (_dir, files, _store) = setup();
        let mut tx = TransactionState::new("t1", Map::new());
        tx.operations.push(TransactionOperation::write("../escape.yaml", "x"));

        let result = validate_operations(&tx, &files);
        assert!(!result.valid);
        assert!(result.errors[0].contains("outside"));
    }

    #[test]
    fn test_apply_backs_up_first_touch_only() {
        let (dir, files, _store) = setup();
        let backups = dir.path().join("backups");
        files.write("a.yaml", "original").unwrap();

        let ops = vec![
            TransactionOperation::write("a.yaml", "first"),
            TransactionOperation::write("a.yaml", "second"),
            TransactionOperation::write("new.yaml", "fresh"),
        ];
        let metadata = apply_operations(&ops, &files, &backups).unwrap();

        assert_eq!(metadata.touched_paths, vec!["a.yaml", "new.yaml"]);
        assert_eq!(metadata.backup_files, vec!["a.yaml"]);
        assert_eq!(metadata.created_files, vec!["new.yaml"]);
        assert_eq!(fs::read_to_string(backups.join("a.yaml")).unwrap(), "original");
        assert_eq!(files.read("a.yaml").unwrap(), "second");
    }

    #[test]
    fn test_failed_apply_compensates() {
        let (dir, files, _store) = setup();
        let backups = dir.path().join("backups");
        files.write("a.yaml", "original").unwrap();
        files.write("gone.yaml", "keep me").unwrap();
        fs::create_dir_all(files.root().join("occupied")).unwrap();

        let ops = vec![
            TransactionOperation::write("a.yaml", "changed"),
            TransactionOperation::delete("gone.yaml"),
            TransactionOperation::write("new.yaml", "fresh"),
            // writing over a directory fails
            TransactionOperation::write("occupied", "boom"),
        ];
        let (err, metadata) = apply_operations(&ops, &files, &backups).unwrap_err();
        assert!(matches!(err, ShadeError::Io(_)));

        compensate(&files, &backups, &metadata);

        assert_eq!(files.read("a.yaml").unwrap(), "original");
        assert_eq!(files.read("gone.yaml").unwrap(), "keep me");
        assert!(!files.exists("new.yaml").unwrap());
        assert!(files.root().join("occupied").is_dir());
    }

    #[test]
    fn test_leading_slash_backup_stays_in_backup_dir() {
        let (dir, files, _store) = setup();
        let backups = dir.path().join("backups");
        let name = format!("cfg_{}.yaml", uuid::Uuid::new_v4().simple());
        files.write(&name, "original").unwrap();
        fs::create_dir_all(files.root().join("occupied")).unwrap();

        let ops = vec![
            TransactionOperation::write(format!("/{}", name), "changed"),
            TransactionOperation::write("occupied", "boom"),
        ];
        let (_err, metadata) = apply_operations(&ops, &files, &backups).unwrap_err();

        assert_eq!(metadata.backup_files, vec![name.clone()]);
        assert_eq!(fs::read_to_string(backups.join(&name)).unwrap(), "original");
        assert!(!Path::new("/").join(&name).exists());

        compensate(&files, &backups, &metadata);
        assert_eq!(files.read(&name).unwrap(), "original");
    }

    #[test]
    fn test_aliased_spellings_back_up_once() {
        let (dir, files, _store) = setup();
        let backups = dir.path().join("backups");
        files.write("a.yaml", "original").unwrap();
        fs::create_dir_all(files.root().join("occupied")).unwrap();

        let ops = vec![
            TransactionOperation::write("a.yaml", "first"),
            TransactionOperation::write("./a.yaml", "second"),
            TransactionOperation::write("/a.yaml", "third"),
            TransactionOperation::write("occupied", "boom"),
        ];
        let (_err, metadata) = apply_operations(&ops, &files, &backups).unwrap_err();
        assert_eq!(metadata.touched_paths, vec!["a.yaml", "occupied"]);
        assert_eq!(metadata.backup_files, vec!["a.yaml"]);

        compensate(&files, &backups, &metadata);
        assert_eq!(files.read("a.yaml").unwrap(), "original");
    }

    #[test]
    fn test_root_path_is_rejected() {
        let (dir, files, _store) = setup();
        let mut tx = TransactionState::new("t1", Map::new());
        tx.operations.push(TransactionOperation::write("/", "x"));
        assert!(!validate_operations(&tx, &files).valid);

        let result = apply_operations(&tx.operations, &files, &dir.path().join("backups"));
        assert!(matches!(result, Err((ShadeError::InvalidArgs(_), _))));
    }
}
