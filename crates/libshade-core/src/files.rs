//! Sandboxed file access rooted at the live directory
//!
//! Every path handed in is relative to the root. Anything that resolves
//! outside the root, lexically or through a symlink, is a
//! [`ShadeError::PathSecurity`] and is never swallowed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use glob::Pattern;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ShadeError;

/// Metadata for one listed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the sandbox root, forward slashes
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Modification time as seconds since the Unix epoch
    pub modified: f64,
    pub is_yaml: bool,
}

/// File operations confined to one directory tree
#[derive(Debug, Clone)]
pub struct SandboxedFiles {
    root: PathBuf,
}

impl SandboxedFiles {
    /// Sandbox rooted at `root`, which must exist
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ShadeError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ShadeError::NotFound(format!("directory does not exist: {}", root.display()))
            }
            _ => ShadeError::Io(e),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `rel_path`, guaranteed to stay inside the root.
    ///
    /// A leading `/` is treated as relative; `""` and `"/"` name the root.
    pub fn resolve(&self, rel_path: &str) -> Result<PathBuf, ShadeError> {
        let trimmed = rel_path.trim_start_matches(['/', '\\']);
        if trimmed.is_empty() {
            return Ok(self.root.clone());
        }

        let mut resolved = self.root.clone();
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(escape_error(rel_path));
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape_error(rel_path)),
            }
        }
        if !resolved.starts_with(&self.root) {
            return Err(escape_error(rel_path));
        }

        // symlinks: canonicalize the deepest ancestor that exists
        let mut existing = resolved.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }
        let mut real = fs::canonicalize(existing)?;
        for name in tail.into_iter().rev() {
            real.push(name);
        }
        if !real.starts_with(&self.root) {
            return Err(escape_error(rel_path));
        }
        Ok(real)
    }

    /// Canonical forward-slash form of `rel_path` below the root.
    ///
    /// Every spelling of one file (`a.yaml`, `./a.yaml`, `/a.yaml`) maps to
    /// the same key. The root itself is `""`.
    pub fn relative(&self, rel_path: &str) -> Result<String, ShadeError> {
        let resolved = self.resolve(rel_path)?;
        let rel = resolved
            .strip_prefix(&self.root)
            .map_err(|_| escape_error(rel_path))?;
        Ok(forward_slashes(rel))
    }

    /// Whether `rel_path` exists as a regular file
    pub fn exists(&self, rel_path: &str) -> Result<bool, ShadeError> {
        Ok(self.resolve(rel_path)?.is_file())
    }

    pub fn read(&self, rel_path: &str) -> Result<String, ShadeError> {
        let path = self.resolve(rel_path)?;
        if !path.is_file() {
            return Err(ShadeError::NotFound(format!("File not found: {}", rel_path)));
        }
        let content = fs::read_to_string(&path)?;
        debug!("Read file: {} ({} bytes)", rel_path, content.len());
        Ok(content)
    }

    /// Write `content`, creating parent directories. Returns bytes written.
    pub fn write(&self, rel_path: &str, content: &str) -> Result<usize, ShadeError> {
        let path = self.resolve(rel_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        info!("Wrote file: {} ({} bytes)", rel_path, content.len());
        Ok(content.len())
    }

    /// Append `content` on a new line, creating the file if needed.
    /// Returns the total size afterwards.
    pub fn append(&self, rel_path: &str, content: &str) -> Result<usize, ShadeError> {
        let path = self.resolve(rel_path)?;
        let existing = match fs::read_to_string(&path) {
            Ok(existing) => existing,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let updated = if existing.is_empty() {
            content.to_string()
        } else {
            format!("{}\n{}", existing, content)
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &updated)?;
        info!("Appended to file: {} ({} bytes)", rel_path, content.len());
        Ok(updated.len())
    }

    pub fn delete(&self, rel_path: &str) -> Result<(), ShadeError> {
        let path = self.resolve(rel_path)?;
        if !path.is_file() {
            return Err(ShadeError::NotFound(format!("File not found: {}", rel_path)));
        }
        fs::remove_file(&path)?;
        info!("Deleted file: {}", rel_path);
        Ok(())
    }

    /// Files below `dir` whose name matches `pattern`, sorted by path.
    ///
    /// Patterns containing `/` are matched against the path relative to
    /// `dir` instead of the file name. A missing directory lists nothing.
    pub fn list(&self, dir: &str, pattern: &str) -> Result<Vec<FileEntry>, ShadeError> {
        let dir_path = self.resolve(dir)?;
        if !dir_path.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = Pattern::new(pattern)
            .map_err(|e| ShadeError::InvalidArgs(format!("invalid pattern '{}': {}", pattern, e)))?;
        let match_path = pattern.as_str().contains('/');

        let mut entries = Vec::new();
        let walker = WalkBuilder::new(&dir_path)
            .standard_filters(false)
            .follow_links(false)
            .build();
        for result in walker {
            let entry = result.map_err(|e| ShadeError::Internal(e.to_string()))?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let subject = if match_path {
                forward_slashes(path.strip_prefix(&dir_path).unwrap_or(path))
            } else {
                name.clone()
            };
            if !pattern.matches(&subject) {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| ShadeError::Internal(e.to_string()))?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            entries.push(FileEntry {
                path: forward_slashes(path.strip_prefix(&self.root).unwrap_or(path)),
                name,
                size: metadata.len(),
                modified,
                is_yaml,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

fn escape_error(rel_path: &str) -> ShadeError {
    ShadeError::PathSecurity(format!("Path outside config directory: {}", rel_path))
}

fn forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
