use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ShadeError;

/// Default name of the shadow directory inside the live directory
pub const DEFAULT_SHADOW_DIR: &str = "shade_git";

/// Default number of commits kept before history is truncated
pub const DEFAULT_MAX_BACKUPS: usize = 30;

/// Settings for one shadow repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeConfig {
    /// Live directory being versioned
    pub live_root: PathBuf,
    /// Name of the shadow directory, created directly under `live_root`
    #[serde(default = "default_shadow_dir")]
    pub shadow_dir_name: String,
    /// Commit count at which history truncation kicks in
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Commit automatically when changes are found; `force` overrides `false`
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
}

fn default_shadow_dir() -> String {
    DEFAULT_SHADOW_DIR.to_string()
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn default_auto_commit() -> bool {
    true
}

impl ShadeConfig {
    /// Config for `live_root` with every other field at its default
    pub fn new(live_root: impl Into<PathBuf>) -> Self {
        Self {
            live_root: live_root.into(),
            shadow_dir_name: default_shadow_dir(),
            max_backups: default_max_backups(),
            auto_commit: default_auto_commit(),
        }
    }

    pub fn with_shadow_dir_name(mut self, name: impl Into<String>) -> Self {
        self.shadow_dir_name = name.into();
        self
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    /// Check the values before anything touches the disk
    pub fn validate(&self) -> Result<(), ShadeError> {
        if self.max_backups == 0 {
            return Err(ShadeError::InvalidArgs("max_backups must be at least 1".to_string()));
        }
        let name = self.shadow_dir_name.as_str();
        if name.is_empty() || name == "." || name == ".." {
            return Err(ShadeError::InvalidArgs(format!(
                "invalid shadow directory name: '{}'",
                name
            )));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(ShadeError::InvalidArgs(format!(
                "shadow directory name must be a single path segment: '{}'",
                name
            )));
        }
        if name == ".git" || name == crate::sync::EXPORT_DIR {
            return Err(ShadeError::InvalidArgs(format!(
                "shadow directory name '{}' is reserved",
                name
            )));
        }
        Ok(())
    }

    /// Absolute location of the shadow directory
    pub fn shadow_root(&self) -> PathBuf {
        self.live_root.join(&self.shadow_dir_name)
    }
}

/// Load a config file, `None` if it does not exist
pub fn load_config(path: &Path) -> Result<Option<ShadeConfig>, ShadeError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let config: ShadeConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(Some(config))
}

/// Save a config file, creating parent directories
pub fn save_config(path: &Path, config: &ShadeConfig) -> Result<(), ShadeError> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("shade.toml");

        let config = ShadeConfig::new("/srv/config")
            .with_max_backups(12)
            .with_auto_commit(false)
            .with_shadow_dir_name("history");

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap().unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).unwrap().is_none());
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shade.toml");
        std::fs::write(&path, "live_root = \"/srv/config\"\n").unwrap();

        let loaded = load_config(&path).unwrap().unwrap();
        assert_eq!(loaded.shadow_dir_name, DEFAULT_SHADOW_DIR);
        assert_eq!(loaded.max_backups, DEFAULT_MAX_BACKUPS);
        assert!(loaded.auto_commit);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ShadeConfig::new("/c").with_max_backups(0).validate().is_err());
        assert!(ShadeConfig::new("/c").with_shadow_dir_name("").validate().is_err());
        assert!(ShadeConfig::new("/c").with_shadow_dir_name("a/b").validate().is_err());
        assert!(ShadeConfig::new("/c").with_shadow_dir_name(".git").validate().is_err());
        assert!(ShadeConfig::new("/c").with_shadow_dir_name("export").validate().is_err());
        assert!(ShadeConfig::new("/c").validate().is_ok());
    }

    #[test]
    fn test_shadow_root_is_under_live_root() {
        let config = ShadeConfig::new("/srv/config");
        assert_eq!(config.shadow_root(), PathBuf::from("/srv/config").join(DEFAULT_SHADOW_DIR));
    }
}
