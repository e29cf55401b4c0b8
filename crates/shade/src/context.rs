use std::path::PathBuf;

use libshade_cli::ShadowManager;
use libshade_core::{load_config, ShadeConfig, ShadeError};
use tracing::debug;
use crate::cli::Cli;

/// Settings for this invocation: config file first, then flags on top
pub fn resolve_config(cli: &Cli) -> Result<ShadeConfig, ShadeError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?.ok_or_else(|| {
            ShadeError::NotFound(format!("config file {}", path.display()))
        })?,
        None => ShadeConfig::new(current_dir()?),
    };

    if let Some(dir) = &cli.dir {
        config.live_root = dir.clone();
    }
    if let Some(name) = &cli.shadow_dir {
        config.shadow_dir_name = name.clone();
    }
    if let Some(max) = cli.max_backups {
        config.max_backups = max;
    }
    if cli.no_auto_commit {
        config.auto_commit = false;
    }

    config.validate()?;
    debug!(
        live_root = %config.live_root.display(),
        shadow_dir = %config.shadow_dir_name,
        max_backups = config.max_backups,
        auto_commit = config.auto_commit,
        "resolved config"
    );
    if !config.live_root.is_dir() {
        return Err(ShadeError::NotFound(format!(
            "live directory {}",
            config.live_root.display()
        )));
    }
    Ok(config)
}

fn current_dir() -> Result<PathBuf, ShadeError> {
    Ok(std::env::current_dir()?)
}

/// Manager over an existing shadow repository.
///
/// Commands other than `init` never create one implicitly.
pub fn open_manager(cli: &Cli) -> Result<ShadowManager, ShadeError> {
    let config = resolve_config(cli)?;
    let shadow_root = config.shadow_root();
    if !shadow_root.join(".git").is_dir() {
        return Err(ShadeError::NotInitialized(format!(
            "no shadow repository at {}",
            shadow_root.display()
        )));
    }

    let mut manager = ShadowManager::new(config);
    manager.try_init()?;
    Ok(manager)
}
