//! Init command implementation

use libshade_cli::ShadowManager;
use libshade_core::ShadeError;
use serde::Serialize;
use crate::cli::Cli;
use crate::context::resolve_config;
use crate::output::output_with;

#[derive(Serialize)]
struct InitOutput {
    live_root: String,
    shadow_root: String,
    max_backups: usize,
    auto_commit: bool,
    commit_count: usize,
}

pub fn run(cli: &Cli) -> Result<(), ShadeError> {
    let config = resolve_config(cli)?;
    let mut manager = ShadowManager::new(config);
    manager.try_init()?;

    let config = manager.config();
    output_with(
        cli,
        InitOutput {
            live_root: config.live_root.display().to_string(),
            shadow_root: config.shadow_root().display().to_string(),
            max_backups: config.max_backups,
            auto_commit: config.auto_commit,
            commit_count: manager.commit_count(),
        },
        |out| {
            format!(
                "Shadow repository ready at {} ({} commits)",
                out.shadow_root, out.commit_count
            )
        },
    );

    Ok(())
}
