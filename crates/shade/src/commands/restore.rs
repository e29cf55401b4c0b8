//! Rollback and restore commands

use libshade_core::ShadeError;
use crate::cli::Cli;
use crate::context::open_manager;
use crate::output::output_with;

pub fn run_rollback(cli: &Cli, commit: String) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.rollback(&commit)?;
    output_with(cli, result, |out| out.message.clone());
    Ok(())
}

pub fn run_restore(cli: &Cli, commit: Option<String>, patterns: Vec<String>) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.restore_files_from_commit(commit.as_deref(), &patterns)?;
    output_with(cli, result, |out| {
        let mut lines = vec![format!("Restored {} file(s) from {}", out.count, out.commit)];
        lines.extend(out.restored_files.iter().map(|f| format!("  {}", f)));
        lines.join("\n")
    });
    Ok(())
}
