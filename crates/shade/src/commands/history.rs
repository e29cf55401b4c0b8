//! Commit, status, diff, log, checkpoint and cleanup commands

use chrono::DateTime;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use libshade_core::{CommitInfo, PendingChanges, ShadeError};
use serde::Serialize;
use crate::cli::Cli;
use crate::context::open_manager;
use crate::output::output_with;

#[derive(Serialize)]
struct CommitOutput {
    committed: bool,
    commit_hash: Option<String>,
}

#[derive(Serialize)]
struct DiffOutput {
    diff: String,
}

#[derive(Serialize)]
struct LogOutput {
    commits: Vec<CommitInfo>,
    total: usize,
}

pub fn run_commit(cli: &Cli, message: Option<String>, force: bool) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let commit_hash = manager.commit_changes(message.as_deref(), false, force);

    output_with(
        cli,
        CommitOutput {
            committed: commit_hash.is_some(),
            commit_hash,
        },
        |out| match &out.commit_hash {
            Some(hash) => format!("Committed {}", hash),
            None => "Nothing committed".to_string(),
        },
    );
    Ok(())
}

pub fn run_status(cli: &Cli) -> Result<(), ShadeError> {
    let manager = open_manager(cli)?;
    let pending = manager.get_pending_changes();
    if let Some(error) = &pending.error {
        return Err(ShadeError::Vcs(error.clone()));
    }
    output_with(cli, pending, format_status);
    Ok(())
}

fn format_status(pending: &PendingChanges) -> String {
    if !pending.has_changes {
        return "No pending changes".to_string();
    }
    let mut lines = vec![format!("{} pending change(s):", pending.summary.total)];
    let groups = [
        ("modified", &pending.files_modified),
        ("added", &pending.files_added),
        ("deleted", &pending.files_deleted),
    ];
    for (label, paths) in groups {
        for path in paths.iter() {
            lines.push(format!("  {:<9} {}", label, path));
        }
    }
    lines.join("\n")
}

pub fn run_diff(cli: &Cli, from: Option<String>, to: Option<String>) -> Result<(), ShadeError> {
    let manager = open_manager(cli)?;
    let diff = manager.get_diff(from.as_deref(), to.as_deref());
    output_with(cli, DiffOutput { diff }, |out| out.diff.trim_end().to_string());
    Ok(())
}

pub fn run_log(cli: &Cli, limit: usize) -> Result<(), ShadeError> {
    let manager = open_manager(cli)?;
    let commits = manager.get_history(limit);
    let total = commits.len();
    output_with(cli, LogOutput { commits, total }, |out| format_log(&out.commits));
    Ok(())
}

fn format_log(commits: &[CommitInfo]) -> String {
    if commits.is_empty() {
        return "No commits yet".to_string();
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Hash", "Date", "Message"]);
    for commit in commits {
        let date = DateTime::parse_from_rfc3339(&commit.date)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| commit.date.clone());
        table.add_row(vec![commit.hash.clone(), date, commit.message.clone()]);
    }
    table.to_string()
}

pub fn run_checkpoint(cli: &Cli, description: String) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.create_checkpoint(&description);
    if !result.success {
        return Err(ShadeError::Vcs(result.message));
    }
    output_with(cli, result, |out| match &out.commit_hash {
        Some(hash) => format!("{} at {}", out.message, hash),
        None => format!("{} (no commits yet)", out.message),
    });
    Ok(())
}

pub fn run_cleanup(cli: &Cli) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.cleanup_commits();
    if !result.success {
        return Err(ShadeError::Vcs(result.message));
    }
    output_with(cli, result, |out| out.message.clone());
    Ok(())
}
