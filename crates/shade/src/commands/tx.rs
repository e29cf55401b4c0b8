//! Transaction commands

use std::io::Read;
use std::path::Path;

use libshade_core::{ShadeError, TransactionState};
use serde::Serialize;
use serde_json::{Map, Value};
use crate::cli::{Cli, TxCommand};
use crate::context::open_manager;
use crate::output::output_with;

#[derive(Serialize)]
struct TxListOutput {
    transactions: Vec<TransactionState>,
    total: usize,
}

pub fn run(cli: &Cli, cmd: TxCommand) -> Result<(), ShadeError> {
    match cmd {
        TxCommand::Begin { context } => run_begin(cli, context),
        TxCommand::Write { id, path, content, from_file } => {
            let content = match (content, from_file) {
                (Some(content), _) => content,
                (None, Some(file)) => read_content(&file)?,
                (None, None) => read_content(Path::new("-"))?,
            };
            run_write(cli, &id, &path, &content)
        }
        TxCommand::Delete { id, path } => run_delete(cli, &id, &path),
        TxCommand::Validate { id } => run_validate(cli, &id),
        TxCommand::Commit { id, message } => run_commit(cli, &id, message),
        TxCommand::Abort { id } => run_abort(cli, &id),
        TxCommand::Show { id } => run_show(cli, &id),
        TxCommand::List => run_list(cli),
    }
}

fn read_content(file: &Path) -> Result<String, ShadeError> {
    if file == Path::new("-") {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        return Ok(content);
    }
    Ok(std::fs::read_to_string(file)?)
}

fn parse_context(raw: &str) -> Result<Map<String, Value>, ShadeError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ShadeError::InvalidArgs("--context must be a JSON object".to_string())),
        Err(e) => Err(ShadeError::InvalidArgs(format!("invalid --context JSON: {}", e))),
    }
}

fn summary(tx: &TransactionState) -> String {
    format!(
        "Transaction {} [{}] {} operation(s)",
        tx.transaction_id,
        tx.status,
        tx.operations.len()
    )
}

fn run_begin(cli: &Cli, context: Option<String>) -> Result<(), ShadeError> {
    let context = context.as_deref().map(parse_context).transpose()?;
    let mut manager = open_manager(cli)?;
    let tx = manager.begin_transaction(context)?;
    output_with(cli, tx, |tx| tx.transaction_id.clone());
    Ok(())
}

fn run_write(cli: &Cli, id: &str, path: &str, content: &str) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let tx = manager.stage_file_write(id, path, content)?;
    output_with(cli, tx, summary);
    Ok(())
}

fn run_delete(cli: &Cli, id: &str, path: &str) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let tx = manager.stage_file_delete(id, path)?;
    output_with(cli, tx, summary);
    Ok(())
}

fn run_validate(cli: &Cli, id: &str) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.validate_transaction(id)?;
    output_with(cli, result, |out| {
        if out.valid {
            "Transaction is valid".to_string()
        } else {
            let mut lines = vec!["Transaction is invalid:".to_string()];
            lines.extend(out.errors.iter().map(|e| format!("  - {}", e)));
            lines.join("\n")
        }
    });
    Ok(())
}

fn run_commit(cli: &Cli, id: &str, message: Option<String>) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.commit_transaction(id, message.as_deref())?;
    if !result.success {
        return Err(ShadeError::Transaction(format!(
            "Transaction {} is invalid: {}",
            id,
            result.error.unwrap_or_default()
        )));
    }
    output_with(cli, result, |out| match &out.commit_hash {
        Some(hash) => format!("Committed transaction {} as {}", id, hash),
        None => format!("Applied transaction {} (nothing to commit)", id),
    });
    Ok(())
}

fn run_abort(cli: &Cli, id: &str) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let result = manager.abort_transaction(id)?;
    output_with(cli, result, |out| summary(&out.transaction));
    Ok(())
}

fn run_show(cli: &Cli, id: &str) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let tx = manager.get_transaction(id)?;
    output_with(cli, tx, |tx| {
        let mut lines = vec![summary(tx)];
        for op in &tx.operations {
            lines.push(format!("  {:<6} {}", op.op.as_str(), op.path));
        }
        lines.join("\n")
    });
    Ok(())
}

fn run_list(cli: &Cli) -> Result<(), ShadeError> {
    let mut manager = open_manager(cli)?;
    let transactions = manager.list_transactions()?;
    let total = transactions.len();
    output_with(cli, TxListOutput { transactions, total }, |out| {
        if out.transactions.is_empty() {
            return "No transactions".to_string();
        }
        out.transactions.iter().map(summary).collect::<Vec<_>>().join("\n")
    });
    Ok(())
}
