mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable with --json
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Command::Init => commands::init::run(&cli),
        Command::Commit { message, force } => commands::history::run_commit(&cli, message.clone(), *force),
        Command::Status => commands::history::run_status(&cli),
        Command::Diff { from, to } => commands::history::run_diff(&cli, from.clone(), to.clone()),
        Command::Log { limit } => commands::history::run_log(&cli, *limit),
        Command::Checkpoint { description } => commands::history::run_checkpoint(&cli, description.clone()),
        Command::Rollback { commit } => commands::restore::run_rollback(&cli, commit.clone()),
        Command::Restore { commit, patterns } => {
            commands::restore::run_restore(&cli, commit.clone(), patterns.clone())
        }
        Command::Cleanup => commands::history::run_cleanup(&cli),
        Command::Tx { cmd } => commands::tx::run(&cli, cmd.clone()),
    };

    if let Err(e) = result {
        output::output_error(&cli, &e);
        std::process::exit(e.exit_code());
    }
}
