//! ron
//!
//! A make-like task runner: shell targets with before/after hooks, read from
//! cascading YAML files, run locally or across remote hosts.

use clap::Parser;
use ron_runner::cli::{Cli, Command, target};
use ron_runner::execute::{CancelToken, spawn_signal_listener};
use ron_runner::format::red;
use ron_runner::logging::{self, LogTarget};
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    logging::init(&LogTarget::parse(&cli.log), &cli.log_level)?;

    let cancel = CancelToken::new();
    let listener = spawn_signal_listener(cancel.clone());

    let result = match &cli.command {
        Command::Target(args) => target::run(args, cancel).await,
    };
    listener.abort();

    if let Err(e) = result {
        debug!(code = %e.code(), "run failed");
        eprintln!("{}", red(&e.to_string()));
        std::process::exit(e.exit_status());
    }
    Ok(())
}
