//! ## spanare-cli
//! **Operational entrypoint**
//!
//! `spanare run` polls the configured endpoints and writes every observation
//! to stdout as one JSON object per line; logs go to stderr. `spanare check`
//! validates a configuration without polling anything.

use clap::Parser;

mod commands;
mod error;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
