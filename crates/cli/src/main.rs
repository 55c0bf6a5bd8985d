// reposync CLI entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;

#[derive(Parser)]
#[command(name = "reposync", about = "Durable offline edit queue for repository clients")]
struct Cli {
    /// Config file (defaults to ~/.reposync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> std::process::ExitCode {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::run(cli.command, cli.config.as_deref()) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => ExitCode::from_error(&error).into(),
    }
}
