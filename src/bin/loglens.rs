//! LogLens++ CLI entry point.

use clap::Parser;
use colored::Colorize;
use loglens::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli::run(cli) {
        eprintln!("{} {e}", "error:".red());
        std::process::exit(1);
    }
}
