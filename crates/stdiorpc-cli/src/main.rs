//! stdiorpc CLI application
//!
//! Spawns a JSON-RPC server (a language server, a tool server, or anything
//! speaking JSON-RPC 2.0 on stdio), sends one message, and prints the result.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/stdiorpc-cli
//! ```

mod args;
mod commands;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use args::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.json_logs);

    if let Err(e) = commands::route(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays machine-readable.
/// Set RUST_LOG=debug (or pass --log-level) for verbose logging.
fn init_logging(level: Option<&str>, json: bool) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
