//! CLI argument definitions using clap
//!
//! - stdiorpc call <method> --server NAME            # Named server from config
//! - stdiorpc call <method> -- CMD [ARGS...]         # Ad-hoc command
//! - stdiorpc notify <method> --params '{..}' -- CMD # Fire-and-forget
//! - stdiorpc servers                                # List configured servers

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stdiorpc_core::FramingMode;

#[derive(Parser, Debug)]
#[command(name = "stdiorpc")]
#[command(about = "Talk JSON-RPC 2.0 to a child process over stdio")]
#[command(version)]
pub struct Cli {
    /// Path to the servers file (TOML)
    #[arg(long, global = true, env = "STDIORPC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Wire framing: newline or content-length
    #[arg(long, global = true)]
    pub framing: Option<FramingMode>,

    /// Request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Log filter, e.g. "debug" or "stdiorpc_core=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Print peer notifications to stderr while waiting
    #[arg(long, global = true)]
    pub watch_notifications: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a request and print its result
    Call {
        /// Method name
        method: String,

        #[command(flatten)]
        message: MessageArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Send a notification
    Notify {
        /// Method name
        method: String,

        #[command(flatten)]
        message: MessageArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// List configured servers
    Servers {
        /// Output format: "text" or "json"
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// Message body
#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// Params as a JSON value
    #[arg(short, long)]
    pub params: Option<String>,
}

/// Which process to talk to
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Named server from the servers file
    #[arg(short, long, conflicts_with = "program")]
    pub server: Option<String>,

    /// Environment variables (KEY=VALUE format)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Command and arguments to spawn, after `--`
    #[arg(last = true, value_name = "CMD")]
    pub program: Vec<String>,
}
