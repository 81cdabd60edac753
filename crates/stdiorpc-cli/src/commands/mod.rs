//! Subcommand handlers

mod call;
mod servers;

use crate::args::{Cli, Commands, TargetArgs};
use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use stdiorpc_core::{ClientConfig, FramingMode, RpcConfig};

/// Options shared by every subcommand that talks to a peer
pub struct Overrides<'a> {
    pub config_path: Option<&'a Path>,
    pub framing: Option<FramingMode>,
    pub timeout_ms: Option<u64>,
}

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> Result<()> {
    let overrides = Overrides {
        config_path: cli.config.as_deref(),
        framing: cli.framing,
        timeout_ms: cli.timeout_ms,
    };

    match cli.command {
        Commands::Call {
            method,
            message,
            target,
        } => {
            let config = resolve_target(&target, &overrides)?;
            let params = parse_params(message.params.as_deref())?;
            call::call(config, &method, params, cli.watch_notifications).await
        }
        Commands::Notify {
            method,
            message,
            target,
        } => {
            let config = resolve_target(&target, &overrides)?;
            let params = parse_params(message.params.as_deref())?;
            call::notify(config, &method, params).await
        }
        Commands::Servers { format } => {
            let config = load_config(overrides.config_path)?;
            servers::list_servers(&config, &format)
        }
    }
}

/// Load the servers file from an explicit path or the default location
fn load_config(path: Option<&Path>) -> Result<RpcConfig> {
    match path {
        Some(path) => {
            RpcConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(RpcConfig::load_default()?),
    }
}

/// Build the connection config from `--server` or a trailing command
fn resolve_target(target: &TargetArgs, overrides: &Overrides<'_>) -> Result<ClientConfig> {
    let mut config = match (&target.server, target.program.split_first()) {
        (Some(name), _) => load_config(overrides.config_path)?.server(name)?,
        (None, Some((command, args))) => {
            ClientConfig::new(command.clone(), FramingMode::Newline).with_args(args.iter().cloned())
        }
        (None, None) => bail!("either --server NAME or a command after `--` is required"),
    };

    if let Some(framing) = overrides.framing {
        config.framing = framing;
    }
    if let Some(ms) = overrides.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    config.env.extend(parse_env(&target.env)?);

    config.validate()?;
    Ok(config)
}

/// Parse `KEY=VALUE` pairs
fn parse_env(vars: &[String]) -> Result<HashMap<String, String>> {
    vars.iter()
        .map(|var| {
            var.split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| anyhow!("invalid environment variable '{}', expected KEY=VALUE", var))
        })
        .collect()
}

fn parse_params(params: Option<&str>) -> Result<Option<Value>> {
    params
        .map(|raw| serde_json::from_str(raw).context("--params is not valid JSON"))
        .transpose()
}
