//! `call` and `notify` commands

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;
use stdiorpc_core::{ClientConfig, RpcError, StdioRpcClient};

/// Send one request and print the pretty-printed result to stdout
pub async fn call(
    config: ClientConfig,
    method: &str,
    params: Option<Value>,
    watch_notifications: bool,
) -> Result<()> {
    let client = start(config, watch_notifications).await?;
    let result = client.request(method, params).await;
    client.shutdown().await;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(RpcError::Server {
            code,
            message,
            data,
            ..
        }) => {
            eprintln!("{} {} {}", "✗".red(), code.to_string().red().bold(), message);
            if let Some(data) = data {
                eprintln!("{}", serde_json::to_string_pretty(&data)?.dimmed());
            }
            anyhow::bail!("'{}' failed with code {}", method, code)
        }
        Err(e) => Err(e).with_context(|| format!("'{}' failed", method)),
    }
}

/// Send one notification, then shut the peer down
pub async fn notify(config: ClientConfig, method: &str, params: Option<Value>) -> Result<()> {
    let client = start(config, false).await?;
    client.notify(method, params);
    client.shutdown().await;
    eprintln!("{} sent {}", "✓".green(), method.bold());
    Ok(())
}

async fn start(config: ClientConfig, watch_notifications: bool) -> Result<StdioRpcClient> {
    let command = config.command.clone();
    let mut client = StdioRpcClient::new(config);
    if watch_notifications {
        client = client.with_notification_handler(|method: &str, params: Option<Value>| {
            let params = params.map(|p| p.to_string()).unwrap_or_default();
            eprintln!("{} {} {}", "←".cyan(), method.bold(), params.dimmed());
        });
    }

    client
        .connect()
        .await
        .with_context(|| format!("failed to start '{}'", command))?;
    Ok(client)
}
