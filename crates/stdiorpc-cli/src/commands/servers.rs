//! Server list command

use anyhow::Result;
use colored::Colorize;
use stdiorpc_core::RpcConfig;

/// List configured servers
pub fn list_servers(config: &RpcConfig, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&config.servers)?);
        return Ok(());
    }

    if config.servers.is_empty() {
        println!("No servers configured.");
        if let Some(path) = RpcConfig::default_path() {
            println!("\nAdd [servers.<name>] tables to {}", path.display());
        }
        return Ok(());
    }

    println!("Configured servers:\n");
    for (name, server) in &config.servers {
        let command = std::iter::once(server.command.as_str())
            .chain(server.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  {} ({}) - {}", name.bold(), server.framing, command);

        if !server.env.is_empty() {
            let mut keys: Vec<_> = server.env.keys().map(String::as_str).collect();
            keys.sort_unstable();
            println!("    {} {}", "env:".dimmed(), keys.join(", "));
        }
    }

    Ok(())
}
