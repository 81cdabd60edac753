//! Named peer configuration loaded from TOML
//!
//! ```toml
//! default_timeout_ms = 60000
//!
//! [servers.rust-analyzer]
//! command = "rust-analyzer"
//! framing = "content-length"
//!
//! [servers.filesystem]
//! command = "npx"
//! args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
//! env = { NODE_ENV = "production" }
//! ```

use super::ClientConfig;
use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up under the user config directory
pub const CONFIG_FILE_NAME: &str = "servers.toml";

/// Collection of named peer configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Request timeout applied to servers that do not set their own
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    /// Servers keyed by name
    #[serde(default)]
    pub servers: BTreeMap<String, ClientConfig>,
}

impl RpcConfig {
    /// Default config path: `<config_dir>/stdiorpc/servers.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stdiorpc").join(CONFIG_FILE_NAME))
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> RpcResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RpcError::config(format!("invalid server config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file
    pub fn load(path: &Path) -> RpcResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RpcError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(path.display().to_string()))
    }

    /// Load from the default location; a missing file yields an empty config
    pub fn load_default() -> RpcResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                debug!("No server config at {}", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(&mut self, other: RpcConfig) {
        if other.default_timeout_ms.is_some() {
            self.default_timeout_ms = other.default_timeout_ms;
        }
        for (name, server) in other.servers {
            self.servers.insert(name, server);
        }
    }

    /// Resolve a server by name, applying the default timeout
    pub fn server(&self, name: &str) -> RpcResult<ClientConfig> {
        let mut config = self
            .servers
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::config(format!("unknown server '{}'", name)))?;
        if config.request_timeout_ms.is_none() {
            config.request_timeout_ms = self.default_timeout_ms;
        }
        Ok(config)
    }

    /// Validate every server entry
    pub fn validate(&self) -> RpcResult<()> {
        if self.default_timeout_ms == Some(0) {
            return Err(RpcError::config("default_timeout_ms must be greater than 0"));
        }
        for (name, server) in &self.servers {
            server
                .validate()
                .map_err(|e| e.with_context(format!("server '{}'", name)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::FramingMode;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r#"
default_timeout_ms = 60000

[servers.rust-analyzer]
command = "rust-analyzer"
framing = "content-length"

[servers.filesystem]
command = "npx"
args = ["-y", "server-filesystem"]
env = { NODE_ENV = "production" }
request_timeout_ms = 5000
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = RpcConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.servers.len(), 2);

        let ra = config.server("rust-analyzer").unwrap();
        assert_eq!(ra.framing, FramingMode::ContentLength);
        assert_eq!(ra.request_timeout(), Duration::from_millis(60_000));

        let fs = config.server("filesystem").unwrap();
        assert_eq!(fs.framing, FramingMode::Newline);
        assert_eq!(fs.request_timeout(), Duration::from_millis(5_000));
        assert_eq!(fs.env.get("NODE_ENV").map(String::as_str), Some("production"));

        assert!(config.server("missing").is_err());
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base = RpcConfig::from_toml_str(SAMPLE).unwrap();
        let other = RpcConfig::from_toml_str(
            r#"
            [servers.filesystem]
            command = "mcp-fs"
            "#,
        )
        .unwrap();

        base.merge(other);
        assert_eq!(base.default_timeout_ms, Some(60_000));
        assert_eq!(base.servers["filesystem"].command, "mcp-fs");
        assert!(base.servers.contains_key("rust-analyzer"));
    }

    #[test]
    fn test_invalid_server_rejected() {
        let err = RpcConfig::from_toml_str(
            r#"
            [servers.broken]
            command = ""
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("command must not be empty"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = RpcConfig::load(file.path()).unwrap();
        assert!(config.servers.contains_key("filesystem"));

        assert!(RpcConfig::load(Path::new("/nonexistent/servers.toml")).is_err());
    }
}
