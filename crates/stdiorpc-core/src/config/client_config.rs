//! Per-connection client configuration

use crate::client::IdStrategy;
use crate::error::{RpcError, RpcResult};
use crate::framing::FramingMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default request timeout (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default connect timeout (30 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Delay between the graceful termination signal and the forced kill
pub const DEFAULT_KILL_GRACE_MS: u64 = 1_000;

fn default_framing() -> FramingMode {
    FramingMode::Newline
}

/// Connection parameters for one peer process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Executable path or name (`~` and `$VAR` are expanded at spawn)
    pub command: String,
    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides, merged over the ambient environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Wire framing
    #[serde(default = "default_framing")]
    pub framing: FramingMode,
    /// Id policy; derived from the framing when unset
    #[serde(default)]
    pub id_strategy: Option<IdStrategy>,
    /// Per-request timeout in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Grace period before a forced kill on disconnect, in milliseconds
    #[serde(default)]
    pub kill_grace_ms: Option<u64>,
    /// How long the child must stay alive before the connection counts as
    /// established, in milliseconds
    #[serde(default)]
    pub startup_grace_ms: Option<u64>,
}

impl ClientConfig {
    /// Create a config for `command` using the given framing
    pub fn new(command: impl Into<String>, framing: FramingMode) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            framing,
            id_strategy: None,
            request_timeout_ms: None,
            connect_timeout_ms: None,
            kill_grace_ms: None,
            startup_grace_ms: None,
        }
    }

    /// Set command arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Override the id policy
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = Some(strategy);
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set kill grace period
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace_ms = Some(grace.as_millis() as u64);
        self
    }

    /// Require the child to survive `grace` before connecting succeeds
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace_ms = Some(grace.as_millis() as u64);
        self
    }

    /// Effective request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(
            self.request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }

    /// Effective connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(
            self.connect_timeout_ms
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        )
    }

    /// Effective kill grace period
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms.unwrap_or(DEFAULT_KILL_GRACE_MS))
    }

    /// Effective startup grace; zero only yields once before the exit check
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms.unwrap_or(0))
    }

    /// Effective id policy
    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
            .unwrap_or_else(|| IdStrategy::for_framing(self.framing))
    }

    /// Command with `~` and environment variables expanded
    pub fn resolved_command(&self) -> RpcResult<String> {
        shellexpand::full(&self.command)
            .map(|expanded| expanded.into_owned())
            .map_err(|e| {
                RpcError::config(format!("cannot expand command '{}': {}", self.command, e))
            })
    }

    /// Check the config is usable
    pub fn validate(&self) -> RpcResult<()> {
        if self.command.trim().is_empty() {
            return Err(RpcError::config("command must not be empty"));
        }
        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(RpcError::config(format!("{} must be greater than 0", name)));
            }
        }
        if self.env.keys().any(|k| k.is_empty() || k.contains('=')) {
            return Err(RpcError::config(
                "environment variable names must be non-empty and contain no '='",
            ));
        }
        Ok(())
    }
}
