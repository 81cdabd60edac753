//! Error types for the stdio JSON-RPC client
//!
//! All failures surface as [`RpcError`]. Every variant is local to the
//! operation that produced it; nothing here is fatal to the host process.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for client operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Unified error trait implemented by client errors.
///
/// Provides consistent fields for programmatic handling:
/// - error_code(): Unique code for programmatic error identification
/// - message(): Human-readable error message
/// - context(): Optional additional context
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if this error is retryable
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Client errors
#[derive(Debug, Error, Clone)]
pub enum RpcError {
    /// Spawning or starting the peer process failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        context: Option<String>,
    },

    /// `connect()` called on a client that is connecting or connected
    #[error("Client already connected")]
    AlreadyConnected,

    /// Operation requires a live connection
    #[error("Client not connected")]
    NotConnected,

    /// The connection went away while the request was pending
    #[error("Disconnected: {reason}")]
    Disconnected { reason: String },

    /// Connect did not complete in time
    #[error("Connect timed out after {millis}ms")]
    ConnectTimeout { millis: u64 },

    /// A request exceeded its deadline
    #[error("Request '{method}' timed out after {millis}ms")]
    Timeout {
        method: String,
        millis: u64,
        context: Option<String>,
    },

    /// The peer answered with a JSON-RPC error object
    #[error("Server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
        context: Option<String>,
    },

    /// Inbound payload is not a valid JSON-RPC message
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        context: Option<String>,
    },

    /// Writing to or reading from the child failed
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        context: Option<String>,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        context: Option<String>,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },
}

impl RpcError {
    /// Create a new Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new Disconnected error
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    /// Create a new Timeout error for the given method
    pub fn timeout(method: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            method: method.into(),
            millis,
            context: None,
        }
    }

    /// Create a new Server error
    pub fn server(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Server {
            code,
            message: message.into(),
            data,
            context: None,
        }
    }

    /// Create a new Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Add context to any error that carries it
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = Some(context.into());
        match &mut self {
            Self::Connection { context: c, .. } => *c = ctx,
            Self::Timeout { context: c, .. } => *c = ctx,
            Self::Server { context: c, .. } => *c = ctx,
            Self::Protocol { context: c, .. } => *c = ctx,
            Self::Transport { context: c, .. } => *c = ctx,
            Self::Serialization { context: c, .. } => *c = ctx,
            Self::Config { context: c, .. } => *c = ctx,
            Self::AlreadyConnected
            | Self::NotConnected
            | Self::Disconnected { .. }
            | Self::ConnectTimeout { .. } => {}
        }
        self
    }

    /// Whether this error came from the connection going away
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::NotConnected)
    }

    /// Whether this error is a per-request or connect timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ConnectTimeout { .. })
    }
}

impl UnifiedError for RpcError {
    fn error_code(&self) -> &str {
        match self {
            Self::Connection { .. } => "RPC_CONNECTION",
            Self::AlreadyConnected => "RPC_ALREADY_CONNECTED",
            Self::NotConnected => "RPC_NOT_CONNECTED",
            Self::Disconnected { .. } => "RPC_DISCONNECTED",
            Self::ConnectTimeout { .. } => "RPC_CONNECT_TIMEOUT",
            Self::Timeout { .. } => "RPC_TIMEOUT",
            Self::Server { .. } => "RPC_SERVER",
            Self::Protocol { .. } => "RPC_PROTOCOL",
            Self::Transport { .. } => "RPC_TRANSPORT",
            Self::Serialization { .. } => "RPC_SERIALIZATION",
            Self::Config { .. } => "RPC_CONFIG",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Connection { message, .. } => message,
            Self::AlreadyConnected => "Client already connected",
            Self::NotConnected => "Client not connected",
            Self::Disconnected { reason } => reason,
            Self::ConnectTimeout { .. } => "Connect timeout",
            Self::Timeout { .. } => "Request timeout",
            Self::Server { message, .. } => message,
            Self::Protocol { message, .. } => message,
            Self::Transport { message, .. } => message,
            Self::Serialization { message, .. } => message,
            Self::Config { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Connection { context, .. } => context.as_deref(),
            Self::Timeout { context, .. } => context.as_deref(),
            Self::Server { context, .. } => context.as_deref(),
            Self::Protocol { context, .. } => context.as_deref(),
            Self::Transport { context, .. } => context.as_deref(),
            Self::Serialization { context, .. } => context.as_deref(),
            Self::Config { context, .. } => context.as_deref(),
            Self::AlreadyConnected
            | Self::NotConnected
            | Self::Disconnected { .. }
            | Self::ConnectTimeout { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectTimeout { .. } | Self::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_names_method() {
        let err = RpcError::timeout("textDocument/references", 30_000);
        assert_eq!(
            err.to_string(),
            "Request 'textDocument/references' timed out after 30000ms"
        );
        assert!(err.is_timeout());
        assert_eq!(err.error_code(), "RPC_TIMEOUT");
    }

    #[test]
    fn test_server_error_preserves_code_and_data() {
        let err = RpcError::server(-32601, "Method not found", Some(serde_json::json!("x")));
        assert_eq!(err.to_string(), "Server error -32601: Method not found");
        match err {
            RpcError::Server { code, data, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(data, Some(serde_json::json!("x")));
            }
            _ => panic!("Expected Server error"),
        }
    }

    #[test]
    fn test_with_context() {
        let err = RpcError::connection("spawn failed").with_context("server 'rust-analyzer'");
        assert_eq!(err.context(), Some("server 'rust-analyzer'"));
        assert_eq!(err.message(), "spawn failed");

        // Unit-like variants ignore context
        let err = RpcError::NotConnected.with_context("ignored");
        assert_eq!(err.context(), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RpcError::connection("x").is_retryable());
        assert!(RpcError::timeout("m", 1).is_retryable());
        assert!(!RpcError::server(-1, "x", None).is_retryable());
        assert!(!RpcError::disconnected("gone").is_retryable());
        assert!(RpcError::disconnected("gone").is_disconnected());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: RpcError = io.into();
        assert!(matches!(err, RpcError::Transport { .. }));
    }
}
