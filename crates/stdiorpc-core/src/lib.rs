//! Stdiorpc Core Library
//!
//! JSON-RPC 2.0 over a child process's stdin/stdout. This crate provides
//! stream framing (newline and `Content-Length`), request/response
//! correlation with timeouts, and supervision of the peer process.

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod protocol;

// Re-export commonly used types
pub use client::{
    ConnectionState, IdStrategy, LoggingNotificationHandler, LoggingStderrHandler,
    NotificationHandler, StderrHandler, StdioRpcClient,
};
pub use config::{ClientConfig, RpcConfig};
pub use error::{RpcError, RpcResult, UnifiedError};
pub use framing::{FrameDecoder, FramingMode, decode_frames, encode_frame};
pub use protocol::{JsonRpcError, RequestId, RpcMessage, RpcNotification, RpcRequest, RpcResponse};
