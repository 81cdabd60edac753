//! Configuration management for stdio RPC clients

mod client_config;
mod rpc_config;

pub use client_config::{
    ClientConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KILL_GRACE_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use rpc_config::{CONFIG_FILE_NAME, RpcConfig};
