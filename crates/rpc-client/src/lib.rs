//! # rpc-client
//!
//! JSON-RPC 2.0 implementation of [`wallet_core::NetworkClient`].
//!
//! Requests go through a pluggable [`RpcTransport`] (HTTPS via `reqwest` by
//! default). Transient failures are retried with bounded exponential backoff;
//! node rejections and malformed replies are returned immediately.

pub mod client;
pub mod codec;
pub mod jsonrpc;
pub mod retry;
pub mod transport;

pub use client::JsonRpcClient;
pub use jsonrpc::{RpcErrorObject, RpcRequest, RpcResponse};
pub use retry::{calculate_backoff, RetryPolicy};
pub use transport::{HttpTransport, RpcTransport};
