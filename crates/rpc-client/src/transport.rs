use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use wallet_core::NetworkError;

use crate::jsonrpc::{RpcRequest, RpcResponse};

/// Delivers one JSON-RPC request to an endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, url: &str, request: &RpcRequest) -> Result<RpcResponse, NetworkError>;
}

/// JSON over HTTPS.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| NetworkError::Unreachable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, url: &str, request: &RpcRequest) -> Result<RpcResponse, NetworkError> {
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        debug!(method = %request.method, %status, "rpc response");
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(NetworkError::RateLimited);
        }
        if status.is_server_error() {
            return Err(NetworkError::Unreachable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(NetworkError::InvalidResponse(format!("HTTP {status}")));
        }

        response.json::<RpcResponse>().await.map_err(classify)
    }
}

fn classify(e: reqwest::Error) -> NetworkError {
    if e.is_timeout() {
        NetworkError::Timeout
    } else if e.is_connect() || e.is_request() {
        NetworkError::Unreachable(e.to_string())
    } else {
        NetworkError::InvalidResponse(e.to_string())
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;

    enum Reply {
        Result(Value),
        NodeError(i64, String),
        Transport(NetworkError),
    }

    /// Replays canned replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        pub requests: Mutex<Vec<(String, RpcRequest)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn push(self, reply: Reply) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        pub fn reply(self, result: Value) -> Self {
            self.push(Reply::Result(result))
        }

        /// A JSON-RPC error object from the node.
        pub fn node_error(self, code: i64, message: &str) -> Self {
            self.push(Reply::NodeError(code, message.to_string()))
        }

        pub fn transport_error(self, error: NetworkError) -> Self {
            self.push(Reply::Transport(error))
        }

        pub fn methods(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| r.method.clone())
                .collect()
        }

        pub fn urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }

        pub fn last_params(&self) -> Value {
            self.requests.lock().unwrap().last().unwrap().1.params.clone()
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn send(&self, url: &str, request: &RpcRequest) -> Result<RpcResponse, NetworkError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), request.clone()));
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Reply::Result(value)) => Ok(RpcResponse::success(request.id, value)),
                Some(Reply::NodeError(code, message)) => {
                    Ok(RpcResponse::failure(request.id, code, message))
                }
                Some(Reply::Transport(error)) => Err(error),
                None => Err(NetworkError::InvalidResponse("script exhausted".into())),
            }
        }
    }
}
