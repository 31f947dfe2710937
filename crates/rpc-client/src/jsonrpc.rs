//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wallet_core::NetworkError;

/// Methods whose node-side errors mean the transaction itself was refused.
const REJECTING_METHODS: &[&str] = &["eth_sendRawTransaction", "eth_estimateGas", "eth_call"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn into_network_error(self, method: &str) -> NetworkError {
        let lowered = self.message.to_ascii_lowercase();
        if self.code == 429
            || self.code == -32005
            || lowered.contains("rate limit")
            || lowered.contains("too many requests")
        {
            return NetworkError::RateLimited;
        }
        if REJECTING_METHODS.contains(&method) {
            return NetworkError::TransactionFailed(self.message);
        }
        NetworkError::InvalidResponse(format!("{method}: {} (code {})", self.message, self.code))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id: Value::from(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: Value::from(id),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// The `result` member, `Null` when the node returned none.
    pub fn into_result(self, method: &str) -> Result<Value, NetworkError> {
        match self.error {
            Some(error) => Err(error.into_network_error(method)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_serializes_as_jsonrpc_2() {
        let request = RpcRequest::new(7, "eth_blockNumber", json!([]));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "method": "eth_blockNumber", "params": []})
        );
    }

    #[test]
    fn null_result_is_kept() {
        let response: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(response.into_result("eth_getTransactionReceipt").unwrap(), Value::Null);
    }

    #[test]
    fn node_errors_are_classified() {
        let revert = RpcResponse::failure(1, -32000, "execution reverted");
        assert_eq!(
            revert.into_result("eth_estimateGas"),
            Err(NetworkError::TransactionFailed("execution reverted".into()))
        );

        let limited = RpcResponse::failure(1, -32005, "limit exceeded");
        assert_eq!(limited.into_result("eth_getBalance"), Err(NetworkError::RateLimited));

        let other = RpcResponse::failure(1, -32000, "header not found");
        assert!(matches!(
            other.into_result("eth_getBalance"),
            Err(NetworkError::InvalidResponse(msg)) if msg.contains("header not found")
        ));
    }
}
