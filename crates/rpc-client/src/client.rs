use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, debug_span, Instrument};
use wallet_core::client::{FeeHistory, NetworkClient, Page, TransactionInfo};
use wallet_core::config::{RetrySettings, RpcSettings};
use wallet_core::{Network, NetworkError, Receipt, SignedTransaction, Transaction};

use crate::codec::{
    call_object, data_hex, parse_data, parse_u128, parse_u256, parse_u64, quantity, RawBlock,
    RawFeeHistory, RawReceipt, RawTransaction,
};
use crate::jsonrpc::RpcRequest;
use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, RpcTransport};

/// Percentiles requested from `eth_feeHistory`. Only the first feeds the
/// priority-fee suggestion.
pub const REWARD_PERCENTILES: [f64; 3] = [50.0, 25.0, 75.0];

/// Upper bound on blocks fetched for one history page.
pub const MAX_HISTORY_BLOCKS: u32 = 100;

/// [`NetworkClient`] over JSON-RPC.
///
/// The endpoint is the network's own `rpc_url` unless an override is
/// registered for its chain id.
pub struct JsonRpcClient {
    transport: Arc<dyn RpcTransport>,
    retry: RetryPolicy,
    overrides: HashMap<u64, String>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            overrides: HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// HTTPS client configured from the `[rpc]` and `[retry]` tables.
    pub fn http(rpc: &RpcSettings, retry: &RetrySettings) -> Result<Self, NetworkError> {
        let transport = HttpTransport::new(rpc.timeout())?;
        let client = rpc.overrides.iter().fold(
            Self::new(Arc::new(transport)).with_retry((*retry).into()),
            |client, o| client.with_override(o.chain_id, o.url.clone()),
        );
        Ok(client)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_override(mut self, chain_id: u64, url: impl Into<String>) -> Self {
        self.overrides.insert(chain_id, url.into());
        self
    }

    pub fn endpoint<'a>(&'a self, network: &'a Network) -> &'a str {
        self.overrides
            .get(&network.chain_id)
            .map(String::as_str)
            .unwrap_or(&network.rpc_url)
    }

    /// `eth_chainId` as reported by the endpoint.
    pub async fn chain_id(&self, network: &Network) -> Result<u64, NetworkError> {
        let raw: String = self.request(network, "eth_chainId", json!([])).await?;
        parse_u64(&raw)
    }

    /// Fails with `UnsupportedChain` when the endpoint serves another chain.
    pub async fn verify_chain(&self, network: &Network) -> Result<(), NetworkError> {
        let served = self.chain_id(network).await?;
        if served != network.chain_id {
            return Err(NetworkError::UnsupportedChain(served));
        }
        Ok(())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        network: &Network,
        method: &'static str,
        params: Value,
    ) -> Result<T, NetworkError> {
        let url = self.endpoint(network);
        let transport = &self.transport;
        let ids = &self.next_id;
        let params = &params;

        let span = debug_span!("rpc", method, chain_id = network.chain_id);
        async move {
            let value = self
                .retry
                .run(method, || {
                    let request =
                        RpcRequest::new(ids.fetch_add(1, Ordering::Relaxed), method, params.clone());
                    async move { transport.send(url, &request).await?.into_result(method) }
                })
                .await?;
            serde_json::from_value(value)
                .map_err(|e| NetworkError::InvalidResponse(format!("{method}: {e}")))
        }
        .instrument(span)
        .await
    }

    async fn transaction_count(
        &self,
        address: &str,
        network: &Network,
        tag: &str,
    ) -> Result<u64, NetworkError> {
        let raw: String = self
            .request(network, "eth_getTransactionCount", json!([address, tag]))
            .await?;
        parse_u64(&raw)
    }
}

#[async_trait]
impl NetworkClient for JsonRpcClient {
    async fn get_balance(&self, address: &str, network: &Network) -> Result<U256, NetworkError> {
        let raw: String = self
            .request(network, "eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_u256(&raw)
    }

    async fn get_nonce(&self, address: &str, network: &Network) -> Result<u64, NetworkError> {
        self.transaction_count(address, network, "pending").await
    }

    async fn get_confirmed_nonce(
        &self,
        address: &str,
        network: &Network,
    ) -> Result<u64, NetworkError> {
        self.transaction_count(address, network, "latest").await
    }

    async fn estimate_gas(&self, tx: &Transaction, network: &Network) -> Result<u64, NetworkError> {
        let raw: String = self
            .request(network, "eth_estimateGas", json!([call_object(tx)?]))
            .await?;
        parse_u64(&raw)
    }

    async fn get_gas_price(&self, network: &Network) -> Result<u128, NetworkError> {
        let raw: String = self.request(network, "eth_gasPrice", json!([])).await?;
        parse_u128(&raw)
    }

    async fn get_fee_history(
        &self,
        network: &Network,
        block_count: u64,
    ) -> Result<FeeHistory, NetworkError> {
        let raw: RawFeeHistory = self
            .request(
                network,
                "eth_feeHistory",
                json!([quantity(block_count), "latest", REWARD_PERCENTILES]),
            )
            .await?;
        raw.decode()
    }

    async fn broadcast(
        &self,
        signed: &SignedTransaction,
        network: &Network,
    ) -> Result<String, NetworkError> {
        let result: Result<String, NetworkError> = self
            .request(network, "eth_sendRawTransaction", json!([signed.raw_hex()]))
            .await;
        match result {
            // A retried submission the node already accepted on a prior attempt.
            Err(NetworkError::TransactionFailed(message))
                if message.to_ascii_lowercase().contains("already known") =>
            {
                debug!(tx_hash = %signed.hash(), "node already has transaction");
                Ok(signed.hash())
            }
            other => other,
        }
    }

    async fn get_receipt(
        &self,
        hash: &str,
        network: &Network,
    ) -> Result<Option<Receipt>, NetworkError> {
        let raw: Option<RawReceipt> = self
            .request(network, "eth_getTransactionReceipt", json!([hash]))
            .await?;
        raw.map(RawReceipt::decode).transpose()
    }

    async fn get_transaction(
        &self,
        hash: &str,
        network: &Network,
    ) -> Result<Option<TransactionInfo>, NetworkError> {
        let raw: Option<RawTransaction> = self
            .request(network, "eth_getTransactionByHash", json!([hash]))
            .await?;
        raw.map(RawTransaction::decode).transpose()
    }

    async fn get_block_number(&self, network: &Network) -> Result<u64, NetworkError> {
        let raw: String = self.request(network, "eth_blockNumber", json!([])).await?;
        parse_u64(&raw)
    }

    /// Scans `page.size` blocks per page back from the head, newest first.
    async fn get_transaction_history(
        &self,
        address: &str,
        network: &Network,
        page: Page,
    ) -> Result<Vec<TransactionInfo>, NetworkError> {
        let head = self.get_block_number(network).await?;
        let size = u64::from(page.size.clamp(1, MAX_HISTORY_BLOCKS));
        let Some(newest) = head.checked_sub(u64::from(page.number) * size) else {
            return Ok(Vec::new());
        };
        let oldest = newest.saturating_sub(size - 1);

        let mut found = Vec::new();
        for number in (oldest..=newest).rev() {
            let block: Option<RawBlock> = self
                .request(network, "eth_getBlockByNumber", json!([quantity(number), true]))
                .await?;
            let Some(block) = block else { continue };
            for raw in block.transactions.into_iter().rev() {
                if raw.involves(address) {
                    found.push(raw.decode()?);
                }
            }
        }
        debug!(
            chain_id = network.chain_id,
            from_block = oldest,
            to_block = newest,
            matches = found.len(),
            "history scanned"
        );
        Ok(found)
    }

    async fn call(&self, to: &str, data: &[u8], network: &Network) -> Result<Vec<u8>, NetworkError> {
        let raw: String = self
            .request(
                network,
                "eth_call",
                json!([{ "to": to, "data": data_hex(data) }, "latest"]),
            )
            .await?;
        parse_data(&raw)
    }
}
