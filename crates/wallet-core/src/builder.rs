//! Unsigned transaction construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::client::NetworkClient;
use crate::error::{NetworkError, ValidationError, WalletError};
use crate::network::Network;
use crate::nonce::NonceTracker;
use crate::transaction::{AccessListItem, FeeModel, Transaction, TxStatus};
use crate::validation::{self, validate_for_network, MAX_GAS_LIMIT, MIN_GAS_LIMIT};

/// Nodes refuse same-nonce replacements that raise fees by less than this.
pub const MIN_REPLACEMENT_BUMP_PERCENT: u32 = 10;
const FEE_HISTORY_BLOCKS: u64 = 5;
const DEFAULT_GAS_MARGIN_PERCENT: u64 = 20;

/// How fees are chosen for a new transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeStrategy {
    /// Fixed or node-quoted (`eth_gasPrice`) gas price.
    Legacy { gas_price: Option<u128> },
    FeeMarket { max_fee: u128, max_priority_fee: u128 },
    /// Fee market from recent history where the chain supports it, else
    /// the node's gas price.
    #[default]
    Auto,
}

/// What the caller wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: String,
    pub to: String,
    /// Decimal wei.
    pub value: String,
    pub data: Vec<u8>,
    pub fee: FeeStrategy,
    /// Estimated when absent.
    pub gas_limit: Option<u64>,
    pub access_list: Vec<AccessListItem>,
    pub metadata: BTreeMap<String, String>,
}

impl TxRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            value: value.into(),
            data: Vec::new(),
            fee: FeeStrategy::Auto,
            gas_limit: None,
            access_list: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_fee(mut self, fee: FeeStrategy) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_access_list(mut self, access_list: Vec<AccessListItem>) -> Self {
        self.access_list = access_list;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub struct TransactionBuilder {
    client: Arc<dyn NetworkClient>,
    nonces: Arc<NonceTracker>,
    gas_margin_percent: u64,
}

impl TransactionBuilder {
    pub fn new(client: Arc<dyn NetworkClient>, nonces: Arc<NonceTracker>) -> Self {
        Self {
            client,
            nonces,
            gas_margin_percent: DEFAULT_GAS_MARGIN_PERCENT,
        }
    }

    pub fn with_gas_margin(mut self, percent: u64) -> Self {
        self.gas_margin_percent = percent;
        self
    }

    pub fn nonces(&self) -> &Arc<NonceTracker> {
        &self.nonces
    }

    /// Builds a pending transaction for `network`.
    ///
    /// Request shape is checked before any RPC. The nonce is reserved last
    /// and handed back if the finished record fails validation.
    pub async fn build(&self, request: TxRequest, network: &Network) -> Result<Transaction, WalletError> {
        let placeholder = match request.fee {
            FeeStrategy::Legacy {
                gas_price: Some(gas_price),
            } => FeeModel::Legacy { gas_price },
            FeeStrategy::FeeMarket {
                max_fee,
                max_priority_fee,
            } => FeeModel::FeeMarket {
                max_fee,
                max_priority_fee,
            },
            FeeStrategy::Legacy { gas_price: None } | FeeStrategy::Auto => {
                FeeModel::Legacy { gas_price: 1 }
            }
        };

        let mut draft = Transaction::new(
            request.from,
            request.to,
            request.value,
            network.chain_id,
            placeholder,
        )
        .with_gas_limit(request.gas_limit.unwrap_or(MIN_GAS_LIMIT))
        .with_data(request.data)
        .with_access_list(request.access_list);
        draft.metadata = request.metadata;
        validate_for_network(&draft, network)?;

        let fee = self.resolve_fee(request.fee, network).await?;
        let draft = draft.with_fee(fee);

        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => self.estimate_gas(&draft, network).await?,
        };

        let nonce = self
            .nonces
            .reserve(&draft.from, network, self.client.as_ref())
            .await?;
        let tx = draft.with_gas_limit(gas_limit).with_nonce(nonce);

        if let Err(e) = validate_for_network(&tx, network) {
            if !self.nonces.release(&tx.from, network.chain_id, nonce).await {
                self.nonces.resync(&tx.from, network.chain_id).await;
            }
            return Err(e.into());
        }

        info!(
            tx_id = %tx.id,
            chain_id = tx.chain_id,
            nonce,
            gas_limit,
            kind = tx.kind.as_str(),
            "transaction built"
        );
        Ok(tx)
    }

    pub fn validate(&self, tx: &Transaction) -> Result<(), ValidationError> {
        validation::validate(tx)
    }

    /// A same-nonce copy with every fee raised by `bump_percent`, at least
    /// [`MIN_REPLACEMENT_BUMP_PERCENT`]. Never issued automatically.
    pub fn replacement(&self, tx: &Transaction, bump_percent: u32) -> Result<Transaction, WalletError> {
        if tx.status != TxStatus::Pending {
            return Err(WalletError::InvalidTransition {
                from: tx.status.as_str(),
                to: "replaced",
            });
        }

        let bump = bump_percent.max(MIN_REPLACEMENT_BUMP_PERCENT);
        let mut next = tx.clone().with_fee(tx.fee.bumped(bump));
        next.id = uuid::Uuid::new_v4().to_string();
        next.hash = None;
        next.created_at = Utc::now();
        let next = next.with_metadata("replaces", replaced_ref(tx));

        validation::validate(&next)?;
        debug!(tx_id = %next.id, nonce = next.nonce, bump, "replacement built");
        Ok(next)
    }

    /// A zero-value self-transfer at the same nonce with fees bumped by the
    /// minimum.
    pub fn cancellation(&self, tx: &Transaction) -> Result<Transaction, WalletError> {
        if tx.status != TxStatus::Pending {
            return Err(WalletError::InvalidTransition {
                from: tx.status.as_str(),
                to: "cancelled",
            });
        }

        let next = Transaction::new(
            tx.from.clone(),
            tx.from.clone(),
            "0",
            tx.chain_id,
            tx.fee.bumped(MIN_REPLACEMENT_BUMP_PERCENT),
        )
        .with_nonce(tx.nonce)
        .with_gas_limit(MIN_GAS_LIMIT)
        .with_metadata("cancels", replaced_ref(tx));

        validation::validate(&next)?;
        debug!(tx_id = %next.id, nonce = next.nonce, "cancellation built");
        Ok(next)
    }

    async fn resolve_fee(&self, strategy: FeeStrategy, network: &Network) -> Result<FeeModel, WalletError> {
        let fee = match strategy {
            FeeStrategy::Legacy {
                gas_price: Some(gas_price),
            } => FeeModel::Legacy { gas_price },
            FeeStrategy::FeeMarket {
                max_fee,
                max_priority_fee,
            } => FeeModel::FeeMarket {
                max_fee,
                max_priority_fee,
            },
            FeeStrategy::Auto if network.supports_fee_market() => self
                .client
                .get_fee_history(network, FEE_HISTORY_BLOCKS)
                .await?
                .suggest_fees(),
            FeeStrategy::Legacy { gas_price: None } | FeeStrategy::Auto => FeeModel::Legacy {
                gas_price: self.client.get_gas_price(network).await?,
            },
        };
        Ok(fee)
    }

    /// Node estimate plus the safety margin. Plain transfers keep the exact
    /// intrinsic cost.
    async fn estimate_gas(&self, draft: &Transaction, network: &Network) -> Result<u64, WalletError> {
        let estimate = self
            .client
            .estimate_gas(draft, network)
            .await
            .map_err(|e| match e {
                NetworkError::TransactionFailed(msg) | NetworkError::InvalidResponse(msg) => {
                    WalletError::GasEstimationFailed(msg)
                }
                other => WalletError::Network(other),
            })?;

        if estimate <= MIN_GAS_LIMIT {
            return Ok(MIN_GAS_LIMIT);
        }
        let padded = estimate.saturating_mul(100 + self.gas_margin_percent) / 100;
        Ok(padded.min(MAX_GAS_LIMIT))
    }
}

fn replaced_ref(tx: &Transaction) -> String {
    tx.hash.clone().unwrap_or_else(|| tx.id.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::client::stub::StubClient;
    use crate::network::{builtin_networks, BSC, ETHEREUM};
    use crate::transaction::TxKind;

    const FROM: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";
    const TO: &str = "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6";

    fn network(chain_id: u64) -> Network {
        builtin_networks()
            .into_iter()
            .find(|n| n.chain_id == chain_id)
            .unwrap()
    }

    fn builder(client: StubClient) -> (TransactionBuilder, Arc<StubClient>) {
        let client = Arc::new(client);
        (
            TransactionBuilder::new(client.clone(), Arc::new(NonceTracker::new())),
            client,
        )
    }

    #[tokio::test]
    async fn auto_fee_uses_fee_market_where_supported() {
        let (builder, _) = builder(StubClient::new());
        let tx = builder
            .build(TxRequest::new(FROM, TO, "100000000000000000"), &network(ETHEREUM))
            .await
            .unwrap();

        assert_eq!(tx.kind, TxKind::FeeMarket);
        assert_eq!(
            tx.fee,
            FeeModel::FeeMarket {
                max_fee: 22_000_000_000,
                max_priority_fee: 2_000_000_000
            }
        );
        assert_eq!(tx.gas_limit, 21_000);
        assert_eq!(tx.chain_id, ETHEREUM);
        assert_eq!(tx.status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn auto_fee_falls_back_to_gas_price() {
        let (builder, _) = builder(StubClient::new());
        let tx = builder
            .build(TxRequest::new(FROM, TO, "1"), &network(BSC))
            .await
            .unwrap();
        assert_eq!(tx.kind, TxKind::Legacy);
        assert_eq!(tx.fee, FeeModel::Legacy { gas_price: 20_000_000_000 });
    }

    #[tokio::test]
    async fn explicit_fee_market_on_legacy_chain_fails_fast() {
        let (builder, client) = builder(StubClient::new());
        let request = TxRequest::new(FROM, TO, "1").with_fee(FeeStrategy::FeeMarket {
            max_fee: 10,
            max_priority_fee: 1,
        });
        let result = builder.build(request, &network(BSC)).await;
        assert!(matches!(
            result,
            Err(WalletError::InvalidTransaction(ValidationError::UnsupportedFeeMarket(BSC)))
        ));
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_request_touches_no_rpc() {
        let (builder, client) = builder(StubClient::new());
        for (to, value) in [("0xnope", "1"), (TO, "-1"), (TO, "abc")] {
            let result = builder
                .build(TxRequest::new(FROM, to, value), &network(ETHEREUM))
                .await;
            assert!(matches!(result, Err(WalletError::InvalidTransaction(_))));
        }
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nonces_strictly_increase() {
        let mut stub = StubClient::new();
        stub.pending_nonce = 3;
        let (builder, _) = builder(stub);
        let eth = network(ETHEREUM);

        let mut last = None;
        for _ in 0..4 {
            let tx = builder.build(TxRequest::new(FROM, TO, "1"), &eth).await.unwrap();
            if let Some(prev) = last {
                assert!(tx.nonce > prev);
            }
            last = Some(tx.nonce);
        }
        assert_eq!(last, Some(6));
    }

    #[tokio::test]
    async fn contract_calls_get_gas_margin() {
        let mut stub = StubClient::new();
        stub.gas_estimate = Ok(50_000);
        let (builder, _) = builder(stub);
        let tx = builder
            .build(
                TxRequest::new(FROM, TO, "0").with_data(vec![0xa9, 0x05, 0x9c, 0xbb]),
                &network(ETHEREUM),
            )
            .await
            .unwrap();
        assert_eq!(tx.gas_limit, 60_000);
    }

    #[tokio::test]
    async fn estimation_revert_is_gas_estimation_failed() {
        let mut stub = StubClient::new();
        stub.gas_estimate = Err(NetworkError::TransactionFailed("execution reverted".into()));
        let (builder, client) = builder(stub);
        let result = builder
            .build(TxRequest::new(FROM, TO, "0"), &network(ETHEREUM))
            .await;
        assert!(matches!(result, Err(WalletError::GasEstimationFailed(_))));
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn estimation_timeout_stays_network_error() {
        let mut stub = StubClient::new();
        stub.gas_estimate = Err(NetworkError::Timeout);
        let (builder, _) = builder(stub);
        let result = builder
            .build(TxRequest::new(FROM, TO, "0"), &network(ETHEREUM))
            .await;
        assert!(matches!(result, Err(WalletError::Network(NetworkError::Timeout))));
    }

    #[tokio::test]
    async fn explicit_gas_limit_skips_estimate() {
        let mut stub = StubClient::new();
        stub.gas_estimate = Err(NetworkError::Timeout);
        let (builder, _) = builder(stub);
        let tx = builder
            .build(
                TxRequest::new(FROM, TO, "0")
                    .with_gas_limit(100_000)
                    .with_fee(FeeStrategy::Legacy {
                        gas_price: Some(5),
                    }),
                &network(ETHEREUM),
            )
            .await
            .unwrap();
        assert_eq!(tx.gas_limit, 100_000);
        assert_eq!(tx.fee, FeeModel::Legacy { gas_price: 5 });
    }

    #[tokio::test]
    async fn replacement_and_cancellation_keep_nonce() {
        let (builder, _) = builder(StubClient::new());
        let tx = builder
            .build(
                TxRequest::new(FROM, TO, "5").with_fee(FeeStrategy::Legacy {
                    gas_price: Some(100),
                }),
                &network(ETHEREUM),
            )
            .await
            .unwrap()
            .broadcasted("0xaaa")
            .unwrap();

        let faster = builder.replacement(&tx, 5).unwrap();
        assert_eq!(faster.nonce, tx.nonce);
        assert_eq!(faster.fee, FeeModel::Legacy { gas_price: 110 });
        assert_eq!(faster.hash, None);
        assert_eq!(faster.metadata["replaces"], "0xaaa");
        assert_ne!(faster.id, tx.id);

        let cancel = builder.cancellation(&tx).unwrap();
        assert_eq!(cancel.nonce, tx.nonce);
        assert_eq!(cancel.to, tx.from);
        assert_eq!(cancel.value, "0");
        assert_eq!(cancel.gas_limit, 21_000);
        assert_eq!(cancel.fee, FeeModel::Legacy { gas_price: 110 });
    }

    #[tokio::test]
    async fn replacement_of_final_transaction_rejected() {
        let (builder, _) = builder(StubClient::new());
        let tx = Transaction::new(FROM, TO, "1", 1, FeeModel::Legacy { gas_price: 1 })
            .cancel()
            .unwrap();
        assert!(builder.replacement(&tx, 10).is_err());
        assert!(builder.cancellation(&tx).is_err());
    }
}
