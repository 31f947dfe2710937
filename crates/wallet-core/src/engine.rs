//! The assembled engine: wallet selection, build, sign, broadcast, track.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use chain_evm::abi::decode_uint256;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::active::ActiveNetwork;
use crate::auth::{Authenticator, HardwareWallet};
use crate::builder::{TransactionBuilder, TxRequest};
use crate::client::{NetworkClient, Page, TransactionInfo};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{NetworkError, TokenError, ValidationError, WalletError};
use crate::key_manager::KeyManager;
use crate::keystore::SecureStorage;
use crate::monitor::{
    apply_outcome, BalanceUpdate, BalanceWatcher, CancelSignal, MonitorOptions, MonitorOutcome,
    TrackedTx, TransactionMonitor,
};
use crate::network::{Network, NetworkStatus, ETHEREUM};
use crate::nonce::NonceTracker;
use crate::registry::NetworkRegistry;
use crate::signer::Signer;
use crate::token::{Token, TokenRegistry};
use crate::transaction::{SignedTransaction, Transaction, TxStatus};

pub struct EngineBuilder {
    client: Arc<dyn NetworkClient>,
    storage: Arc<dyn SecureStorage>,
    registry: Option<Arc<NetworkRegistry>>,
    hardware: Option<Arc<dyn HardwareWallet>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    monitor: MonitorOptions,
    initial_chain: u64,
}

impl EngineBuilder {
    pub fn registry(mut self, registry: Arc<NetworkRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn hardware(mut self, hardware: Arc<dyn HardwareWallet>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn monitor_options(mut self, options: MonitorOptions) -> Self {
        self.monitor = options;
        self
    }

    pub fn initial_chain(mut self, chain_id: u64) -> Self {
        self.initial_chain = chain_id;
        self
    }

    /// Registry, monitor options and starting chain from `config`.
    pub fn config(self, config: &EngineConfig) -> Result<Self, ConfigError> {
        let registry = Arc::new(config.network_registry()?);
        Ok(self
            .registry(registry)
            .monitor_options(config.monitor_options())
            .initial_chain(config.default_chain_id))
    }

    pub fn build(self) -> Result<WalletEngine, WalletError> {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(NetworkRegistry::with_builtin()));
        let active = ActiveNetwork::on_chain(registry.clone(), self.initial_chain)
            .map_err(|_| WalletError::UnsupportedChain(self.initial_chain))?;

        let mut keys = KeyManager::new(self.storage);
        if let Some(hardware) = self.hardware {
            keys = keys.with_hardware(hardware);
        }
        let keys = Arc::new(keys);

        let mut signer = Signer::new(keys.clone());
        if let Some(authenticator) = self.authenticator {
            signer = signer.with_authenticator(authenticator);
        }

        let tokens = TokenRegistry::with_builtin(&registry.all());
        let builder = TransactionBuilder::new(self.client.clone(), Arc::new(NonceTracker::new()));
        let monitor = TransactionMonitor::new(self.client.clone(), self.monitor);

        Ok(WalletEngine {
            registry,
            tokens: RwLock::new(tokens),
            active,
            keys,
            builder,
            signer,
            client: self.client,
            monitor,
        })
    }
}

/// Wires the registries, key manager, builder, signer, client and monitor
/// together.
///
/// Every multi-step operation resolves its network once at entry and passes
/// that value down, so a concurrent [`switch_chain`] never redirects an
/// in-flight transaction.
///
/// [`switch_chain`]: WalletEngine::switch_chain
pub struct WalletEngine {
    registry: Arc<NetworkRegistry>,
    tokens: RwLock<TokenRegistry>,
    active: ActiveNetwork,
    keys: Arc<KeyManager>,
    builder: TransactionBuilder,
    signer: Signer,
    client: Arc<dyn NetworkClient>,
    monitor: TransactionMonitor,
}

impl WalletEngine {
    pub fn builder(client: Arc<dyn NetworkClient>, storage: Arc<dyn SecureStorage>) -> EngineBuilder {
        EngineBuilder {
            client,
            storage,
            registry: None,
            hardware: None,
            authenticator: None,
            monitor: MonitorOptions::default(),
            initial_chain: ETHEREUM,
        }
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.registry
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn transaction_builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn client(&self) -> &Arc<dyn NetworkClient> {
        &self.client
    }

    pub fn active_network(&self) -> Arc<Network> {
        self.active.current()
    }

    /// Unregistered chains fail and leave the active network as it was.
    pub fn switch_chain(&self, chain_id: u64) -> Result<Network, WalletError> {
        self.active.switch_chain(chain_id).map_err(|e| match e {
            NetworkError::UnsupportedChain(id) => WalletError::UnsupportedChain(id),
            other => WalletError::Network(other),
        })
    }

    pub async fn register_token(&self, token: Token) -> Result<(), TokenError> {
        self.tokens.write().await.register(token)
    }

    /// Looks a token up by symbol or address.
    pub async fn resolve_token(&self, chain_id: u64, identifier: &str) -> Option<Token> {
        self.tokens.read().await.resolve(chain_id, identifier).cloned()
    }

    pub async fn tokens_for_chain(&self, chain_id: u64) -> Vec<Token> {
        self.tokens.read().await.for_chain(chain_id).cloned().collect()
    }

    /// Builds, signs and broadcasts on the network active at call time.
    pub async fn send(&self, wallet_id: &str, request: TxRequest) -> Result<Transaction, WalletError> {
        let network = self.active.current();
        self.send_on(&network, wallet_id, request).await
    }

    /// Builds, signs and broadcasts on `network`.
    ///
    /// A reserved nonce is handed back if the balance check or signing
    /// fails. A broadcast failure clears the nonce cache instead.
    pub async fn send_on(
        &self,
        network: &Network,
        wallet_id: &str,
        request: TxRequest,
    ) -> Result<Transaction, WalletError> {
        let wallet = self.keys.require(wallet_id).await?;
        if !wallet.supports_network(network.chain_id) || network.status == NetworkStatus::Inactive {
            return Err(WalletError::UnsupportedChain(network.chain_id));
        }
        if !wallet.address.eq_ignore_ascii_case(&request.from) {
            return Err(WalletError::InvalidAddress(format!(
                "sender {} is not wallet {}",
                request.from, wallet.address
            )));
        }

        let tx = self.builder.build(request, network).await?;
        let nonces = self.builder.nonces();

        if let Err(e) = self.check_balance(&tx, network).await {
            self.return_nonce(&tx).await;
            return Err(e);
        }

        let signed = match self.signer.sign(&tx, wallet_id).await {
            Ok(signed) => signed,
            Err(e) => {
                self.return_nonce(&tx).await;
                return Err(e);
            }
        };

        match self.broadcast_on(&signed, network).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                nonces.resync(&tx.from, network.chain_id).await;
                Err(e)
            }
        }
    }

    /// Broadcasts on the network the signed payload was built for, regardless
    /// of the active network.
    pub async fn broadcast(&self, signed: &SignedTransaction) -> Result<Transaction, WalletError> {
        let network = self.network_for(signed.chain_id())?;
        self.broadcast_on(signed, &network).await
    }

    /// Tracks a broadcast transaction and applies the outcome.
    pub async fn wait_for(
        &self,
        tx: &Transaction,
        cancel: CancelSignal,
    ) -> Result<(Transaction, MonitorOutcome), WalletError> {
        let network = self.network_for(tx.chain_id)?;
        let tracked = TrackedTx::try_from(tx)?;
        let outcome = self.monitor.track(&tracked, &network, cancel).await?;
        let updated = apply_outcome(tx.clone(), &outcome)?;
        Ok((updated, outcome))
    }

    /// Re-sends a stuck transaction at the same nonce with higher fees.
    pub async fn speed_up(
        &self,
        wallet_id: &str,
        tx: &Transaction,
        bump_percent: u32,
    ) -> Result<Transaction, WalletError> {
        let network = self.network_for(tx.chain_id)?;
        let replacement = self.builder.replacement(tx, bump_percent)?;
        let signed = self.signer.sign(&replacement, wallet_id).await?;
        self.broadcast_on(&signed, &network).await
    }

    /// Cancels locally if never broadcast, otherwise races a zero-value
    /// self-transfer at the same nonce.
    pub async fn cancel_transaction(
        &self,
        wallet_id: &str,
        tx: &Transaction,
    ) -> Result<Transaction, WalletError> {
        if !tx.is_broadcast() {
            let cancelled = tx.clone().cancel()?;
            self.return_nonce(tx).await;
            return Ok(cancelled);
        }

        let network = self.network_for(tx.chain_id)?;
        let cancellation = self.builder.cancellation(tx)?;
        let signed = self.signer.sign(&cancellation, wallet_id).await?;
        self.broadcast_on(&signed, &network).await
    }

    /// Native balance on the active network.
    pub async fn balance(&self, address: &str) -> Result<U256, WalletError> {
        let network = self.active.current();
        Ok(self.client.get_balance(address, &network).await?)
    }

    /// Balance of `token` held by `owner` on the token's own chain.
    pub async fn token_balance(&self, owner: &str, token: &Token) -> Result<U256, WalletError> {
        let network = self.network_for(token.chain_id)?;
        if token.is_native() {
            return Ok(self.client.get_balance(owner, &network).await?);
        }

        let data = token
            .balance_of_data(owner)
            .map_err(|e| WalletError::InvalidAddress(e.to_string()))?;
        let output = self.client.call(&token.address, &data, &network).await?;
        decode_uint256(&output)
            .map_err(|e| WalletError::Network(NetworkError::InvalidResponse(e.to_string())))
    }

    pub async fn history(&self, address: &str, page: Page) -> Result<Vec<TransactionInfo>, WalletError> {
        let network = self.active.current();
        Ok(self
            .client
            .get_transaction_history(address, &network, page)
            .await?)
    }

    /// Streams native-balance changes on the active network until cancelled.
    pub fn watch_balance(
        &self,
        address: &str,
        interval: Duration,
        cancel: CancelSignal,
    ) -> (mpsc::Receiver<BalanceUpdate>, JoinHandle<()>) {
        let network = Network::clone(&self.active.current());
        BalanceWatcher::new(self.client.clone(), interval).spawn(address.to_string(), network, cancel)
    }

    fn network_for(&self, chain_id: u64) -> Result<Network, WalletError> {
        self.registry
            .resolve_by_chain_id(chain_id)
            .ok_or(WalletError::UnsupportedChain(chain_id))
    }

    async fn check_balance(&self, tx: &Transaction, network: &Network) -> Result<(), WalletError> {
        let required = tx.max_cost()?;
        let available = self.client.get_balance(&tx.from, network).await?;
        if available < required {
            warn!(
                chain_id = network.chain_id,
                %required,
                %available,
                "insufficient balance"
            );
            return Err(WalletError::InsufficientBalance {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Hands an unsent transaction's nonce back, or drops the cache when the
    /// tracker no longer knows it.
    async fn return_nonce(&self, tx: &Transaction) {
        let nonces = self.builder.nonces();
        if !nonces.release(&tx.from, tx.chain_id, tx.nonce).await {
            nonces.resync(&tx.from, tx.chain_id).await;
        }
    }

    async fn broadcast_on(
        &self,
        signed: &SignedTransaction,
        network: &Network,
    ) -> Result<Transaction, WalletError> {
        if signed.chain_id() != network.chain_id {
            return Err(ValidationError::ChainMismatch {
                expected: network.chain_id,
                actual: signed.chain_id(),
            }
            .into());
        }

        // Refused before the node sees the payload again.
        let record = &signed.transaction;
        if record.status != TxStatus::Pending || record.is_broadcast() {
            let from = if record.is_broadcast() { "broadcast" } else { record.status.as_str() };
            return Err(WalletError::InvalidTransition { from, to: "broadcast" });
        }

        let local = signed.hash();
        let reported = self.client.broadcast(signed, network).await?;
        if !reported.eq_ignore_ascii_case(&local) {
            warn!(%local, %reported, "node reported a different transaction hash");
        }

        info!(
            tx_hash = %local,
            chain_id = network.chain_id,
            nonce = signed.transaction.nonce,
            "transaction broadcast"
        );
        signed.transaction.clone().broadcasted(local)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::builder::FeeStrategy;
    use crate::client::stub::StubClient;
    use crate::keystore::MemorySecureStorage;
    use crate::network::POLYGON;

    const ABANDON_12: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const TO: &str = "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6";

    async fn engine(client: StubClient) -> (WalletEngine, Arc<StubClient>, String, String) {
        let client = Arc::new(client);
        let engine = WalletEngine::builder(client.clone(), Arc::new(MemorySecureStorage::new()))
            .build()
            .unwrap();
        let wallet = engine.keys().import_wallet(ABANDON_12, "Main").await.unwrap();
        (engine, client, wallet.id, wallet.address)
    }

    #[tokio::test]
    async fn send_broadcasts_and_assigns_hash() {
        let (engine, client, id, from) = engine(StubClient::new()).await;
        let tx = engine
            .send(&id, TxRequest::new(&from, TO, "1000"))
            .await
            .unwrap();

        assert_eq!(tx.status, TxStatus::Pending);
        let hash = tx.hash.clone().unwrap();
        assert_eq!(client.broadcasts.lock().unwrap().as_slice(), &[(1, hash)]);
    }

    #[tokio::test]
    async fn insufficient_balance_releases_nonce() {
        let mut stub = StubClient::new();
        stub.balance = U256::from(1u64);
        let (engine, client, id, from) = engine(stub).await;

        let result = engine.send(&id, TxRequest::new(&from, TO, "1000")).await;
        assert!(matches!(result, Err(WalletError::InsufficientBalance { .. })));
        assert!(client.broadcasts.lock().unwrap().is_empty());
        assert_eq!(engine.transaction_builder().nonces().peek(&from, 1).await, Some(0));
    }

    #[tokio::test]
    async fn broadcast_failure_resyncs_nonce() {
        let mut stub = StubClient::new();
        stub.broadcast_error = Some(NetworkError::TransactionFailed("nonce too low".into()));
        let (engine, client, id, from) = engine(stub).await;

        let result = engine.send(&id, TxRequest::new(&from, TO, "1")).await;
        assert!(matches!(
            result,
            Err(WalletError::Network(NetworkError::TransactionFailed(_)))
        ));
        assert_eq!(engine.transaction_builder().nonces().peek(&from, 1).await, None);
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wallet_network_restriction_enforced() {
        let (engine, _, id, from) = engine(StubClient::new()).await;
        engine
            .keys()
            .set_networks(&id, [POLYGON].into_iter().collect())
            .await
            .unwrap();

        let result = engine.send(&id, TxRequest::new(&from, TO, "1")).await;
        assert!(matches!(result, Err(WalletError::UnsupportedChain(1))));
    }

    #[tokio::test]
    async fn foreign_sender_rejected_before_build() {
        let (engine, client, id, _) = engine(StubClient::new()).await;
        let result = engine.send(&id, TxRequest::new(TO, TO, "1")).await;
        assert!(matches!(result, Err(WalletError::InvalidAddress(_))));
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn switch_to_unknown_chain_keeps_active() {
        let (engine, _, _, _) = engine(StubClient::new()).await;
        assert!(matches!(
            engine.switch_chain(777),
            Err(WalletError::UnsupportedChain(777))
        ));
        assert_eq!(engine.active_network().chain_id, 1);
    }

    #[tokio::test]
    async fn unsent_transaction_cancels_locally() {
        let (engine, client, id, from) = engine(StubClient::new()).await;
        let tx = engine
            .transaction_builder()
            .build(
                TxRequest::new(&from, TO, "1").with_fee(FeeStrategy::Legacy { gas_price: Some(1) }),
                &engine.active_network(),
            )
            .await
            .unwrap();

        let cancelled = engine.cancel_transaction(&id, &tx).await.unwrap();
        assert_eq!(cancelled.status, TxStatus::Cancelled);
        assert!(client.broadcasts.lock().unwrap().is_empty());
        assert_eq!(engine.transaction_builder().nonces().peek(&from, 1).await, Some(0));
    }

    #[tokio::test]
    async fn speed_up_rebroadcasts_same_nonce() {
        let (engine, client, id, from) = engine(StubClient::new()).await;
        let sent = engine.send(&id, TxRequest::new(&from, TO, "1")).await.unwrap();
        let faster = engine.speed_up(&id, &sent, 25).await.unwrap();

        assert_eq!(faster.nonce, sent.nonce);
        assert_ne!(faster.hash, sent.hash);
        assert!(faster.fee.max_price_per_gas() > sent.fee.max_price_per_gas());
        assert_eq!(client.broadcasts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn erc20_balance_decodes_call_output() {
        let (engine, _, _, from) = engine(StubClient::new()).await;
        let usdc = engine.resolve_token(1, "usdc").await.unwrap();
        assert_eq!(
            engine.token_balance(&from, &usdc).await.unwrap(),
            U256::from(5_000_000u64)
        );

        let eth = engine.resolve_token(1, "ETH").await.unwrap();
        assert!(eth.is_native());
        assert_eq!(
            engine.token_balance(&from, &eth).await.unwrap(),
            U256::from(10u64).pow(U256::from(18u64))
        );
    }
}
