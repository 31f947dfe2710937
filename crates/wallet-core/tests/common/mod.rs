//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crypto_utils::ZeroizingBytes;
use wallet_core::client::{FeeHistory, NetworkClient, Page, TransactionInfo};
use wallet_core::{
    MemorySecureStorage, Network, NetworkError, Receipt, SecureStorage, SignedTransaction,
    Transaction, WalletError, U256,
};

pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const RECIPIENT: &str = "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6";

/// Node stand-in that accepts everything and remembers what it was sent.
pub struct MockNetworkClient {
    pub balance: Mutex<U256>,
    pub nonces: Mutex<HashMap<String, u64>>,
    pub block_number: Mutex<u64>,
    /// `(chain_id, raw payload, reported hash)` per broadcast.
    pub broadcasts: Mutex<Vec<(u64, Vec<u8>, String)>>,
    pub receipts: Mutex<HashMap<String, Receipt>>,
}

impl MockNetworkClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            balance: Mutex::new(U256::from(10u64).pow(U256::from(18u64))),
            nonces: Mutex::new(HashMap::new()),
            block_number: Mutex::new(1_000),
            broadcasts: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
        })
    }

    pub fn broadcast_chains(&self) -> Vec<u64> {
        self.broadcasts.lock().unwrap().iter().map(|b| b.0).collect()
    }

    /// Mines `hash` in the current block.
    pub fn mine(&self, hash: &str, success: bool) {
        let block_number = *self.block_number.lock().unwrap();
        self.receipts.lock().unwrap().insert(
            hash.to_string(),
            Receipt {
                tx_hash: hash.to_string(),
                block_number,
                block_hash: format!("0x{:064x}", block_number),
                gas_used: 21_000,
                effective_gas_price: Some(12_000_000_000),
                success,
                contract_address: None,
                logs: 0,
            },
        );
    }
}

#[async_trait]
impl NetworkClient for MockNetworkClient {
    async fn get_balance(&self, _: &str, _: &Network) -> Result<U256, NetworkError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn get_nonce(&self, address: &str, network: &Network) -> Result<u64, NetworkError> {
        let key = format!("{}:{}", network.chain_id, address.to_ascii_lowercase());
        Ok(self.nonces.lock().unwrap().get(&key).copied().unwrap_or(0))
    }

    async fn get_confirmed_nonce(&self, address: &str, network: &Network) -> Result<u64, NetworkError> {
        self.get_nonce(address, network).await
    }

    async fn estimate_gas(&self, tx: &Transaction, _: &Network) -> Result<u64, NetworkError> {
        Ok(if tx.data.is_empty() { 21_000 } else { 65_000 })
    }

    async fn get_gas_price(&self, _: &Network) -> Result<u128, NetworkError> {
        Ok(15_000_000_000)
    }

    async fn get_fee_history(&self, _: &Network, block_count: u64) -> Result<FeeHistory, NetworkError> {
        let blocks = block_count as usize;
        Ok(FeeHistory {
            oldest_block: 1_000 - block_count,
            base_fee_per_gas: vec![12_000_000_000; blocks + 1],
            gas_used_ratio: vec![0.5; blocks],
            reward: vec![vec![1_500_000_000]; blocks],
        })
    }

    async fn broadcast(&self, signed: &SignedTransaction, network: &Network) -> Result<String, NetworkError> {
        let hash = signed.hash();
        self.broadcasts
            .lock()
            .unwrap()
            .push((network.chain_id, signed.raw.clone(), hash.clone()));
        Ok(hash)
    }

    async fn get_receipt(&self, hash: &str, _: &Network) -> Result<Option<Receipt>, NetworkError> {
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn get_transaction(&self, _: &str, _: &Network) -> Result<Option<TransactionInfo>, NetworkError> {
        Ok(None)
    }

    async fn get_block_number(&self, _: &Network) -> Result<u64, NetworkError> {
        Ok(*self.block_number.lock().unwrap())
    }

    async fn get_transaction_history(
        &self,
        _: &str,
        _: &Network,
        _: Page,
    ) -> Result<Vec<TransactionInfo>, NetworkError> {
        Ok(Vec::new())
    }

    async fn call(&self, _: &str, _: &[u8], _: &Network) -> Result<Vec<u8>, NetworkError> {
        Ok(vec![0u8; 32])
    }
}

/// Memory storage whose `delete` can be made to fail.
pub struct FlakyStorage {
    inner: MemorySecureStorage,
    pub fail_delete: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemorySecureStorage::new(),
            fail_delete: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SecureStorage for FlakyStorage {
    async fn put(&self, key: &str, secret: ZeroizingBytes) -> Result<(), WalletError> {
        self.inner.put(key, secret).await
    }

    async fn get(&self, key: &str) -> Result<Option<ZeroizingBytes>, WalletError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), WalletError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(WalletError::StorageError("keychain unavailable".into()));
        }
        self.inner.delete(key).await
    }
}
