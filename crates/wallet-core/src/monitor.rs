//! Post-broadcast tracking and balance polling.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::NetworkClient;
use crate::error::{NetworkError, WalletError};
use crate::network::Network;
use crate::transaction::{Receipt, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Blocks including the one that mined the transaction.
    pub confirmations: u64,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive polls where the node knows nothing of the hash before it
    /// is reported dropped.
    pub drop_after_misses: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(4),
            drop_after_misses: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Confirmed { receipt: Receipt, confirmations: u64 },
    /// Mined but reverted.
    Failed { receipt: Receipt },
    /// The node forgot the transaction and the nonce is still free.
    Dropped,
    /// Another transaction consumed the nonce.
    Replaced,
    /// Timed out without a terminal state.
    StillPending,
    Cancelled,
}

/// What the monitor needs to know about a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTx {
    pub hash: String,
    pub from: String,
    pub nonce: u64,
}

impl TryFrom<&Transaction> for TrackedTx {
    type Error = WalletError;

    fn try_from(tx: &Transaction) -> Result<Self, Self::Error> {
        let hash = tx.hash.clone().ok_or_else(|| {
            WalletError::TransactionFailed(format!("transaction {} was never broadcast", tx.id))
        })?;
        Ok(Self {
            hash,
            from: tx.from.clone(),
            nonce: tx.nonce,
        })
    }
}

/// Creates a linked cancel handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

/// Stops every loop holding the paired [`CancelSignal`]. Already broadcast
/// transactions are unaffected.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle was dropped
    /// without cancelling.
    pub async fn cancelled(&mut self) {
        let handle_dropped = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if handle_dropped {
            std::future::pending::<()>().await;
        }
    }
}

pub struct TransactionMonitor {
    client: Arc<dyn NetworkClient>,
    options: MonitorOptions,
}

impl TransactionMonitor {
    pub fn new(client: Arc<dyn NetworkClient>, options: MonitorOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Polls until a terminal outcome, the timeout, or cancellation.
    ///
    /// Transient transport errors are logged and polling continues. Anything
    /// else ends tracking with the error.
    pub async fn track(
        &self,
        tracked: &TrackedTx,
        network: &Network,
        mut cancel: CancelSignal,
    ) -> Result<MonitorOutcome, NetworkError> {
        let deadline = Instant::now() + self.options.timeout;
        let mut misses = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(MonitorOutcome::Cancelled);
            }

            match self.poll(tracked, network, &mut misses).await {
                Ok(Some(outcome)) => {
                    info!(tx_hash = %tracked.hash, chain_id = network.chain_id, ?outcome, "tracking finished");
                    return Ok(outcome);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(tx_hash = %tracked.hash, error = %e, "poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                info!(tx_hash = %tracked.hash, "still pending at timeout");
                return Ok(MonitorOutcome::StillPending);
            }
            let wait = self.options.poll_interval.min(deadline - now);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Ok(MonitorOutcome::Cancelled),
            }
        }
    }

    async fn poll(
        &self,
        tracked: &TrackedTx,
        network: &Network,
        misses: &mut u32,
    ) -> Result<Option<MonitorOutcome>, NetworkError> {
        if let Some(receipt) = self.client.get_receipt(&tracked.hash, network).await? {
            return self.judge_receipt(receipt, network).await;
        }

        let mined_nonce = self
            .client
            .get_confirmed_nonce(&tracked.from, network)
            .await?;
        if mined_nonce > tracked.nonce {
            // The receipt may have been indexed since the first look.
            return match self.client.get_receipt(&tracked.hash, network).await? {
                Some(receipt) => self.judge_receipt(receipt, network).await,
                None => Ok(Some(MonitorOutcome::Replaced)),
            };
        }

        if self
            .client
            .get_transaction(&tracked.hash, network)
            .await?
            .is_some()
        {
            *misses = 0;
            return Ok(None);
        }

        *misses += 1;
        debug!(tx_hash = %tracked.hash, misses = *misses, "transaction unknown to node");
        if *misses >= self.options.drop_after_misses {
            Ok(Some(MonitorOutcome::Dropped))
        } else {
            Ok(None)
        }
    }

    async fn judge_receipt(
        &self,
        receipt: Receipt,
        network: &Network,
    ) -> Result<Option<MonitorOutcome>, NetworkError> {
        if !receipt.success {
            return Ok(Some(MonitorOutcome::Failed { receipt }));
        }
        let head = self.client.get_block_number(network).await?;
        let confirmations = head.saturating_sub(receipt.block_number) + 1;
        if confirmations >= self.options.confirmations {
            Ok(Some(MonitorOutcome::Confirmed {
                receipt,
                confirmations,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Moves a tracked record to the state the outcome implies. Non-terminal
/// outcomes return it unchanged.
pub fn apply_outcome(tx: Transaction, outcome: &MonitorOutcome) -> Result<Transaction, WalletError> {
    match outcome {
        MonitorOutcome::Confirmed { receipt, .. } => tx.confirm(receipt.clone(), Utc::now()),
        MonitorOutcome::Failed { receipt } => tx.fail(Some(receipt.clone()), "reverted"),
        MonitorOutcome::Dropped => tx.fail(None, "dropped"),
        MonitorOutcome::Replaced => tx.fail(None, "replaced"),
        MonitorOutcome::StillPending | MonitorOutcome::Cancelled => Ok(tx),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub address: String,
    pub chain_id: u64,
    pub balance: U256,
}

/// Polls a balance and reports changes.
pub struct BalanceWatcher {
    client: Arc<dyn NetworkClient>,
    interval: Duration,
}

impl BalanceWatcher {
    pub fn new(client: Arc<dyn NetworkClient>, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// Spawns the polling task. It ends when `cancel` fires or the receiver
    /// is dropped.
    pub fn spawn(
        &self,
        address: String,
        network: Network,
        mut cancel: CancelSignal,
    ) -> (mpsc::Receiver<BalanceUpdate>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let client = self.client.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut last: Option<U256> = None;
            while !cancel.is_cancelled() {
                match client.get_balance(&address, &network).await {
                    Ok(balance) if last != Some(balance) => {
                        last = Some(balance);
                        let update = BalanceUpdate {
                            address: address.clone(),
                            chain_id: network.chain_id,
                            balance,
                        };
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(address = %address, error = %e, "balance poll failed"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            debug!(address = %address, "balance watcher stopped");
        });

        (rx, handle)
    }
}
