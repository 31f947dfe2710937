//! Per-account, per-chain nonce reservation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::client::NetworkClient;
use crate::error::WalletError;
use crate::network::Network;

#[derive(Debug, Default)]
struct Counter {
    next: Option<u64>,
    /// Released below `next`; handed out again before `next` advances.
    returned: BTreeSet<u64>,
}

type Slot = Arc<Mutex<Counter>>;

/// Hands out nonces per `(address, chain)` without gaps or collisions.
///
/// The first reservation seeds from the node's pending count. Later ones
/// count up locally under the slot's lock, so back-to-back builds never
/// collide. Released nonces are reused lowest first.
#[derive(Default)]
pub struct NonceTracker {
    slots: Mutex<HashMap<(String, u64), Slot>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reserve(
        &self,
        address: &str,
        network: &Network,
        client: &dyn NetworkClient,
    ) -> Result<u64, WalletError> {
        let slot = self.slot(address, network.chain_id).await;
        let mut counter = slot.lock().await;

        if let Some(nonce) = counter.returned.pop_first() {
            debug!(address, chain_id = network.chain_id, nonce, "released nonce reused");
            return Ok(nonce);
        }

        let nonce = match counter.next {
            Some(n) => n,
            None => client.get_nonce(address, network).await?,
        };
        let next = nonce.checked_add(1).ok_or_else(|| {
            WalletError::TransactionFailed(format!("nonce space exhausted for {address}"))
        })?;
        counter.next = Some(next);

        debug!(address, chain_id = network.chain_id, nonce, "nonce reserved");
        Ok(nonce)
    }

    /// Returns an unused reservation so the next [`reserve`] hands it out
    /// again. `false` when the nonce was not reserved from this tracker
    /// (cache cleared, or already returned); callers should [`resync`].
    ///
    /// [`reserve`]: NonceTracker::reserve
    /// [`resync`]: NonceTracker::resync
    pub async fn release(&self, address: &str, chain_id: u64, nonce: u64) -> bool {
        let slot = self.slot(address, chain_id).await;
        let mut counter = slot.lock().await;
        let Some(next) = counter.next else {
            return false;
        };
        if nonce >= next || counter.returned.contains(&nonce) {
            return false;
        }

        if nonce + 1 == next {
            let mut tip = nonce;
            while tip > 0 && counter.returned.remove(&(tip - 1)) {
                tip -= 1;
            }
            counter.next = Some(tip);
        } else {
            counter.returned.insert(nonce);
        }
        debug!(address, chain_id, nonce, "nonce released");
        true
    }

    /// Forgets the local counter; the next reservation asks the node.
    pub async fn resync(&self, address: &str, chain_id: u64) {
        let slot = self.slot(address, chain_id).await;
        *slot.lock().await = Counter::default();
        debug!(address, chain_id, "nonce cache cleared");
    }

    /// The nonce the next reservation would hand out, if cached.
    pub async fn peek(&self, address: &str, chain_id: u64) -> Option<u64> {
        let slot = self.slot(address, chain_id).await;
        let counter = slot.lock().await;
        counter.returned.first().copied().or(counter.next)
    }

    async fn slot(&self, address: &str, chain_id: u64) -> Slot {
        let mut slots = self.slots.lock().await;
        slots
            .entry((address.to_ascii_lowercase(), chain_id))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::client::stub::StubClient;
    use crate::network::builtin_networks;

    const ADDR: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

    fn ethereum() -> Network {
        builtin_networks().into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn sequential_reservations_increase() {
        let mut client = StubClient::new();
        client.pending_nonce = 7;
        let tracker = NonceTracker::new();
        let network = ethereum();

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(tracker.reserve(ADDR, &network, &client).await.unwrap());
        }
        assert_eq!(seen, vec![7, 8, 9, 10, 11]);
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_reservations_are_unique() {
        let client = Arc::new(StubClient::new());
        let tracker = Arc::new(NonceTracker::new());
        let network = ethereum();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let (client, tracker, network) = (client.clone(), tracker.clone(), network.clone());
            handles.push(tokio::spawn(async move {
                tracker.reserve(ADDR, &network, client.as_ref()).await.unwrap()
            }));
        }
        let mut nonces = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap());
        }
        nonces.sort_unstable();
        assert_eq!(nonces, (0..16).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn address_case_shares_slot_and_chains_do_not() {
        let client = StubClient::new();
        let tracker = NonceTracker::new();
        let network = ethereum();
        let mut polygon = network.clone();
        polygon.chain_id = 137;

        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 0);
        assert_eq!(
            tracker
                .reserve(&ADDR.to_ascii_lowercase(), &network, &client)
                .await
                .unwrap(),
            1
        );
        assert_eq!(tracker.reserve(ADDR, &polygon, &client).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn released_nonces_are_reused_lowest_first() {
        let client = StubClient::new();
        let tracker = NonceTracker::new();
        let network = ethereum();

        let a = tracker.reserve(ADDR, &network, &client).await.unwrap();
        let b = tracker.reserve(ADDR, &network, &client).await.unwrap();
        let c = tracker.reserve(ADDR, &network, &client).await.unwrap();
        assert!(tracker.release(ADDR, 1, a).await);
        assert!(tracker.release(ADDR, 1, b).await);
        assert_eq!(tracker.peek(ADDR, 1).await, Some(0));

        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 0);
        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 1);
        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 3);

        // the tip collapses through earlier returns
        assert!(tracker.release(ADDR, 1, 1).await);
        assert!(tracker.release(ADDR, 1, 3).await);
        assert!(tracker.release(ADDR, 1, c).await);
        assert_eq!(tracker.peek(ADDR, 1).await, Some(1));
        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 1);
        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 2);
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_release_is_refused() {
        let client = StubClient::new();
        let tracker = NonceTracker::new();
        let network = ethereum();

        assert!(!tracker.release(ADDR, 1, 0).await);
        let a = tracker.reserve(ADDR, &network, &client).await.unwrap();
        assert!(!tracker.release(ADDR, 1, a + 5).await);
        tracker.reserve(ADDR, &network, &client).await.unwrap();
        assert!(tracker.release(ADDR, 1, a).await);
        assert!(!tracker.release(ADDR, 1, a).await);
    }

    #[tokio::test]
    async fn exhausted_nonce_space_is_an_error() {
        let mut client = StubClient::new();
        client.pending_nonce = u64::MAX;
        let tracker = NonceTracker::new();

        assert!(matches!(
            tracker.reserve(ADDR, &ethereum(), &client).await,
            Err(WalletError::TransactionFailed(_))
        ));
        assert_eq!(tracker.peek(ADDR, 1).await, None);
    }

    #[tokio::test]
    async fn resync_reseeds_from_node() {
        let client = StubClient::new();
        let tracker = NonceTracker::new();
        let network = ethereum();

        tracker.reserve(ADDR, &network, &client).await.unwrap();
        tracker.resync(ADDR, 1).await;
        assert_eq!(tracker.peek(ADDR, 1).await, None);
        assert_eq!(tracker.reserve(ADDR, &network, &client).await.unwrap(), 0);
        assert_eq!(client.nonce_calls.load(Ordering::SeqCst), 2);
    }
}
