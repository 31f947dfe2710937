use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::error::NetworkError;
use crate::network::Network;
use crate::registry::NetworkRegistry;

/// The ambient network pointer.
///
/// Switching is a single atomic store, so concurrent switches resolve to the
/// last writer. Code that spans several calls should read [`current`] once and
/// keep the returned value.
///
/// [`current`]: ActiveNetwork::current
#[derive(Clone)]
pub struct ActiveNetwork {
    registry: Arc<NetworkRegistry>,
    current: Arc<ArcSwap<Network>>,
}

impl ActiveNetwork {
    pub fn new(registry: Arc<NetworkRegistry>, initial: Network) -> Self {
        Self {
            registry,
            current: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// Starts on `chain_id`, which must be registered.
    pub fn on_chain(registry: Arc<NetworkRegistry>, chain_id: u64) -> Result<Self, NetworkError> {
        let initial = registry
            .resolve_by_chain_id(chain_id)
            .ok_or(NetworkError::UnsupportedChain(chain_id))?;
        Ok(Self::new(registry, initial))
    }

    pub fn current(&self) -> Arc<Network> {
        self.current.load_full()
    }

    pub fn chain_id(&self) -> u64 {
        self.current.load().chain_id
    }

    /// Points at `chain_id`. An unregistered id leaves the current network
    /// untouched.
    pub fn switch_chain(&self, chain_id: u64) -> Result<Network, NetworkError> {
        let next = self
            .registry
            .resolve_by_chain_id(chain_id)
            .ok_or(NetworkError::UnsupportedChain(chain_id))?;
        let previous = self.current.swap(Arc::new(next.clone()));
        info!(from = previous.chain_id, to = chain_id, "active network switched");
        Ok(next)
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.registry
    }
}
