use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::error::RegistryError;
use crate::network::{builtin_networks, Network, NetworkStatus};

type Catalog = BTreeMap<u64, Network>;

/// Catalog of supported chains keyed by chain id.
///
/// Reads take a snapshot and never block; `register` and `set_status` swap in
/// a new catalog, so a failed registration leaves the previous one untouched.
pub struct NetworkRegistry {
    catalog: ArcSwap<Catalog>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self {
            catalog: ArcSwap::from_pointee(Catalog::new()),
        }
    }

    /// A registry preloaded with [`builtin_networks`].
    pub fn with_builtin() -> Self {
        let catalog = builtin_networks()
            .into_iter()
            .map(|n| (n.chain_id, n))
            .collect();
        Self {
            catalog: ArcSwap::from_pointee(catalog),
        }
    }

    pub fn register(&self, network: Network) -> Result<(), RegistryError> {
        network.validate()?;

        let mut outcome = Ok(());
        self.catalog.rcu(|current| {
            if current.contains_key(&network.chain_id) {
                outcome = Err(RegistryError::DuplicateChainId(network.chain_id));
                return Arc::clone(current);
            }
            if current.values().any(|n| n.id == network.id) {
                outcome = Err(RegistryError::DuplicateId(network.id.clone()));
                return Arc::clone(current);
            }
            outcome = Ok(());
            let mut next = Catalog::clone(current);
            next.insert(network.chain_id, network.clone());
            Arc::new(next)
        });

        if outcome.is_ok() {
            info!(chain_id = network.chain_id, id = %network.id, "network registered");
        }
        outcome
    }

    pub fn set_status(&self, chain_id: u64, status: NetworkStatus) -> Result<(), RegistryError> {
        let mut found = false;
        self.catalog.rcu(|current| {
            found = current.contains_key(&chain_id);
            if !found {
                return Arc::clone(current);
            }
            let mut next = Catalog::clone(current);
            if let Some(network) = next.get_mut(&chain_id) {
                network.status = status;
            }
            Arc::new(next)
        });

        if !found {
            return Err(RegistryError::UnknownNetwork(chain_id.to_string()));
        }
        info!(chain_id, status = status.as_str(), "network status updated");
        Ok(())
    }

    pub fn resolve_by_chain_id(&self, chain_id: u64) -> Option<Network> {
        self.catalog.load().get(&chain_id).cloned()
    }

    pub fn resolve_by_id(&self, id: &str) -> Option<Network> {
        self.catalog.load().values().find(|n| n.id == id).cloned()
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.catalog.load().contains_key(&chain_id)
    }

    /// Every registered network, ordered by chain id.
    pub fn all(&self) -> Vec<Network> {
        self.catalog.load().values().cloned().collect()
    }

    /// Networks whose status is not `Inactive`.
    pub fn active(&self) -> Vec<Network> {
        self.catalog
            .load()
            .values()
            .filter(|n| n.status != NetworkStatus::Inactive)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.catalog.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.load().is_empty()
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ETHEREUM, POLYGON};

    fn local_network(chain_id: u64, id: &str) -> Network {
        let mut network = builtin_networks().remove(0);
        network.id = id.to_string();
        network.name = format!("Local {chain_id}");
        network.chain_id = chain_id;
        network.rpc_url = "http://127.0.0.1:8545".into();
        network
    }

    #[test]
    fn builtin_resolves_by_both_keys() {
        let registry = NetworkRegistry::with_builtin();
        assert_eq!(registry.resolve_by_chain_id(POLYGON).unwrap().id, "polygon");
        assert_eq!(registry.resolve_by_id("ethereum").unwrap().chain_id, ETHEREUM);
        assert!(registry.resolve_by_chain_id(999_999).is_none());
        assert!(registry.resolve_by_id("dogechain").is_none());
    }

    #[test]
    fn all_is_ordered_by_chain_id() {
        let registry = NetworkRegistry::with_builtin();
        let ids: Vec<u64> = registry.all().iter().map(|n| n.chain_id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn register_custom_network() {
        let registry = NetworkRegistry::new();
        assert!(registry.is_empty());
        registry.register(local_network(31337, "anvil")).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(31337));
    }

    #[test]
    fn duplicate_chain_id_leaves_catalog_unchanged() {
        let registry = NetworkRegistry::with_builtin();
        let before = registry.all();

        let err = registry
            .register(local_network(ETHEREUM, "shadow-eth"))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateChainId(ETHEREUM));
        assert_eq!(registry.all(), before);
        assert!(registry.resolve_by_id("shadow-eth").is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let registry = NetworkRegistry::with_builtin();
        let err = registry.register(local_network(31337, "ethereum")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("ethereum".into()));
        assert!(!registry.contains(31337));
    }

    #[test]
    fn invalid_url_rejected() {
        let registry = NetworkRegistry::new();
        let mut network = local_network(31337, "anvil");
        network.explorer_url = "nope".into();
        assert!(matches!(
            registry.register(network),
            Err(RegistryError::InvalidUrl { field: "explorer", .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn status_updates_and_active_filter() {
        let registry = NetworkRegistry::with_builtin();
        let total = registry.len();

        registry.set_status(POLYGON, NetworkStatus::Inactive).unwrap();
        assert_eq!(
            registry.resolve_by_chain_id(POLYGON).unwrap().status,
            NetworkStatus::Inactive
        );
        assert_eq!(registry.active().len(), total - 1);

        registry.set_status(POLYGON, NetworkStatus::Maintenance).unwrap();
        assert_eq!(registry.active().len(), total);

        assert!(matches!(
            registry.set_status(424242, NetworkStatus::Active),
            Err(RegistryError::UnknownNetwork(_))
        ));
    }
}
