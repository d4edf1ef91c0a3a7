// # Static Subnet Manager
//
// In-memory implementation of SubnetManager.
//
// ## Purpose
//
// Hands out whatever configuration it was given. Useful for tests and for
// embedding the core in a process that already knows its lease.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::subnet_manager::{NetworkConfig, SubnetManager};

/// In-memory subnet manager
#[derive(Debug, Clone, Default)]
pub struct StaticSubnetManager {
    inner: Arc<RwLock<Option<NetworkConfig>>>,
    fetches: Arc<AtomicUsize>,
}

impl StaticSubnetManager {
    /// Create a manager with no configuration yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager serving `config`
    pub fn with_config(config: NetworkConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(config))),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the served configuration (a lease renewal or change)
    pub async fn set(&self, config: NetworkConfig) {
        *self.inner.write().await = Some(config);
    }

    /// Stop serving any configuration
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Number of get_network_config() calls so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubnetManager for StaticSubnetManager {
    async fn get_network_config(&self) -> Result<NetworkConfig, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::subnet_manager("No network configuration available"))
    }
}
