// # Subnet Manager Trait
//
// The boundary to the lease allocation system. This crate never allocates or
// persists leases; it only asks for the current network configuration.
//
// ## Usage
//
// ```rust,ignore
// use flat_core::traits::{SubnetManager, fetch_network_config};
//
// let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
// let config = fetch_network_config(&manager, async {
//     let _ = cancel_rx.await;
// })
// .await?;
// println!("lease: {}", config.subnet);
// ```

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ip::{Ip4Net, Ip6Net};

/// Network configuration and lease for this node
///
/// An immutable snapshot, valid until the next fetch. Optional networks are
/// `None` when unset; the zero [`Ip4Net`] is never used to mean "absent"
/// here because `0.0.0.0/0` is a legal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Whole overlay network the lease was carved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Ip4Net>,

    /// Subnet leased to this node
    pub subnet: Ip4Net,

    /// IPv6 overlay network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_network: Option<Ip6Net>,

    /// IPv6 subnet leased to this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_subnet: Option<Ip6Net>,

    /// Encapsulation backend name (e.g. "vxlan", "host-gw")
    #[serde(default)]
    pub backend_type: String,

    /// Backend-specific settings, opaque to this crate
    #[serde(default)]
    pub backend: serde_json::Value,

    /// When the lease expires, if the manager reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl NetworkConfig {
    pub fn new(subnet: Ip4Net) -> Self {
        Self {
            network: None,
            subnet,
            ipv6_network: None,
            ipv6_subnet: None,
            backend_type: String::new(),
            backend: serde_json::Value::Null,
            expiration: None,
        }
    }

    /// The address this node binds inside its lease: the first host address
    /// of the subnet, carrying the subnet's prefix length. Leases of /31 and
    /// longer have no such address; `FileSubnetManager` rejects them.
    pub fn node_address(&self) -> Ip4Net {
        let mut addr = self.subnet.network();
        addr.increment_ip();
        addr
    }

    /// Block in which any address other than the node address is stale: the
    /// whole overlay network when known, otherwise the lease itself.
    pub fn reconcile_scope(&self) -> Ip4Net {
        self.network.unwrap_or(self.subnet)
    }

    /// IPv6 counterpart of [`NetworkConfig::reconcile_scope`].
    pub fn reconcile_scope_v6(&self) -> Option<Ip6Net> {
        self.ipv6_network.or(self.ipv6_subnet)
    }

    /// IPv6 counterpart of [`NetworkConfig::node_address`].
    pub fn node_address_v6(&self) -> Option<Ip6Net> {
        self.ipv6_subnet.map(|subnet| {
            let base = u128::from(subnet.network().ip);
            Ip6Net::new(base.wrapping_add(1).into(), subnet.prefix_len)
        })
    }

    /// True if the lease expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expiration.is_some_and(|expiry| expiry - now <= margin)
    }
}

/// Source of this node's network configuration
#[async_trait]
pub trait SubnetManager: Send + Sync {
    /// Fetch the current network configuration.
    ///
    /// Dropping the returned future must abandon the fetch.
    async fn get_network_config(&self) -> Result<NetworkConfig>;
}

/// Fetch the network configuration, abandoning the call as soon as `cancel`
/// completes.
pub async fn fetch_network_config<M, C>(manager: &M, cancel: C) -> Result<NetworkConfig>
where
    M: SubnetManager + ?Sized,
    C: Future<Output = ()>,
{
    tokio::select! {
        config = manager.get_network_config() => config,
        _ = cancel => Err(Error::Cancelled),
    }
}
