// # File Subnet Manager
//
// Reads the node's network configuration from a JSON file written by
// whatever allocated the lease.
//
// ## File Format
//
// ```json
// {
//   "network": "10.0.0.0/16",
//   "subnet": "10.0.1.0/24",
//   "ipv6_subnet": "fd00:1::/64",
//   "backend_type": "vxlan",
//   "backend": { "vni": 1 },
//   "expiration": "2026-01-09T12:00:00Z"
// }
// ```
//
// The file is re-read on every fetch; nothing is cached between calls.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::Error;
use crate::traits::subnet_manager::{NetworkConfig, SubnetManager};

/// File-backed subnet manager
///
/// # Example
///
/// ```rust,no_run
/// use flat_core::subnet::FileSubnetManager;
/// use flat_core::traits::SubnetManager;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = FileSubnetManager::new("/run/flat/subnet.json");
///     let config = manager.get_network_config().await?;
///     println!("lease: {}", config.subnet);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileSubnetManager {
    path: PathBuf,
}

impl FileSubnetManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate(&self, config: &NetworkConfig) -> Result<(), Error> {
        // The node address is the first host address after the subnet's own
        if config.subnet.prefix_len >= 31 {
            return Err(Error::subnet_manager(format!(
                "{}: subnet {} leaves no host address for the node",
                self.path.display(),
                config.subnet
            )));
        }
        if let Some(subnet) = config.ipv6_subnet
            && subnet.prefix_len >= 127
        {
            return Err(Error::subnet_manager(format!(
                "{}: IPv6 subnet {} leaves no host address for the node",
                self.path.display(),
                subnet
            )));
        }

        if let Some(network) = config.network
            && !network.contains_cidr(&config.subnet)
        {
            return Err(Error::subnet_manager(format!(
                "{}: subnet {} is outside network {}",
                self.path.display(),
                config.subnet,
                network
            )));
        }

        if let (Some(network), Some(subnet)) = (config.ipv6_network, config.ipv6_subnet)
            && (network.prefix_len > subnet.prefix_len || !network.contains(subnet.ip))
        {
            return Err(Error::subnet_manager(format!(
                "{}: IPv6 subnet {} is outside network {}",
                self.path.display(),
                subnet,
                network
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SubnetManager for FileSubnetManager {
    async fn get_network_config(&self) -> Result<NetworkConfig, Error> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::subnet_manager(format!(
                "Failed to read subnet file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let config: NetworkConfig = serde_json::from_str(&content).map_err(|e| {
            Error::subnet_manager(format!(
                "Failed to parse subnet file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        self.validate(&config)?;
        tracing::debug!(
            "Loaded network config from {}: subnet {}",
            self.path.display(),
            config.subnet
        );
        Ok(config)
    }
}
