//! Configuration types for the host network topology layer
//!
//! This module defines the interface selection policy and the agent settings
//! the daemon builds from its environment.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// How to pick the interface that carries overlay traffic
    #[serde(default)]
    pub selection: InterfaceSelection,

    /// JSON file holding the network configuration and lease
    pub subnet_file: PathBuf,

    /// Link that receives the lease address; defaults to the selected
    /// interface
    #[serde(default)]
    pub overlay_link: Option<String>,

    /// Seconds between reconciliation passes
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Re-fetch the lease when it expires within this many seconds
    #[serde(default = "default_lease_renew_margin_secs")]
    pub lease_renew_margin_secs: u64,
}

impl AgentConfig {
    /// Create a new configuration with defaults
    pub fn new(subnet_file: impl Into<PathBuf>) -> Self {
        Self {
            selection: InterfaceSelection::default(),
            subnet_file: subnet_file.into(),
            overlay_link: None,
            resync_interval_secs: default_resync_interval_secs(),
            lease_renew_margin_secs: default_lease_renew_margin_secs(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.selection.validate()?;

        if self.subnet_file.as_os_str().is_empty() {
            return Err(crate::Error::config("Subnet file path cannot be empty"));
        }
        if self.resync_interval_secs == 0 {
            return Err(crate::Error::config("Resync interval must be > 0"));
        }
        if let Some(link) = &self.overlay_link
            && link.trim().is_empty()
        {
            return Err(crate::Error::config("Overlay link name cannot be empty"));
        }

        Ok(())
    }
}

fn default_resync_interval_secs() -> u64 {
    60
}

fn default_lease_renew_margin_secs() -> u64 {
    60
}

/// Interface selection policy
///
/// Policies apply in a fixed precedence order, first success wins:
///
/// 1. `interfaces`: names (or addresses), tried in list order
/// 2. `interface_regexes`: first interface whose name matches
/// 3. `can_reach`: the interface the kernel would route through
/// 4. the default gateway interface (also the implicit policy when nothing
///    else is configured)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSelection {
    /// Interface names; an entry that parses as an IP address selects the
    /// interface carrying that address
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// Regular expressions matched against interface names
    #[serde(default)]
    pub interface_regexes: Vec<String>,

    /// Destination whose route decides the interface
    #[serde(default)]
    pub can_reach: Option<IpAddr>,

    /// Externally visible IPv4 address, if it differs from the interface's
    #[serde(default)]
    pub public_ip: Option<Ipv4Addr>,

    /// Externally visible IPv6 address, if it differs from the interface's
    #[serde(default)]
    pub public_ipv6: Option<Ipv6Addr>,

    /// Also resolve an IPv6 address on the chosen interface
    #[serde(default)]
    pub enable_ipv6: bool,
}

impl InterfaceSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn with_interface_regex(mut self, pattern: impl Into<String>) -> Self {
        self.interface_regexes.push(pattern.into());
        self
    }

    pub fn with_can_reach(mut self, destination: IpAddr) -> Self {
        self.can_reach = Some(destination);
        self
    }

    pub fn with_public_ip(mut self, ip: Ipv4Addr) -> Self {
        self.public_ip = Some(ip);
        self
    }

    pub fn with_ipv6(mut self, enabled: bool) -> Self {
        self.enable_ipv6 = enabled;
        self
    }

    /// Validate the selection policy
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interfaces.iter().any(|name| name.trim().is_empty()) {
            return Err(crate::Error::config("Interface names cannot be empty"));
        }
        self.compiled_regexes()?;
        Ok(())
    }

    /// Compile `interface_regexes`, in order.
    pub fn compiled_regexes(&self) -> Result<Vec<Regex>, crate::Error> {
        self.interface_regexes
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    crate::Error::config(format!("Invalid interface regex {pattern:?}: {e}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_validate() {
        assert!(InterfaceSelection::new().validate().is_ok());
        assert!(
            InterfaceSelection::new()
                .with_interface("eth0")
                .with_interface_regex("^en.*")
                .validate()
                .is_ok()
        );
        assert!(InterfaceSelection::new().with_interface(" ").validate().is_err());
        assert!(
            InterfaceSelection::new()
                .with_interface_regex("(unclosed")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_agent_config_defaults() {
        let json = r#"{"subnet_file": "/run/flat/subnet.json"}"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.resync_interval_secs, 60);
        assert_eq!(config.lease_renew_margin_secs, 60);
        assert_eq!(config.selection, InterfaceSelection::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_agent_config_validate() {
        let mut config = AgentConfig::new("/run/flat/subnet.json");
        config.resync_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::new("");
        config.resync_interval_secs = 5;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::new("/run/flat/subnet.json");
        config.overlay_link = Some(String::new());
        assert!(config.validate().is_err());
    }
}
