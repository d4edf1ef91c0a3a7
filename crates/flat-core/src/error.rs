//! Error types for the host network topology layer
//!
//! Every failure carries the address, interface or policy involved so the
//! caller can log it meaningfully. Nothing in this crate retries; retry and
//! backoff belong to the lease-renewal loop that owns the call.

use std::net::IpAddr;

use thiserror::Error;

use crate::traits::IpFamily;

/// Result type alias for flat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the host network topology layer
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed textual address or CIDR
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The interface has no usable address for the family
    #[error("interface {interface} has no {family} address")]
    NoAddress {
        /// Interface name
        interface: String,
        /// Address family that was queried
        family: IpFamily,
    },

    /// No interface carries the requested address
    #[error("no interface carries address {0}")]
    NoMatchingInterface(IpAddr),

    /// Every configured (or implicit) selection policy was exhausted
    #[error("no usable interface found (tried: {0})")]
    NoUsableInterface(String),

    /// The routing table has no default route for the family
    #[error("no default {0} route found")]
    NoDefaultRoute(IpFamily),

    /// The host reported no route for the destination
    #[error("no route to host {0}")]
    NoRouteToHost(IpAddr),

    /// A default route exists but names no usable interface
    #[error("default {0} route found but its interface cannot be determined")]
    RouteInterfaceUnresolved(IpFamily),

    /// The interface a route points at cannot be opened
    #[error("interface {index} cannot be resolved: {reason}")]
    InterfaceUnresolved {
        /// Interface index reported by the route
        index: u32,
        /// Underlying failure
        reason: String,
    },

    /// The host rejected adding an address to a link
    #[error("failed to add address {address} to {link}: {reason}")]
    AddressAdditionFailed {
        /// Link name
        link: String,
        /// Address in CIDR form
        address: String,
        /// Underlying failure
        reason: String,
    },

    /// The host rejected removing an address from a link
    #[error("failed to remove address {address} from {link}: {reason}")]
    AddressRemovalFailed {
        /// Link name
        link: String,
        /// Address in CIDR form
        address: String,
        /// Underlying failure
        reason: String,
    },

    /// The overlay link is the uplink and the uplink's own address lies
    /// inside the lease, so reconciling would remove it
    #[error("refusing to reconcile {link}: uplink address {address} lies inside lease {subnet}")]
    UplinkAddressInLease {
        /// Link name
        link: String,
        /// The uplink address that would be removed
        address: IpAddr,
        /// Leased subnet in CIDR form
        subnet: String,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A host (kernel) query failed outright
    #[error("host query failed: {0}")]
    Host(#[from] std::io::Error),

    /// The subnet manager could not supply a network configuration
    #[error("subnet manager error: {0}")]
    SubnetManager(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an invalid format error
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a "no address" error
    pub fn no_address(interface: impl Into<String>, family: IpFamily) -> Self {
        Self::NoAddress {
            interface: interface.into(),
            family,
        }
    }

    /// Create an interface-unresolved error
    pub fn interface_unresolved(index: u32, reason: impl ToString) -> Self {
        Self::InterfaceUnresolved {
            index,
            reason: reason.to_string(),
        }
    }

    /// Create an address addition error
    pub fn address_addition(
        link: impl Into<String>,
        address: impl ToString,
        reason: impl ToString,
    ) -> Self {
        Self::AddressAdditionFailed {
            link: link.into(),
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an address removal error
    pub fn address_removal(
        link: impl Into<String>,
        address: impl ToString,
        reason: impl ToString,
    ) -> Self {
        Self::AddressRemovalFailed {
            link: link.into(),
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an uplink-address-in-lease error
    pub fn uplink_in_lease(
        link: impl Into<String>,
        address: impl Into<IpAddr>,
        subnet: impl ToString,
    ) -> Self {
        Self::UplinkAddressInLease {
            link: link.into(),
            address: address.into(),
            subnet: subnet.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a subnet manager error
    pub fn subnet_manager(msg: impl Into<String>) -> Self {
        Self::SubnetManager(msg.into())
    }

    /// True for the kinds that mean "this policy found nothing", as opposed
    /// to the host failing to answer at all.
    pub fn is_resolution_miss(&self) -> bool {
        matches!(
            self,
            Self::NoAddress { .. }
                | Self::NoMatchingInterface(_)
                | Self::NoUsableInterface(_)
                | Self::NoDefaultRoute(_)
                | Self::NoRouteToHost(_)
                | Self::RouteInterfaceUnresolved(_)
                | Self::InterfaceUnresolved { .. }
        )
    }
}

