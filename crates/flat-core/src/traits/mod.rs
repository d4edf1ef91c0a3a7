//! Core traits for the host network topology layer
//!
//! This module defines the capabilities the core consumes:
//!
//! - [`InterfaceTable`]: enumerate OS interfaces
//! - [`RouteTable`]: read the kernel routing table
//! - [`LinkAddresses`]: read/add/remove addresses on a link
//! - [`SubnetManager`]: fetch this node's lease

pub mod host;
pub mod subnet_manager;

pub use host::{
    HostNetwork, Interface, InterfaceTable, IpFamily, LinkAddress, LinkAddresses, Route,
    RouteTable,
};
pub use subnet_manager::{NetworkConfig, SubnetManager, fetch_network_config};
