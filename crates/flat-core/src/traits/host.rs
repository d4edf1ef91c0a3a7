// # Host Capability Traits
//
// Narrow views of the host's network state. Interfaces and links are plain
// identifiers; all behaviour lives behind these capabilities.
//
// ## Implementations
//
// - rtnetlink (Linux): `flat-netlink` crate
// - In-memory: `flat_core::host::MemoryHost` (tests, embedding)
//
// ## Rules
//
// Implementations never cache: every call reads the host as it is now.
// Results are snapshots and may already be stale when returned if another
// process is changing routes or addresses concurrently.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ip::{Ip4Net, Ip6Net};

/// Address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("IPv4"),
            IpFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Handle to an OS network interface
///
/// Discovered per call, never held across reconciliation ticks: interfaces
/// can be hot-plugged or renamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interface {
    /// Kernel interface index (always > 0 for a real interface)
    pub index: u32,
    /// Interface name, e.g. `eth0`
    pub name: String,
}

impl Interface {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (index {})", self.name, self.index)
    }
}

/// An address bound to a link, as the host reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl LinkAddress {
    pub fn new(address: impl Into<IpAddr>, prefix_len: u8) -> Self {
        Self {
            address: address.into(),
            prefix_len,
        }
    }

    pub fn family(&self) -> IpFamily {
        IpFamily::of(self.address)
    }
}

impl From<Ip4Net> for LinkAddress {
    fn from(net: Ip4Net) -> Self {
        LinkAddress::new(net.ip, net.prefix_len)
    }
}

impl From<Ip6Net> for LinkAddress {
    fn from(net: Ip6Net) -> Self {
        LinkAddress::new(net.ip, net.prefix_len)
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// One routing table entry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    /// Destination block; `None` when the kernel omits it (default route)
    pub destination: Option<(IpAddr, u8)>,
    /// Next hop; `None` for on-link routes
    pub gateway: Option<IpAddr>,
    /// Preferred source address
    pub source: Option<IpAddr>,
    /// Output interface index; `None` or `Some(0)` when unknown
    pub output_interface: Option<u32>,
}

impl Route {
    /// True for `0.0.0.0/0`, `::/0` or a route with no destination at all.
    pub fn is_default(&self) -> bool {
        match self.destination {
            None => true,
            Some((_, prefix_len)) => prefix_len == 0,
        }
    }
}

/// Enumerate OS network interfaces
pub trait InterfaceTable: Send + Sync {
    /// All interfaces, in kernel index order.
    fn interfaces(&self) -> Result<Vec<Interface>>;

    /// Open an interface by index.
    fn interface_by_index(&self, index: u32) -> Result<Interface>;

    /// Open an interface by name.
    fn interface_by_name(&self, name: &str) -> Result<Interface>;
}

/// Read the kernel routing table
pub trait RouteTable: Send + Sync {
    /// Main-table routes of one family.
    fn routes(&self, family: IpFamily) -> Result<Vec<Route>>;

    /// Ask the kernel which route(s) it would use to reach `destination`.
    ///
    /// An unreachable destination yields an empty list, not an error.
    fn route_to(&self, destination: IpAddr) -> Result<Vec<Route>>;
}

/// Read and mutate the addresses bound to a link
pub trait LinkAddresses: Send + Sync {
    /// Addresses of `family` currently bound to `link`.
    fn addresses(&self, link: &Interface, family: IpFamily) -> Result<Vec<LinkAddress>>;

    /// Bind `address` to `link`.
    fn add_address(&self, link: &Interface, address: &LinkAddress) -> Result<()>;

    /// Unbind `address` from `link`.
    fn remove_address(&self, link: &Interface, address: &LinkAddress) -> Result<()>;
}

/// Everything the resolver and reconciler need from a host
pub trait HostNetwork: InterfaceTable + RouteTable + LinkAddresses {}

impl<T> HostNetwork for T where T: InterfaceTable + RouteTable + LinkAddresses + ?Sized {}
