//! Interface resolution
//!
//! Turns an [`InterfaceSelection`] policy into one concrete interface plus
//! the addresses the overlay should advertise for it.
//!
//! ## Precedence
//!
//! ```text
//! explicit names ──► name regexes ──► reachability ──► default gateway
//!      (1)               (2)              (3)              (4)
//! ```
//!
//! Only configured policies take part, except the default gateway which is
//! used when nothing else is configured. The first policy that yields an
//! interface with a usable address wins.

pub mod strategy;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::InterfaceSelection;
use crate::error::{Error, Result};
use crate::ip::{is_global_unicast, is_link_local_unicast};
use crate::route::RouteInspector;
use crate::traits::{HostNetwork, Interface, IpFamily};

pub use strategy::{
    DefaultGateway, ExplicitInterfaces, InterfaceRegex, Reachability, SelectionStrategy,
};

/// The outcome of interface resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterface {
    /// Interface that carries overlay traffic
    pub interface: Interface,
    /// IPv4 address bound to the interface
    pub address: Ipv4Addr,
    /// IPv4 address other nodes should use to reach this one
    pub public_address: Ipv4Addr,
    /// IPv6 address bound to the interface, when IPv6 is enabled
    pub ipv6_address: Option<Ipv6Addr>,
    /// IPv6 address other nodes should use, when IPv6 is enabled
    pub public_ipv6_address: Option<Ipv6Addr>,
}

/// Resolves selection policies against a host
pub struct InterfaceResolver<H: ?Sized> {
    host: Arc<H>,
    routes: RouteInspector<H>,
}

impl<H: HostNetwork + ?Sized> InterfaceResolver<H> {
    pub fn new(host: Arc<H>) -> Self {
        let routes = RouteInspector::new(Arc::clone(&host));
        Self { host, routes }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn routes(&self) -> &RouteInspector<H> {
        &self.routes
    }

    /// Addresses of `family` bound to `iface`, global unicast first and
    /// link-local unicast appended after.
    ///
    /// # Errors
    ///
    /// `NoAddress` if the interface has neither kind.
    pub fn addresses_of(&self, iface: &Interface, family: IpFamily) -> Result<Vec<IpAddr>> {
        let mut global = Vec::new();
        let mut link_local = Vec::new();

        for addr in self.host.addresses(iface, family)? {
            if addr.family() != family {
                continue;
            }
            if is_link_local_unicast(addr.address) {
                link_local.push(addr.address);
            } else if is_global_unicast(addr.address) {
                global.push(addr.address);
            }
        }

        global.extend(link_local);
        if global.is_empty() {
            return Err(Error::no_address(&iface.name, family));
        }
        Ok(global)
    }

    /// True if `iface` carries `target`.
    ///
    /// IPv4 targets compare as 4-byte values and IPv6 targets as full 16-byte
    /// values.
    pub fn matches_address(&self, iface: &Interface, target: IpAddr) -> Result<bool> {
        let family = IpFamily::of(target);
        let addrs = self.host.addresses(iface, family)?;
        Ok(addrs.iter().any(|addr| addr.address == target))
    }

    /// The first interface carrying `target`.
    ///
    /// # Errors
    ///
    /// `NoMatchingInterface` if no interface carries it.
    pub fn interface_for_address(&self, target: IpAddr) -> Result<Interface> {
        for iface in self.host.interfaces()? {
            match self.matches_address(&iface, target) {
                Ok(true) => return Ok(iface),
                Ok(false) => {}
                Err(e) => debug!("Skipping {}: {}", iface.name, e),
            }
        }
        Err(Error::NoMatchingInterface(target))
    }

    /// The interface and source address used to reach `destination`.
    pub fn interface_for_reachability(
        &self,
        destination: IpAddr,
    ) -> Result<(Interface, Option<IpAddr>)> {
        self.routes.route_to(destination)
    }

    /// Build the selection strategies for `selection`, in precedence order.
    pub fn strategies(
        &self,
        selection: &InterfaceSelection,
    ) -> Result<Vec<Box<dyn SelectionStrategy<H>>>> {
        let mut strategies: Vec<Box<dyn SelectionStrategy<H>>> = Vec::new();

        if !selection.interfaces.is_empty() {
            strategies.push(Box::new(ExplicitInterfaces::new(selection.interfaces.clone())));
        }
        if !selection.interface_regexes.is_empty() {
            strategies.push(Box::new(InterfaceRegex::new(selection.compiled_regexes()?)));
        }
        if let Some(destination) = selection.can_reach {
            strategies.push(Box::new(Reachability::new(destination)));
        }
        if strategies.is_empty() {
            strategies.push(Box::new(DefaultGateway));
        }

        Ok(strategies)
    }

    /// Resolve `selection` to one interface.
    ///
    /// # Errors
    ///
    /// `NoUsableInterface` once every policy has been tried without success.
    pub fn resolve(&self, selection: &InterfaceSelection) -> Result<ResolvedInterface> {
        let strategies = self.strategies(selection)?;
        self.resolve_with(&strategies, selection)
    }

    /// Try `strategies` in order, returning the first success.
    pub fn resolve_with(
        &self,
        strategies: &[Box<dyn SelectionStrategy<H>>],
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface> {
        let mut tried = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            match strategy.select(self, selection) {
                Ok(resolved) => {
                    info!(
                        "Using interface {} with address {} (selected by {})",
                        resolved.interface,
                        resolved.address,
                        strategy.describe()
                    );
                    return Ok(resolved);
                }
                Err(e) if e.is_resolution_miss() => {
                    debug!("Selection by {} found nothing: {}", strategy.describe(), e);
                    tried.push(strategy.describe());
                }
                Err(e) => {
                    warn!("Selection by {} failed: {}", strategy.describe(), e);
                    tried.push(strategy.describe());
                }
            }
        }

        Err(Error::NoUsableInterface(tried.join(", ")))
    }

    /// Finish a candidate interface: pick its IPv4 address (and IPv6 address
    /// when enabled) and apply the public address overrides.
    ///
    /// `hint` is an address already known to belong to the interface, such as
    /// the route source address; it wins over enumeration for its family.
    pub fn candidate(
        &self,
        iface: Interface,
        hint: Option<IpAddr>,
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface> {
        let address = match hint {
            Some(IpAddr::V4(v4)) => v4,
            _ => first_v4(&self.addresses_of(&iface, IpFamily::V4)?, &iface)?,
        };

        let ipv6_address = if selection.enable_ipv6 {
            Some(match hint {
                Some(IpAddr::V6(v6)) => v6,
                _ => first_v6(&self.addresses_of(&iface, IpFamily::V6)?, &iface)?,
            })
        } else {
            None
        };

        Ok(ResolvedInterface {
            public_address: selection.public_ip.unwrap_or(address),
            public_ipv6_address: selection.public_ipv6.or(ipv6_address),
            interface: iface,
            address,
            ipv6_address,
        })
    }
}

fn first_v4(addrs: &[IpAddr], iface: &Interface) -> Result<Ipv4Addr> {
    addrs
        .iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::no_address(&iface.name, IpFamily::V4))
}

fn first_v6(addrs: &[IpAddr], iface: &Interface) -> Result<Ipv6Addr> {
    addrs
        .iter()
        .find_map(|addr| match addr {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
        .ok_or_else(|| Error::no_address(&iface.name, IpFamily::V6))
}
