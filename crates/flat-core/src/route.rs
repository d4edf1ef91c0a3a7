//! Routing table inspection
//!
//! Read-only questions against the live routing table: which interface owns
//! the default route, which interface and source address the kernel would use
//! for a destination, and whether a destination is on-link.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{Interface, InterfaceTable, IpFamily, RouteTable};

/// Read-only view of the host routing table
pub struct RouteInspector<H: ?Sized> {
    host: Arc<H>,
}

impl<H: ?Sized> Clone for RouteInspector<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
        }
    }
}

impl<H> RouteInspector<H>
where
    H: RouteTable + InterfaceTable + ?Sized,
{
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// The interface owning the default route of `family`.
    ///
    /// # Errors
    ///
    /// - `NoDefaultRoute` if the main table has no default route
    /// - `RouteInterfaceUnresolved` if the default route names no interface
    /// - `InterfaceUnresolved` if the named interface cannot be opened
    pub fn default_gateway_interface(&self, family: IpFamily) -> Result<Interface> {
        let routes = self.host.routes(family)?;
        let route = routes
            .iter()
            .find(|route| route.is_default())
            .ok_or(Error::NoDefaultRoute(family))?;

        let index = match route.output_interface {
            Some(index) if index > 0 => index,
            _ => return Err(Error::RouteInterfaceUnresolved(family)),
        };

        let iface = self
            .host
            .interface_by_index(index)
            .map_err(|e| Error::interface_unresolved(index, e))?;
        debug!("Default {} route leaves via {}", family, iface);
        Ok(iface)
    }

    /// The interface and source address the kernel would use to reach
    /// `destination`. Only the first reported route is considered.
    ///
    /// # Errors
    ///
    /// - `NoRouteToHost` if the kernel reports no route
    /// - `InterfaceUnresolved` if the route's interface cannot be opened
    pub fn route_to(&self, destination: IpAddr) -> Result<(Interface, Option<IpAddr>)> {
        let routes = self.host.route_to(destination)?;
        let route = routes.first().ok_or(Error::NoRouteToHost(destination))?;

        let index = route.output_interface.unwrap_or(0);
        if index == 0 {
            return Err(Error::interface_unresolved(
                index,
                format!("route to {destination} carries no output interface"),
            ));
        }

        let iface = self
            .host
            .interface_by_index(index)
            .map_err(|e| Error::interface_unresolved(index, e))?;
        debug!(
            "Route to {} leaves via {} (source {:?})",
            destination, iface, route.source
        );
        Ok((iface, route.source))
    }

    /// True iff the kernel reports exactly one route to `destination` and
    /// that route has no gateway.
    ///
    /// Ambiguous answers (several candidate routes) count as not directly
    /// reachable. A failed query is an error, never `false`.
    pub fn is_directly_reachable(&self, destination: IpAddr) -> Result<bool> {
        let routes = self.host.route_to(destination)?;
        Ok(matches!(routes.as_slice(), [only] if only.gateway.is_none()))
    }
}
