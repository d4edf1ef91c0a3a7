// # Memory Host
//
// In-memory implementation of the host capability traits.
//
// ## Purpose
//
// Stands in for the kernel so that interface resolution and address
// reconciliation can be exercised without privileges or network namespaces.
// Mutations behave like the kernel's: adding an address twice is rejected,
// removing an absent one is rejected.
//
// ## Fault injection
//
// Address additions, removals and route queries can be made to fail to
// exercise the error paths of callers.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::Error;
use crate::error::Result;
use crate::traits::{
    Interface, InterfaceTable, IpFamily, LinkAddress, LinkAddresses, Route, RouteTable,
};

#[derive(Debug, Default)]
struct HostState {
    interfaces: BTreeMap<u32, String>,
    addresses: HashMap<u32, Vec<LinkAddress>>,
    routes: Vec<(IpFamily, Route)>,
    lookups: HashMap<IpAddr, Vec<Route>>,
    fail_additions: bool,
    fail_removals: bool,
    fail_route_queries: bool,
}

/// In-memory host network implementation
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
///
/// # Example
///
/// ```rust
/// use flat_core::host::MemoryHost;
/// use flat_core::traits::{IpFamily, LinkAddress, LinkAddresses};
///
/// let host = MemoryHost::new();
/// let eth0 = host.add_interface(2, "eth0");
/// host.bind(&eth0, LinkAddress::new([10, 0, 0, 5], 24));
///
/// let addrs = host.addresses(&eth0, IpFamily::V4).unwrap();
/// assert_eq!(addrs.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    inner: Arc<RwLock<HostState>>,
    add_calls: Arc<AtomicUsize>,
    remove_calls: Arc<AtomicUsize>,
}

impl MemoryHost {
    /// Create an empty host with no interfaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in an interface
    pub fn add_interface(&self, index: u32, name: impl Into<String>) -> Interface {
        let iface = Interface::new(index, name);
        let mut state = self.inner.write().unwrap();
        state.interfaces.insert(index, iface.name.clone());
        state.addresses.entry(index).or_default();
        iface
    }

    /// Unplug an interface together with its addresses
    pub fn remove_interface(&self, index: u32) {
        let mut state = self.inner.write().unwrap();
        state.interfaces.remove(&index);
        state.addresses.remove(&index);
    }

    /// Bind an address out of band, as another process would
    pub fn bind(&self, link: &Interface, address: LinkAddress) {
        let mut state = self.inner.write().unwrap();
        state.addresses.entry(link.index).or_default().push(address);
    }

    /// Snapshot of every address on a link, all families, in bind order
    pub fn addresses_on(&self, link: &Interface) -> Vec<LinkAddress> {
        let state = self.inner.read().unwrap();
        state.addresses.get(&link.index).cloned().unwrap_or_default()
    }

    /// Add a main-table route
    pub fn add_route(&self, family: IpFamily, route: Route) {
        self.inner.write().unwrap().routes.push((family, route));
    }

    /// Set the answer the kernel gives when asked how to reach `destination`
    pub fn set_route_to(&self, destination: IpAddr, routes: Vec<Route>) {
        self.inner.write().unwrap().lookups.insert(destination, routes);
    }

    /// Make every address addition fail
    pub fn fail_additions(&self, fail: bool) {
        self.inner.write().unwrap().fail_additions = fail;
    }

    /// Make every address removal fail
    pub fn fail_removals(&self, fail: bool) {
        self.inner.write().unwrap().fail_removals = fail;
    }

    /// Make every route query fail
    pub fn fail_route_queries(&self, fail: bool) {
        self.inner.write().unwrap().fail_route_queries = fail;
    }

    /// Number of add_address() calls so far
    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    /// Number of remove_address() calls so far
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    fn lookup_interface(state: &HostState, index: u32) -> Result<Interface> {
        state
            .interfaces
            .get(&index)
            .map(|name| Interface::new(index, name.clone()))
            .ok_or_else(|| no_such_device(format!("no interface with index {index}")))
    }
}

fn no_such_device(msg: String) -> Error {
    Error::Host(io::Error::new(io::ErrorKind::NotFound, msg))
}

impl InterfaceTable for MemoryHost {
    fn interfaces(&self) -> Result<Vec<Interface>> {
        let state = self.inner.read().unwrap();
        Ok(state
            .interfaces
            .iter()
            .map(|(index, name)| Interface::new(*index, name.clone()))
            .collect())
    }

    fn interface_by_index(&self, index: u32) -> Result<Interface> {
        let state = self.inner.read().unwrap();
        Self::lookup_interface(&state, index)
    }

    fn interface_by_name(&self, name: &str) -> Result<Interface> {
        let state = self.inner.read().unwrap();
        state
            .interfaces
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(index, n)| Interface::new(*index, n.clone()))
            .ok_or_else(|| no_such_device(format!("no interface named {name}")))
    }
}

impl RouteTable for MemoryHost {
    fn routes(&self, family: IpFamily) -> Result<Vec<Route>> {
        let state = self.inner.read().unwrap();
        if state.fail_route_queries {
            return Err(Error::Host(io::Error::other("route dump refused")));
        }
        Ok(state
            .routes
            .iter()
            .filter(|(f, _)| *f == family)
            .map(|(_, route)| route.clone())
            .collect())
    }

    fn route_to(&self, destination: IpAddr) -> Result<Vec<Route>> {
        let state = self.inner.read().unwrap();
        if state.fail_route_queries {
            return Err(Error::Host(io::Error::other("route query refused")));
        }
        Ok(state.lookups.get(&destination).cloned().unwrap_or_default())
    }
}

impl LinkAddresses for MemoryHost {
    fn addresses(&self, link: &Interface, family: IpFamily) -> Result<Vec<LinkAddress>> {
        let state = self.inner.read().unwrap();
        Self::lookup_interface(&state, link.index)?;
        Ok(state
            .addresses
            .get(&link.index)
            .map(|addrs| {
                addrs
                    .iter()
                    .filter(|addr| addr.family() == family)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn add_address(&self, link: &Interface, address: &LinkAddress) -> Result<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.write().unwrap();
        if state.fail_additions {
            return Err(Error::Host(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )));
        }
        Self::lookup_interface(&state, link.index)?;

        let addrs = state.addresses.entry(link.index).or_default();
        if addrs.contains(address) {
            return Err(Error::Host(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{address} already on {}", link.name),
            )));
        }
        addrs.push(*address);
        Ok(())
    }

    fn remove_address(&self, link: &Interface, address: &LinkAddress) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.inner.write().unwrap();
        if state.fail_removals {
            return Err(Error::Host(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )));
        }
        Self::lookup_interface(&state, link.index)?;

        let addrs = state.addresses.entry(link.index).or_default();
        let before = addrs.len();
        addrs.retain(|a| a != address);
        if addrs.len() == before {
            return Err(Error::Host(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{address} not on {}", link.name),
            )));
        }
        Ok(())
    }
}
