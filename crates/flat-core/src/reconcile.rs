//! Link address reconciliation
//!
//! Makes a link converge to "exactly the desired address inside the leased
//! subnet". Addresses outside the subnet belong to someone else and are left
//! alone.
//!
//! ## Pass
//!
//! 1. List the link's live addresses of the family
//! 2. Exact match with the desired address: keep it
//! 3. Inside the subnet but different: remove it (stale lease)
//! 4. Add the desired address if it was not already present
//!
//! ## Scope
//!
//! [`LinkAddressReconciler::apply_lease`] picks the block that counts as
//! stale. A dedicated overlay link owns the whole overlay network. When the
//! overlay shares the uplink, only the leased subnet is in scope, and the
//! pass is refused outright if the uplink's own address lies inside it.
//!
//! The reconciler keeps no state between passes; the live address list is
//! the only source of truth. Callers must not run two passes for the same
//! link concurrently.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ip::{Ip4, Ip4Net, Ip6Net};
use crate::resolver::ResolvedInterface;
use crate::traits::{Interface, IpFamily, LinkAddress, LinkAddresses, NetworkConfig};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Stale addresses removed from the link
    pub removed: Vec<LinkAddress>,
    /// True if the desired address had to be added
    pub added: bool,
}

impl ReconcileOutcome {
    /// True if the pass left the link untouched.
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && !self.added
    }
}

/// What applying a lease changed, per family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseOutcome {
    pub v4: ReconcileOutcome,
    /// `None` when IPv6 is disabled or the lease has no IPv6 subnet
    pub v6: Option<ReconcileOutcome>,
}

impl LeaseOutcome {
    pub fn is_noop(&self) -> bool {
        self.v4.is_noop() && self.v6.as_ref().is_none_or(ReconcileOutcome::is_noop)
    }
}

/// Converges link addresses to the current lease
pub struct LinkAddressReconciler<L: ?Sized> {
    links: Arc<L>,
}

impl<L: ?Sized> Clone for LinkAddressReconciler<L> {
    fn clone(&self) -> Self {
        Self {
            links: Arc::clone(&self.links),
        }
    }
}

impl<L: LinkAddresses + ?Sized> LinkAddressReconciler<L> {
    pub fn new(links: Arc<L>) -> Self {
        Self { links }
    }

    /// Bind the lease's node addresses to `link`.
    ///
    /// `uplink` is the interface the resolver selected. If `link` is that
    /// same interface the scope narrows to the leased subnet, so the uplink's
    /// other addresses survive.
    ///
    /// # Errors
    ///
    /// - `UplinkAddressInLease` if `link` is the uplink and its selected
    ///   address falls inside the lease; nothing is touched
    /// - Any error of [`LinkAddressReconciler::ensure_v4`]
    pub fn apply_lease(
        &self,
        lease: &NetworkConfig,
        link: &Interface,
        uplink: &ResolvedInterface,
        enable_ipv6: bool,
    ) -> Result<LeaseOutcome> {
        let shared = link.index == uplink.interface.index;
        let v6_lease = match (enable_ipv6, lease.node_address_v6()) {
            (true, Some(address)) => {
                let scope = if shared {
                    lease.ipv6_subnet
                } else {
                    lease.reconcile_scope_v6()
                };
                scope.map(|scope| (address, scope))
            }
            _ => None,
        };

        if shared {
            if lease.subnet.contains(Ip4::from(uplink.address)) {
                return Err(Error::uplink_in_lease(&link.name, uplink.address, lease.subnet));
            }
            if let (Some((_, scope)), Some(v6)) = (v6_lease, uplink.ipv6_address)
                && scope.contains(v6)
            {
                return Err(Error::uplink_in_lease(&link.name, v6, scope));
            }
            debug!("{} is also the uplink, limiting scope to {}", link.name, lease.subnet);
        }

        let scope = if shared {
            lease.subnet
        } else {
            lease.reconcile_scope()
        };
        let v4 = self.ensure_v4(lease.node_address(), scope, link)?;
        let v6 = match v6_lease {
            Some((address, scope)) => Some(self.ensure_v6(address, scope, link)?),
            None => None,
        };

        Ok(LeaseOutcome { v4, v6 })
    }

    /// Ensure `link` carries `desired` and no other address inside `subnet`.
    ///
    /// # Errors
    ///
    /// - `AddressRemovalFailed` if a stale address cannot be removed; the
    ///   pass stops there and nothing is added
    /// - `AddressAdditionFailed` if the desired address cannot be added
    pub fn ensure_v4(
        &self,
        desired: Ip4Net,
        subnet: Ip4Net,
        link: &Interface,
    ) -> Result<ReconcileOutcome> {
        self.ensure(desired.into(), IpFamily::V4, link, |ip| match ip {
            IpAddr::V4(v4) => subnet.contains(Ip4::from(v4)),
            IpAddr::V6(_) => false,
        })
    }

    /// IPv6 mirror of [`LinkAddressReconciler::ensure_v4`].
    pub fn ensure_v6(
        &self,
        desired: Ip6Net,
        subnet: Ip6Net,
        link: &Interface,
    ) -> Result<ReconcileOutcome> {
        self.ensure(desired.into(), IpFamily::V6, link, |ip| match ip {
            IpAddr::V6(v6) => subnet.contains(v6),
            IpAddr::V4(_) => false,
        })
    }

    fn ensure(
        &self,
        desired: LinkAddress,
        family: IpFamily,
        link: &Interface,
        in_subnet: impl Fn(IpAddr) -> bool,
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        let mut present = false;

        for existing in self.links.addresses(link, family)? {
            if existing == desired {
                present = true;
                continue;
            }

            if in_subnet(existing.address) {
                self.links
                    .remove_address(link, &existing)
                    .map_err(|e| Error::address_removal(&link.name, existing, e))?;
                info!("Removed stale address {} from {}", existing, link.name);
                outcome.removed.push(existing);
            }
        }

        if present {
            debug!("{} already carries {}", link.name, desired);
        } else {
            self.links
                .add_address(link, &desired)
                .map_err(|e| Error::address_addition(&link.name, desired, e))?;
            info!("Added address {} to {}", desired, link.name);
            outcome.added = true;
        }

        Ok(outcome)
    }
}
