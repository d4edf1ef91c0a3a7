//! Interface selection strategies
//!
//! Each strategy implements one selection policy. The resolver holds them in
//! precedence order and stops at the first that yields an interface with a
//! usable address.

use std::net::IpAddr;

use regex::Regex;
use tracing::debug;

use super::{InterfaceResolver, ResolvedInterface};
use crate::config::InterfaceSelection;
use crate::error::{Error, Result};
use crate::traits::{HostNetwork, IpFamily};

/// One interface selection policy
pub trait SelectionStrategy<H: HostNetwork + ?Sized>: Send + Sync {
    /// Short description used in logs and in `NoUsableInterface` errors
    fn describe(&self) -> String;

    /// Try to pick an interface.
    fn select(
        &self,
        resolver: &InterfaceResolver<H>,
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface>;
}

/// Explicit interface names (or addresses), tried in list order
pub struct ExplicitInterfaces {
    entries: Vec<String>,
}

impl ExplicitInterfaces {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }
}

impl<H: HostNetwork + ?Sized> SelectionStrategy<H> for ExplicitInterfaces {
    fn describe(&self) -> String {
        format!("interfaces {:?}", self.entries)
    }

    fn select(
        &self,
        resolver: &InterfaceResolver<H>,
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface> {
        let mut last_err = None;

        for entry in &self.entries {
            let attempt = match entry.parse::<IpAddr>() {
                Ok(ip) => resolver
                    .interface_for_address(ip)
                    .and_then(|iface| resolver.candidate(iface, Some(ip), selection)),
                Err(_) => resolver
                    .host()
                    .interface_by_name(entry)
                    .and_then(|iface| resolver.candidate(iface, None, selection)),
            };

            match attempt {
                Ok(resolved) => return Ok(resolved),
                Err(e) => {
                    debug!("Could not use interface {}: {}", entry, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::config("No interfaces configured")))
    }
}

/// Interface names matched by regular expression
pub struct InterfaceRegex {
    patterns: Vec<Regex>,
}

impl InterfaceRegex {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }
}

impl<H: HostNetwork + ?Sized> SelectionStrategy<H> for InterfaceRegex {
    fn describe(&self) -> String {
        let patterns: Vec<&str> = self.patterns.iter().map(Regex::as_str).collect();
        format!("interface regexes {patterns:?}")
    }

    fn select(
        &self,
        resolver: &InterfaceResolver<H>,
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface> {
        let interfaces = resolver.host().interfaces()?;

        for pattern in &self.patterns {
            for iface in interfaces.iter().filter(|i| pattern.is_match(&i.name)) {
                match resolver.candidate(iface.clone(), None, selection) {
                    Ok(resolved) => return Ok(resolved),
                    Err(e) => debug!(
                        "Interface {} matches {} but is unusable: {}",
                        iface.name,
                        pattern.as_str(),
                        e
                    ),
                }
            }
        }

        Err(Error::NoUsableInterface(<Self as SelectionStrategy<H>>::describe(self)))
    }
}

/// The interface the kernel routes a given destination through
pub struct Reachability {
    destination: IpAddr,
}

impl Reachability {
    pub fn new(destination: IpAddr) -> Self {
        Self { destination }
    }
}

impl<H: HostNetwork + ?Sized> SelectionStrategy<H> for Reachability {
    fn describe(&self) -> String {
        format!("route to {}", self.destination)
    }

    fn select(
        &self,
        resolver: &InterfaceResolver<H>,
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface> {
        let (iface, source) = resolver.interface_for_reachability(self.destination)?;
        resolver.candidate(iface, source, selection)
    }
}

/// The interface owning the IPv4 default route
pub struct DefaultGateway;

impl<H: HostNetwork + ?Sized> SelectionStrategy<H> for DefaultGateway {
    fn describe(&self) -> String {
        "default gateway".to_string()
    }

    fn select(
        &self,
        resolver: &InterfaceResolver<H>,
        selection: &InterfaceSelection,
    ) -> Result<ResolvedInterface> {
        let iface = resolver
            .routes()
            .default_gateway_interface(IpFamily::V4)?;
        resolver.candidate(iface, None, selection)
    }
}
