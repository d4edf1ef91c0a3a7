//! Test fixtures shared by the contract tests
//!
//! Builds in-memory hosts that look like a small two-NIC node.

#![allow(dead_code)]

use flat_core::host::MemoryHost;
use flat_core::traits::{Interface, IpFamily, LinkAddress, Route};
use flat_core::{Ip4Net, Ip6Net};
use std::net::IpAddr;

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

pub fn net(s: &str) -> Ip4Net {
    Ip4Net::parse(s).expect("valid IPv4 CIDR literal")
}

pub fn net6(s: &str) -> Ip6Net {
    Ip6Net::parse(s).expect("valid IPv6 CIDR literal")
}

/// `"10.0.1.1/24"` as a link address
pub fn addr(s: &str) -> LinkAddress {
    let (ip_part, prefix) = s.split_once('/').expect("CIDR literal");
    LinkAddress::new(ip(ip_part), prefix.parse().expect("prefix length"))
}

/// Sorted textual view of a link's addresses, for order-independent asserts
pub fn addresses(host: &MemoryHost, link: &Interface) -> Vec<String> {
    let mut addrs: Vec<String> = host.addresses_on(link).iter().map(|a| a.to_string()).collect();
    addrs.sort();
    addrs
}

pub fn on_link_route(oif: u32, source: &str) -> Route {
    Route {
        destination: None,
        gateway: None,
        source: Some(ip(source)),
        output_interface: Some(oif),
    }
}

pub fn gateway_route(oif: u32, gateway: &str, source: &str) -> Route {
    Route {
        destination: None,
        gateway: Some(ip(gateway)),
        source: Some(ip(source)),
        output_interface: Some(oif),
    }
}

/// A node with three interfaces:
///
/// - `lo` (1): 127.0.0.1/8, ::1/128
/// - `eth0` (2): 169.254.1.10/16 then 192.168.1.10/24, fe80::10/64 then
///   2001:db8::10/64; owns both default routes
/// - `eth1` (3): 10.10.0.5/16, fd00:10::5/64
///
/// Route lookups: 10.10.0.1 is on-link via eth1, 8.8.8.8 goes through the
/// eth0 gateway.
pub struct Node {
    pub host: MemoryHost,
    pub lo: Interface,
    pub eth0: Interface,
    pub eth1: Interface,
}

impl Node {
    pub fn new() -> Self {
        let host = MemoryHost::new();

        let lo = host.add_interface(1, "lo");
        host.bind(&lo, addr("127.0.0.1/8"));
        host.bind(&lo, addr("::1/128"));

        let eth0 = host.add_interface(2, "eth0");
        host.bind(&eth0, addr("169.254.1.10/16"));
        host.bind(&eth0, addr("192.168.1.10/24"));
        host.bind(&eth0, addr("fe80::10/64"));
        host.bind(&eth0, addr("2001:db8::10/64"));

        let eth1 = host.add_interface(3, "eth1");
        host.bind(&eth1, addr("10.10.0.5/16"));
        host.bind(&eth1, addr("fd00:10::5/64"));

        host.add_route(
            IpFamily::V4,
            Route {
                destination: Some((ip("10.10.0.0"), 16)),
                gateway: None,
                source: Some(ip("10.10.0.5")),
                output_interface: Some(3),
            },
        );
        host.add_route(IpFamily::V4, gateway_route(2, "192.168.1.1", "192.168.1.10"));
        host.add_route(
            IpFamily::V6,
            Route {
                destination: Some((ip("::"), 0)),
                gateway: Some(ip("fe80::1")),
                source: None,
                output_interface: Some(2),
            },
        );

        host.set_route_to(ip("10.10.0.1"), vec![on_link_route(3, "10.10.0.5")]);
        host.set_route_to(
            ip("8.8.8.8"),
            vec![gateway_route(2, "192.168.1.1", "192.168.1.10")],
        );

        Self {
            host,
            lo,
            eth0,
            eth1,
        }
    }
}
