//! Architectural Contract Test: Lease Binding Scope
//!
//! This test verifies which addresses a lease pass may touch, depending on
//! whether the overlay has its own link or shares the uplink.
//!
//! Constraints verified:
//! - A shared uplink only loses addresses inside the leased subnet
//! - The uplink's selected address is never removed
//! - A dedicated overlay link is cleaned across the whole overlay network
//! - IPv6 follows the same scope rules when enabled
//!
//! If this test fails, applying a lease can cut the node off its own uplink.

mod common;

use common::*;
use flat_core::host::MemoryHost;
use flat_core::traits::{Interface, IpFamily};
use flat_core::{
    Error, InterfaceResolver, InterfaceSelection, LinkAddressReconciler, NetworkConfig,
    ResolvedInterface,
};
use std::sync::Arc;

/// A cloud-style node whose uplink address sits inside the overlay network
fn cloud_node() -> (MemoryHost, Interface) {
    let host = MemoryHost::new();
    let eth0 = host.add_interface(2, "eth0");
    host.bind(&eth0, addr("10.0.200.5/16"));
    host.add_route(IpFamily::V4, gateway_route(2, "10.0.0.1", "10.0.200.5"));
    (host, eth0)
}

fn uplink_of(host: &MemoryHost, selection: &InterfaceSelection) -> ResolvedInterface {
    InterfaceResolver::new(Arc::new(host.clone()))
        .resolve(selection)
        .unwrap()
}

fn lease(network: &str, subnet: &str) -> NetworkConfig {
    let mut config = NetworkConfig::new(net(subnet));
    config.network = Some(net(network));
    config
}

#[test]
fn shared_uplink_keeps_its_address_inside_the_overlay_network() {
    let (host, eth0) = cloud_node();
    let uplink = uplink_of(&host, &InterfaceSelection::new());
    let reconciler = LinkAddressReconciler::new(Arc::new(host.clone()));
    let lease = lease("10.0.0.0/16", "10.0.1.0/24");

    let outcome = reconciler
        .apply_lease(&lease, &uplink.interface, &uplink, false)
        .unwrap();

    assert!(outcome.v4.removed.is_empty());
    assert!(outcome.v4.added);
    assert_eq!(addresses(&host, &eth0), vec!["10.0.1.1/24", "10.0.200.5/16"]);

    let again = reconciler
        .apply_lease(&lease, &uplink.interface, &uplink, false)
        .unwrap();
    assert!(again.is_noop());
}

#[test]
fn shared_uplink_still_drops_stale_lease_addresses() {
    let (host, eth0) = cloud_node();
    host.bind(&eth0, addr("10.0.1.9/24"));
    host.bind(&eth0, addr("10.0.7.1/24"));
    let uplink = uplink_of(&host, &InterfaceSelection::new());

    let outcome = LinkAddressReconciler::new(Arc::new(host.clone()))
        .apply_lease(&lease("10.0.0.0/16", "10.0.1.0/24"), &eth0, &uplink, false)
        .unwrap();

    assert_eq!(outcome.v4.removed, vec![addr("10.0.1.9/24")]);
    assert_eq!(
        addresses(&host, &eth0),
        vec!["10.0.1.1/24", "10.0.200.5/16", "10.0.7.1/24"]
    );
}

#[test]
fn uplink_address_inside_the_lease_is_refused() {
    let host = MemoryHost::new();
    let eth0 = host.add_interface(2, "eth0");
    host.bind(&eth0, addr("10.0.1.5/16"));
    host.add_route(IpFamily::V4, gateway_route(2, "10.0.0.1", "10.0.1.5"));
    let uplink = uplink_of(&host, &InterfaceSelection::new());

    let err = LinkAddressReconciler::new(Arc::new(host.clone()))
        .apply_lease(&lease("10.0.0.0/16", "10.0.1.0/24"), &eth0, &uplink, false)
        .unwrap_err();

    match err {
        Error::UplinkAddressInLease { link, address, subnet } => {
            assert_eq!(link, "eth0");
            assert_eq!(address, ip("10.0.1.5"));
            assert_eq!(subnet, "10.0.1.0/24");
        }
        other => panic!("expected UplinkAddressInLease, got {other:?}"),
    }
    assert_eq!(host.add_calls(), 0);
    assert_eq!(host.remove_calls(), 0);
    assert_eq!(addresses(&host, &eth0), vec!["10.0.1.5/16"]);
}

#[test]
fn dedicated_link_is_cleaned_across_the_overlay_network() {
    let (host, eth0) = cloud_node();
    let flat0 = host.add_interface(10, "flat0");
    host.bind(&flat0, addr("10.0.7.1/24"));
    host.bind(&flat0, addr("192.168.5.1/24"));
    let uplink = uplink_of(&host, &InterfaceSelection::new());

    let outcome = LinkAddressReconciler::new(Arc::new(host.clone()))
        .apply_lease(&lease("10.0.0.0/16", "10.0.1.0/24"), &flat0, &uplink, false)
        .unwrap();

    assert_eq!(outcome.v4.removed, vec![addr("10.0.7.1/24")]);
    assert_eq!(addresses(&host, &flat0), vec!["10.0.1.1/24", "192.168.5.1/24"]);
    assert_eq!(addresses(&host, &eth0), vec!["10.0.200.5/16"]);
}

#[test]
fn ipv6_scope_follows_the_link_kind() {
    let node = Node::new();
    let uplink = uplink_of(&node.host, &InterfaceSelection::new().with_ipv6(true));
    assert_eq!(uplink.interface, node.eth0);

    let mut config = lease("10.0.0.0/16", "10.0.1.0/24");
    config.ipv6_network = Some(net6("2001:db8::/32"));
    config.ipv6_subnet = Some(net6("2001:db8:0:1::/64"));
    let reconciler = LinkAddressReconciler::new(Arc::new(node.host.clone()));

    let outcome = reconciler
        .apply_lease(&config, &node.eth0, &uplink, true)
        .unwrap();

    let v6 = outcome.v6.unwrap();
    assert!(v6.removed.is_empty());
    assert!(v6.added);
    assert!(addresses(&node.host, &node.eth0).contains(&"2001:db8::10/64".to_string()));

    let flat0 = node.host.add_interface(10, "flat0");
    node.host.bind(&flat0, addr("2001:db8:0:7::1/64"));
    let outcome = reconciler
        .apply_lease(&config, &flat0, &uplink, true)
        .unwrap();

    assert_eq!(outcome.v6.unwrap().removed, vec![addr("2001:db8:0:7::1/64")]);
    assert_eq!(
        addresses(&node.host, &flat0),
        vec!["10.0.1.1/24", "2001:db8:0:1::1/64"]
    );
}

#[test]
fn ipv6_is_skipped_when_disabled() {
    let (host, eth0) = cloud_node();
    let uplink = uplink_of(&host, &InterfaceSelection::new());
    let mut config = lease("10.0.0.0/16", "10.0.1.0/24");
    config.ipv6_subnet = Some(net6("fd00:1::/64"));

    let outcome = LinkAddressReconciler::new(Arc::new(host.clone()))
        .apply_lease(&config, &eth0, &uplink, false)
        .unwrap();

    assert_eq!(outcome.v6, None);
    assert_eq!(addresses(&host, &eth0), vec!["10.0.1.1/24", "10.0.200.5/16"]);
}
