//! rtnetlink message construction and decoding
//!
//! Pure conversions between netlink-packet-route messages and the flat-core
//! host types. Nothing here touches a socket.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use flat_core::Ip4Net;
use flat_core::traits::{Interface, IpFamily, LinkAddress, Route};
use netlink_packet_route::nlas::address::Nla as AddressNla;
use netlink_packet_route::nlas::link::Nla as LinkNla;
use netlink_packet_route::nlas::route::Nla as RouteNla;
use netlink_packet_route::{
    AF_INET, AF_INET6, AddressMessage, LinkMessage, RT_TABLE_MAIN, RouteMessage,
};

pub(crate) fn family_code(family: IpFamily) -> u8 {
    match family {
        IpFamily::V4 => AF_INET as u8,
        IpFamily::V6 => AF_INET6 as u8,
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Some(IpAddr::V4(Ipv4Addr::from(octets)));
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Some(IpAddr::V6(Ipv6Addr::from(octets)));
    }
    None
}

fn ip_to_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// RTM_GETLINK for a single interface index
pub(crate) fn link_get_message(index: u32) -> LinkMessage {
    let mut msg = LinkMessage::default();
    msg.header.index = index;
    msg
}

/// RTM_GETLINK dump request
pub(crate) fn link_dump_message() -> LinkMessage {
    LinkMessage::default()
}

pub(crate) fn interface_from_message(msg: &LinkMessage) -> Option<Interface> {
    msg.nlas.iter().find_map(|nla| match nla {
        LinkNla::IfName(name) => Some(Interface::new(msg.header.index, name.clone())),
        _ => None,
    })
}

/// RTM_GETROUTE dump request for one family
pub(crate) fn route_dump_message(family: IpFamily) -> RouteMessage {
    let mut msg = RouteMessage::default();
    msg.header.address_family = family_code(family);
    msg
}

/// RTM_GETROUTE lookup for a single destination
pub(crate) fn route_get_message(destination: IpAddr) -> RouteMessage {
    let family = IpFamily::of(destination);
    let mut msg = RouteMessage::default();
    msg.header.address_family = family_code(family);
    msg.header.destination_prefix_length = match family {
        IpFamily::V4 => 32,
        IpFamily::V6 => 128,
    };
    msg.nlas.push(RouteNla::Destination(ip_to_bytes(destination)));
    msg
}

/// True for routes of the main table. Table ids above 255 only appear in the
/// RTA_TABLE attribute.
pub(crate) fn in_main_table(msg: &RouteMessage) -> bool {
    let table = msg
        .nlas
        .iter()
        .find_map(|nla| match nla {
            RouteNla::Table(table) => Some(*table),
            _ => None,
        })
        .unwrap_or(u32::from(msg.header.table));
    table == RT_TABLE_MAIN as u32
}

pub(crate) fn route_from_message(msg: &RouteMessage) -> Route {
    let mut route = Route::default();
    for nla in &msg.nlas {
        match nla {
            RouteNla::Destination(bytes) => {
                route.destination =
                    ip_from_bytes(bytes).map(|ip| (ip, msg.header.destination_prefix_length));
            }
            RouteNla::Gateway(bytes) => route.gateway = ip_from_bytes(bytes),
            RouteNla::PrefSource(bytes) => route.source = ip_from_bytes(bytes),
            RouteNla::Oif(index) => route.output_interface = Some(*index),
            _ => {}
        }
    }
    route
}

/// RTM_GETADDR dump request for one family
pub(crate) fn address_dump_message(family: IpFamily) -> AddressMessage {
    let mut msg = AddressMessage::default();
    msg.header.family = family_code(family);
    msg
}

/// RTM_NEWADDR / RTM_DELADDR body for `address` on `link`
pub(crate) fn address_message(link: &Interface, address: &LinkAddress) -> AddressMessage {
    let mut msg = AddressMessage::default();
    msg.header.family = family_code(address.family());
    msg.header.prefix_len = address.prefix_len;
    msg.header.index = link.index;

    match address.address {
        IpAddr::V4(v4) => {
            msg.nlas.push(AddressNla::Local(v4.octets().to_vec()));
            msg.nlas.push(AddressNla::Address(v4.octets().to_vec()));
            if address.prefix_len < 31 {
                let broadcast = Ipv4Addr::from(Ip4Net::new(v4, address.prefix_len).broadcast());
                msg.nlas.push(AddressNla::Broadcast(broadcast.octets().to_vec()));
            }
        }
        IpAddr::V6(v6) => msg.nlas.push(AddressNla::Address(v6.octets().to_vec())),
    }
    msg
}

/// Decode an RTM_NEWADDR. On IPv4 point-to-point links IFA_ADDRESS is the
/// peer, so IFA_LOCAL wins when present.
pub(crate) fn link_address_from_message(msg: &AddressMessage) -> Option<LinkAddress> {
    let mut address = None;
    let mut local = None;
    for nla in &msg.nlas {
        match nla {
            AddressNla::Address(bytes) => address = ip_from_bytes(bytes),
            AddressNla::Local(bytes) => local = ip_from_bytes(bytes),
            _ => {}
        }
    }

    let ip = if msg.header.family == AF_INET as u8 {
        local.or(address)
    } else {
        address.or(local)
    };
    ip.map(|ip| LinkAddress::new(ip, msg.header.prefix_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_route_decodes_without_destination() {
        let mut msg = RouteMessage::default();
        msg.header.address_family = AF_INET as u8;
        msg.header.table = RT_TABLE_MAIN as u8;
        msg.nlas.push(RouteNla::Gateway(vec![192, 168, 1, 1]));
        msg.nlas.push(RouteNla::Oif(2));

        let route = route_from_message(&msg);
        assert!(route.is_default());
        assert_eq!(route.gateway, Some(ip("192.168.1.1")));
        assert_eq!(route.output_interface, Some(2));
        assert!(in_main_table(&msg));
    }

    #[test]
    fn test_route_lookup_reply_decodes_source() {
        let mut msg = RouteMessage::default();
        msg.header.address_family = AF_INET as u8;
        msg.header.destination_prefix_length = 32;
        msg.nlas.push(RouteNla::Destination(vec![10, 10, 0, 1]));
        msg.nlas.push(RouteNla::PrefSource(vec![10, 10, 0, 5]));
        msg.nlas.push(RouteNla::Oif(3));

        let route = route_from_message(&msg);
        assert_eq!(route.destination, Some((ip("10.10.0.1"), 32)));
        assert_eq!(route.source, Some(ip("10.10.0.5")));
        assert_eq!(route.gateway, None);
        assert!(!route.is_default());
    }

    #[test]
    fn test_table_attribute_overrides_header() {
        let mut msg = RouteMessage::default();
        msg.header.table = RT_TABLE_MAIN as u8;
        msg.nlas.push(RouteNla::Table(1000));
        assert!(!in_main_table(&msg));
    }

    #[test]
    fn test_route_get_message() {
        let msg = route_get_message(ip("2001:db8::1"));
        assert_eq!(msg.header.address_family, AF_INET6 as u8);
        assert_eq!(msg.header.destination_prefix_length, 128);
        assert_eq!(route_from_message(&msg).destination, Some((ip("2001:db8::1"), 128)));
    }

    #[test]
    fn test_ipv4_address_message_carries_local_and_broadcast() {
        let link = Interface::new(7, "flat0");
        let msg = address_message(&link, &LinkAddress::new([10, 0, 1, 1], 24));

        assert_eq!(msg.header.family, AF_INET as u8);
        assert_eq!(msg.header.prefix_len, 24);
        assert_eq!(msg.header.index, 7);
        assert!(msg.nlas.contains(&AddressNla::Local(vec![10, 0, 1, 1])));
        assert!(msg.nlas.contains(&AddressNla::Broadcast(vec![10, 0, 1, 255])));
        assert_eq!(
            link_address_from_message(&msg),
            Some(LinkAddress::new([10, 0, 1, 1], 24))
        );
    }

    #[test]
    fn test_point_to_point_address_prefers_local() {
        let mut msg = AddressMessage::default();
        msg.header.family = AF_INET as u8;
        msg.header.prefix_len = 32;
        msg.nlas.push(AddressNla::Address(vec![10, 9, 0, 1]));
        msg.nlas.push(AddressNla::Local(vec![10, 9, 0, 2]));

        assert_eq!(
            link_address_from_message(&msg),
            Some(LinkAddress::new([10, 9, 0, 2], 32))
        );
    }

    #[test]
    fn test_ipv6_address_message() {
        let link = Interface::new(7, "flat0");
        let addr = LinkAddress::new(ip("fd00:1::1"), 64);
        let msg = address_message(&link, &addr);

        assert_eq!(msg.header.family, AF_INET6 as u8);
        assert_eq!(msg.nlas.len(), 1);
        assert_eq!(link_address_from_message(&msg), Some(addr));
    }

    #[test]
    fn test_interface_from_message() {
        let mut msg = link_get_message(2);
        assert_eq!(interface_from_message(&msg), None);
        msg.nlas.push(LinkNla::IfName("eth0".to_string()));
        assert_eq!(interface_from_message(&msg), Some(Interface::new(2, "eth0")));
    }
}
