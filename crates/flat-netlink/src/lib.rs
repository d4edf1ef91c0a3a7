// # Netlink Host
//
// This crate implements the flat-core host capability traits on top of
// rtnetlink.
//
// ## Implementation
//
// - `netlink-sys` for the NETLINK_ROUTE socket
// - `netlink-packet-route` to build and parse RTM_* messages
// - One socket per request; nothing is cached between calls
//
// ## Operations
//
// | Trait            | Request                                   |
// |------------------|-------------------------------------------|
// | `InterfaceTable` | RTM_GETLINK (dump, or by index)           |
// | `RouteTable`     | RTM_GETROUTE (main-table dump, or lookup) |
// | `LinkAddresses`  | RTM_GETADDR dump, RTM_NEWADDR, RTM_DELADDR |
//
// ## Platform Support
//
// Netlink is Linux-only. On other targets `NetlinkHost` still exists so that
// callers compile, but every operation returns a configuration error.

#[cfg(target_os = "linux")]
mod messages;
#[cfg(target_os = "linux")]
mod socket;

use flat_core::traits::{
    Interface, InterfaceTable, IpFamily, LinkAddress, LinkAddresses, Route, RouteTable,
};
use flat_core::Result;
use std::net::IpAddr;

#[cfg(target_os = "linux")]
use flat_core::Error;
#[cfg(target_os = "linux")]
use netlink_packet_core::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST};
#[cfg(target_os = "linux")]
use netlink_packet_route::RtnlMessage;
#[cfg(target_os = "linux")]
use tracing::debug;

/// Host network access through rtnetlink
///
/// Every call is blocking and performs its own netlink exchange. Async
/// callers should run it on a blocking thread.
pub struct NetlinkHost {
    #[cfg(target_os = "linux")]
    socket: socket::RouteSocket,
}

impl NetlinkHost {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "linux")]
            socket: socket::RouteSocket::new(),
        }
    }
}

impl Default for NetlinkHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl NetlinkHost {
    fn dump(&self, message: RtnlMessage) -> Result<Vec<RtnlMessage>> {
        Ok(self.socket.request(message, NLM_F_REQUEST | NLM_F_DUMP)?)
    }

    fn acked(&self, message: RtnlMessage, flags: u16) -> Result<()> {
        self.socket.request(message, NLM_F_REQUEST | NLM_F_ACK | flags)?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl InterfaceTable for NetlinkHost {
    fn interfaces(&self) -> Result<Vec<Interface>> {
        let mut links: Vec<Interface> = self
            .dump(RtnlMessage::GetLink(messages::link_dump_message()))?
            .iter()
            .filter_map(|reply| match reply {
                RtnlMessage::NewLink(link) => messages::interface_from_message(link),
                _ => None,
            })
            .collect();
        links.sort_by_key(|link| link.index);
        Ok(links)
    }

    fn interface_by_index(&self, index: u32) -> Result<Interface> {
        let replies = self
            .socket
            .request(
                RtnlMessage::GetLink(messages::link_get_message(index)),
                NLM_F_REQUEST,
            )?;
        replies
            .iter()
            .find_map(|reply| match reply {
                RtnlMessage::NewLink(link) => messages::interface_from_message(link),
                _ => None,
            })
            .ok_or_else(|| Error::Host(std::io::Error::from_raw_os_error(libc::ENODEV)))
    }

    fn interface_by_name(&self, name: &str) -> Result<Interface> {
        self.interfaces()?
            .into_iter()
            .find(|link| link.name == name)
            .ok_or_else(|| {
                Error::Host(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no interface named {name}"),
                ))
            })
    }
}

#[cfg(target_os = "linux")]
impl RouteTable for NetlinkHost {
    fn routes(&self, family: IpFamily) -> Result<Vec<Route>> {
        Ok(self
            .dump(RtnlMessage::GetRoute(messages::route_dump_message(family)))?
            .iter()
            .filter_map(|reply| match reply {
                RtnlMessage::NewRoute(route) if messages::in_main_table(route) => {
                    Some(messages::route_from_message(route))
                }
                _ => None,
            })
            .collect())
    }

    fn route_to(&self, destination: IpAddr) -> Result<Vec<Route>> {
        let request = RtnlMessage::GetRoute(messages::route_get_message(destination));
        match self.socket.request(request, NLM_F_REQUEST) {
            Ok(replies) => Ok(replies
                .iter()
                .filter_map(|reply| match reply {
                    RtnlMessage::NewRoute(route) => Some(messages::route_from_message(route)),
                    _ => None,
                })
                .collect()),
            Err(e) if matches!(
                e.kernel_errno(),
                Some(libc::ENETUNREACH | libc::EHOSTUNREACH)
            ) =>
            {
                debug!("No route to {}: {}", destination, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(target_os = "linux")]
impl LinkAddresses for NetlinkHost {
    fn addresses(&self, link: &Interface, family: IpFamily) -> Result<Vec<LinkAddress>> {
        Ok(self
            .dump(RtnlMessage::GetAddress(messages::address_dump_message(family)))?
            .iter()
            .filter_map(|reply| match reply {
                RtnlMessage::NewAddress(addr) if addr.header.index == link.index => {
                    messages::link_address_from_message(addr)
                }
                _ => None,
            })
            .filter(|addr| addr.family() == family)
            .collect())
    }

    fn add_address(&self, link: &Interface, address: &LinkAddress) -> Result<()> {
        self.acked(
            RtnlMessage::NewAddress(messages::address_message(link, address)),
            NLM_F_CREATE | NLM_F_EXCL,
        )?;
        debug!("RTM_NEWADDR {} on {} acknowledged", address, link);
        Ok(())
    }

    fn remove_address(&self, link: &Interface, address: &LinkAddress) -> Result<()> {
        self.acked(
            RtnlMessage::DelAddress(messages::address_message(link, address)),
            0,
        )?;
        debug!("RTM_DELADDR {} on {} acknowledged", address, link);
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported<T>() -> Result<T> {
    Err(flat_core::Error::config(
        "Netlink host access is only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
impl InterfaceTable for NetlinkHost {
    fn interfaces(&self) -> Result<Vec<Interface>> {
        unsupported()
    }

    fn interface_by_index(&self, _index: u32) -> Result<Interface> {
        unsupported()
    }

    fn interface_by_name(&self, _name: &str) -> Result<Interface> {
        unsupported()
    }
}

#[cfg(not(target_os = "linux"))]
impl RouteTable for NetlinkHost {
    fn routes(&self, _family: IpFamily) -> Result<Vec<Route>> {
        unsupported()
    }

    fn route_to(&self, _destination: IpAddr) -> Result<Vec<Route>> {
        unsupported()
    }
}

#[cfg(not(target_os = "linux"))]
impl LinkAddresses for NetlinkHost {
    fn addresses(&self, _link: &Interface, _family: IpFamily) -> Result<Vec<LinkAddress>> {
        unsupported()
    }

    fn add_address(&self, _link: &Interface, _address: &LinkAddress) -> Result<()> {
        unsupported()
    }

    fn remove_address(&self, _link: &Interface, _address: &LinkAddress) -> Result<()> {
        unsupported()
    }
}
