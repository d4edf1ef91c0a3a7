//! Address arithmetic
//!
//! Pure value types used by every other part of the agent:
//!
//! - [`Ip4`]: a 32-bit IPv4 address
//! - [`Ip4Net`]: an IPv4 CIDR block with mask/overlap/containment arithmetic
//! - [`Ip6Net`]: the IPv6 mirror used when reconciling IPv6 addresses
//!
//! No I/O happens here. The only recoverable failure is malformed text.

pub mod endian;
pub mod ip4;
pub mod ip6;

pub use ip4::{Ip4, Ip4Net};
pub use ip6::Ip6Net;

use std::net::IpAddr;

/// Link-local unicast: `169.254.0.0/16` or `fe80::/10`.
pub fn is_link_local_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// Global unicast in the broad sense: any unicast address that is not
/// unspecified, loopback, link-local or (for IPv4) limited broadcast.
/// Private ranges count as global here.
pub fn is_global_unicast(ip: IpAddr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() || is_link_local_unicast(ip) {
        return false;
    }
    match ip {
        IpAddr::V4(v4) => !v4.is_broadcast(),
        IpAddr::V6(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_classification_v4() {
        assert!(is_global_unicast(ip("10.0.0.1")));
        assert!(is_global_unicast(ip("8.8.8.8")));
        assert!(!is_global_unicast(ip("127.0.0.1")));
        assert!(!is_global_unicast(ip("0.0.0.0")));
        assert!(!is_global_unicast(ip("224.0.0.1")));
        assert!(!is_global_unicast(ip("255.255.255.255")));
        assert!(!is_global_unicast(ip("169.254.3.4")));
        assert!(is_link_local_unicast(ip("169.254.3.4")));
        assert!(!is_link_local_unicast(ip("10.0.0.1")));
    }

    #[test]
    fn test_classification_v6() {
        assert!(is_global_unicast(ip("2001:db8::1")));
        assert!(is_global_unicast(ip("fd00::1")));
        assert!(!is_global_unicast(ip("::1")));
        assert!(!is_global_unicast(ip("ff02::1")));
        assert!(!is_global_unicast(ip("fe80::1")));
        assert!(is_link_local_unicast(ip("fe80::1")));
        assert!(is_link_local_unicast(ip("febf::1")));
        assert!(!is_link_local_unicast(ip("fec0::1")));
    }
}
