//! IPv4 address and CIDR network value types.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::endian;
use crate::error::{Error, Result};

/// Maximum IPv4 prefix length.
pub const MAX_PREFIX_LEN: u8 = 32;

/// An IPv4 address held as a host-order `u32`, most significant octet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ip4(u32);

impl Ip4 {
    /// `0.0.0.0`
    pub const UNSPECIFIED: Ip4 = Ip4(0);

    pub const fn from_bits(bits: u32) -> Self {
        Ip4(bits)
    }

    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Build an address from its four octets, first octet most significant.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Ip4(u32::from_be_bytes(bytes))
    }

    /// Reduce a generic IP address to IPv4.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) reduce to their IPv4
    /// form.
    ///
    /// # Panics
    ///
    /// Panics if `ip` is a genuine IPv6 address.
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4.into(),
                None => panic!("address {v6} is not an IPv4 address"),
            },
        }
    }

    /// Parse a dotted-decimal address.
    ///
    /// Text naming an IPv6 address is rejected as `InvalidFormat` unless it
    /// is IPv4-mapped.
    pub fn parse(s: &str) -> Result<Self> {
        match s.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => Ok(v4.into()),
            Ok(IpAddr::V6(v6)) => v6
                .to_ipv4_mapped()
                .map(Ip4::from)
                .ok_or_else(|| Error::invalid_format(format!("{s} is not an IPv4 address"))),
            Err(_) => Err(Error::invalid_format(format!("invalid IPv4 address: {s:?}"))),
        }
    }

    pub fn octets(self) -> (u8, u8, u8, u8) {
        let [a, b, c, d] = self.0.to_be_bytes();
        (a, b, c, d)
    }

    pub fn to_ipv4_addr(self) -> Ipv4Addr {
        Ipv4Addr::from(self.0)
    }

    /// Render the octets joined by `sep`, e.g. `1-2-3-4`.
    pub fn string_sep(self, sep: &str) -> String {
        let (a, b, c, d) = self.octets();
        format!("{a}{sep}{b}{sep}{c}{sep}{d}")
    }

    /// The address laid out in network byte order.
    ///
    /// The returned integer's in-memory bytes are `a, b, c, d` on every host,
    /// which is what socket structures expect.
    pub fn network_order(self) -> u32 {
        if endian::natively_little() {
            let (a, b, c, d) = self.octets();
            u32::from(a) | (u32::from(b) << 8) | (u32::from(c) << 16) | (u32::from(d) << 24)
        } else {
            self.0
        }
    }

    /// RFC1918 private range check (`10/8`, `172.16/12`, `192.168/16`).
    pub fn is_private(self) -> bool {
        let (a, b, _, _) = self.octets();
        a == 10 || (a == 172 && b & 0xf0 == 16) || (a == 192 && b == 168)
    }
}

impl From<Ipv4Addr> for Ip4 {
    fn from(addr: Ipv4Addr) -> Self {
        Ip4(u32::from(addr))
    }
}

impl From<Ip4> for Ipv4Addr {
    fn from(ip: Ip4) -> Self {
        ip.to_ipv4_addr()
    }
}

impl From<Ip4> for IpAddr {
    fn from(ip: Ip4) -> Self {
        IpAddr::V4(ip.to_ipv4_addr())
    }
}

impl From<[u8; 4]> for Ip4 {
    fn from(bytes: [u8; 4]) -> Self {
        Ip4::from_bytes(bytes)
    }
}

impl FromStr for Ip4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ip4::parse(s)
    }
}

impl fmt::Display for Ip4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_ipv4_addr(), f)
    }
}

impl Serialize for Ip4 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ip4 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Ip4, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ip4::parse(&s).map_err(de::Error::custom)
    }
}

/// An IPv4 network in CIDR form.
///
/// The all-zero value doubles as the "unset" sentinel reported by
/// [`Ip4Net::is_empty`]. It is structurally identical to `0.0.0.0/0`, so
/// code where a real default network can occur tracks presence with
/// `Option<Ip4Net>` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ip4Net {
    pub ip: Ip4,
    pub prefix_len: u8,
}

impl Ip4Net {
    /// # Panics
    ///
    /// Panics if `prefix_len` exceeds 32.
    pub fn new(ip: impl Into<Ip4>, prefix_len: u8) -> Self {
        assert!(
            prefix_len <= MAX_PREFIX_LEN,
            "IPv4 prefix length {prefix_len} exceeds {MAX_PREFIX_LEN}"
        );
        Self {
            ip: ip.into(),
            prefix_len,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (ip, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_format(format!("invalid CIDR (missing '/'): {s:?}")))?;
        let ip = Ip4::parse(ip)?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| Error::invalid_format(format!("invalid prefix length in {s:?}")))?;
        if prefix_len > MAX_PREFIX_LEN {
            return Err(Error::invalid_format(format!(
                "prefix length {prefix_len} exceeds {MAX_PREFIX_LEN} in {s:?}"
            )));
        }
        Ok(Self { ip, prefix_len })
    }

    /// Netmask with the top `prefix_len` bits set.
    pub fn mask(&self) -> u32 {
        let host_bits = u32::from(MAX_PREFIX_LEN.saturating_sub(self.prefix_len));
        u32::MAX.checked_shl(host_bits).unwrap_or(0)
    }

    /// The network with host bits cleared.
    pub fn network(&self) -> Ip4Net {
        Ip4Net {
            ip: Ip4(self.ip.0 & self.mask()),
            prefix_len: self.prefix_len,
        }
    }

    /// The last address of the block.
    pub fn broadcast(&self) -> Ip4 {
        Ip4((self.ip.0 & self.mask()) | !self.mask())
    }

    /// The equally sized block immediately after this one.
    pub fn next(&self) -> Ip4Net {
        let size = 1u64 << (MAX_PREFIX_LEN.saturating_sub(self.prefix_len));
        Ip4Net {
            ip: Ip4(self.ip.0.wrapping_add(size as u32)),
            prefix_len: self.prefix_len,
        }
    }

    /// Bump the address by one, leaving the prefix alone.
    pub fn increment_ip(&mut self) {
        self.ip = Ip4(self.ip.0.wrapping_add(1));
    }

    /// True if the two blocks share any address, judged under the coarser of
    /// the two masks.
    pub fn overlaps(&self, other: &Ip4Net) -> bool {
        let mask = if self.prefix_len < other.prefix_len {
            self.mask()
        } else {
            other.mask()
        };
        (self.ip.0 & mask) == (other.ip.0 & mask)
    }

    pub fn contains(&self, ip: Ip4) -> bool {
        let mask = self.mask();
        (self.ip.0 & mask) == (ip.0 & mask)
    }

    /// True if `other` is this block or a sub-block of it.
    pub fn contains_cidr(&self, other: &Ip4Net) -> bool {
        self.prefix_len <= other.prefix_len && self.contains(other.ip)
    }

    /// True only for the exact zero value.
    pub fn is_empty(&self) -> bool {
        self.ip == Ip4::UNSPECIFIED && self.prefix_len == 0
    }

    pub fn string_sep(&self, octet_sep: &str, prefix_sep: &str) -> String {
        format!("{}{}{}", self.ip.string_sep(octet_sep), prefix_sep, self.prefix_len)
    }
}

impl FromStr for Ip4Net {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ip4Net::parse(s)
    }
}

impl fmt::Display for Ip4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

impl Serialize for Ip4Net {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ip4Net {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Ip4Net, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ip4Net::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn net(s: &str, prefix_len: u8) -> Ip4Net {
        Ip4Net::new(Ip4::parse(s).unwrap(), prefix_len)
    }

    fn samples() -> Vec<Ip4Net> {
        vec![
            net("0.0.0.0", 0),
            net("10.0.0.0", 8),
            net("10.1.2.3", 16),
            net("10.1.2.0", 24),
            net("10.1.3.7", 24),
            net("172.16.0.0", 12),
            net("192.168.1.129", 25),
            net("192.168.1.1", 32),
            net("255.255.255.255", 31),
        ]
    }

    #[test]
    fn test_ip4_conversions() {
        let ip = Ip4::from_ip(IpAddr::from([1, 2, 3, 4]));
        assert_eq!(ip.octets(), (1, 2, 3, 4));
        assert_eq!(Ip4::from_bytes([1, 2, 3, 4]), ip);
        assert_eq!(ip.to_ipv4_addr(), Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(ip.to_string(), "1.2.3.4");
        assert_eq!(ip.string_sep("-"), "1-2-3-4");
        assert_eq!(ip.to_bits(), 0x0102_0304);
    }

    #[test]
    fn test_ip4_from_mapped_v6() {
        let mapped: Ipv6Addr = "::ffff:10.0.0.1".parse().unwrap();
        assert_eq!(Ip4::from_ip(IpAddr::V6(mapped)), Ip4::from_bytes([10, 0, 0, 1]));
        assert_eq!(Ip4::parse("::ffff:10.0.0.1").unwrap(), Ip4::from_bytes([10, 0, 0, 1]));
    }

    #[test]
    #[should_panic(expected = "not an IPv4 address")]
    fn test_ip4_from_v6_panics() {
        Ip4::from_ip("fe80::1".parse().unwrap());
    }

    #[test]
    fn test_ip4_parse_round_trip() {
        for s in ["0.0.0.0", "1.2.3.4", "10.244.0.1", "192.168.255.254", "255.255.255.255"] {
            assert_eq!(Ip4::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_ip4_parse_rejects_garbage() {
        for s in ["", "1.2.3", "1.2.3.256", "a.b.c.d", "1.2.3.4/24", " 1.2.3.4", "fe80::1"] {
            assert!(
                matches!(Ip4::parse(s), Err(Error::InvalidFormat(_))),
                "{s:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_network_order_bytes() {
        let ip = Ip4::from_bytes([1, 2, 3, 4]);
        assert_eq!(ip.network_order().to_ne_bytes(), [1, 2, 3, 4]);
        if cfg!(target_endian = "little") {
            assert_eq!(ip.network_order(), 0x0403_0201);
        }
    }

    #[test]
    fn test_is_private() {
        let cases = [
            ("10.1.2.3", true),
            ("172.16.0.1", true),
            ("172.31.0.1", true),
            ("192.168.0.1", true),
            ("8.8.8.8", false),
            ("172.32.0.1", false),
            ("192.167.0.1", false),
            ("192.169.0.1", false),
            // second octet 168 outside 192/8 is public
            ("11.168.0.1", false),
        ];
        for (s, private) in cases {
            assert_eq!(Ip4::parse(s).unwrap().is_private(), private, "{s}");
        }
    }

    #[test]
    fn test_ip4_json() {
        let ip = Ip4::parse("1.2.3.4").unwrap();
        assert_eq!(serde_json::to_string(&ip).unwrap(), r#""1.2.3.4""#);
        let back: Ip4 = serde_json::from_str(r#""1.2.3.4""#).unwrap();
        assert_eq!(back, ip);
        assert!(serde_json::from_str::<Ip4>(r#""1.2.3""#).is_err());
    }

    #[test]
    fn test_ip4net_display_and_json() {
        let n = net("1.2.3.0", 24);
        assert_eq!(n.to_string(), "1.2.3.0/24");
        assert_eq!(n.string_sep("-", "_"), "1-2-3-0_24");
        assert_eq!(serde_json::to_string(&n).unwrap(), r#""1.2.3.0/24""#);
        let back: Ip4Net = serde_json::from_str(r#""1.2.3.0/24""#).unwrap();
        assert_eq!(back, n);
        assert_eq!("1.2.3.0/24".parse::<Ip4Net>().unwrap(), n);
    }

    #[test]
    fn test_ip4net_parse_rejects_garbage() {
        for s in ["1.2.3.0", "1.2.3.0/", "1.2.3.0/33", "1.2.3/24", "1.2.3.0/x"] {
            assert!(
                matches!(Ip4Net::parse(s), Err(Error::InvalidFormat(_))),
                "{s:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_mask() {
        assert_eq!(net("0.0.0.0", 0).mask(), 0);
        assert_eq!(net("10.0.0.0", 8).mask(), 0xFF00_0000);
        assert_eq!(net("10.0.0.0", 24).mask(), 0xFFFF_FF00);
        assert_eq!(net("10.0.0.0", 32).mask(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_network_and_broadcast() {
        let n = net("10.1.2.3", 16);
        assert_eq!(n.network(), net("10.1.0.0", 16));
        assert_eq!(n.broadcast(), Ip4::parse("10.1.255.255").unwrap());
        assert_eq!(net("192.168.1.1", 32).broadcast(), Ip4::parse("192.168.1.1").unwrap());
    }

    #[test]
    fn test_network_is_idempotent() {
        for n in samples() {
            assert_eq!(n.network().network(), n.network(), "{n}");
        }
    }

    #[test]
    fn test_contains_own_address() {
        for n in samples() {
            assert!(n.contains(n.ip), "{n}");
        }
        let ip = Ip4::parse("203.0.113.9").unwrap();
        for p in 0..=MAX_PREFIX_LEN {
            assert!(Ip4Net::new(ip, p).contains(ip), "/{p}");
        }
    }

    #[test]
    fn test_overlaps_is_symmetric() {
        let all = samples();
        for a in &all {
            for b in &all {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a} vs {b}");
            }
        }
        assert!(net("10.0.0.0", 8).overlaps(&net("10.1.2.0", 24)));
        assert!(!net("10.1.2.0", 24).overlaps(&net("10.1.3.0", 24)));
    }

    #[test]
    fn test_contains_cidr_implies_base_and_prefix() {
        let all = samples();
        for a in &all {
            for b in &all {
                if a.contains_cidr(b) {
                    assert!(a.contains(b.ip), "{a} vs {b}");
                    assert!(a.prefix_len <= b.prefix_len, "{a} vs {b}");
                }
            }
        }
        assert!(net("10.0.0.0", 8).contains_cidr(&net("10.1.2.0", 24)));
        assert!(!net("10.1.2.0", 24).contains_cidr(&net("10.0.0.0", 8)));
    }

    #[test]
    fn test_next() {
        assert_eq!(net("1.2.3.0", 24).next(), net("1.2.4.0", 24));
        assert_eq!(net("10.0.0.0", 8).next(), net("11.0.0.0", 8));
        assert_eq!(net("255.255.255.0", 24).next(), net("0.0.0.0", 24));
        assert_eq!(net("0.0.0.0", 0).next(), net("0.0.0.0", 0));
    }

    #[test]
    fn test_increment_ip_touches_address_only() {
        let mut n = net("10.0.1.0", 24);
        n.increment_ip();
        assert_eq!(n, net("10.0.1.1", 24));
        let mut last = net("255.255.255.255", 32);
        last.increment_ip();
        assert_eq!(last, net("0.0.0.0", 32));
    }

    #[test]
    fn test_equality_is_exact() {
        assert_eq!(net("10.0.1.0", 24), net("10.0.1.0", 24));
        assert_ne!(net("10.0.1.0", 24), net("10.0.1.1", 24));
        assert_ne!(net("10.0.1.0", 24), net("10.0.1.0", 25));
    }

    #[test]
    fn test_empty_sentinel_is_ambiguous_with_default_route() {
        assert!(Ip4Net::default().is_empty());
        assert!(!net("10.0.0.0", 8).is_empty());
        assert!(!net("0.0.0.0", 1).is_empty());
        // a genuine 0.0.0.0/0 is indistinguishable from "unset"
        let default_route = Ip4Net::parse("0.0.0.0/0").unwrap();
        assert!(default_route.is_empty());
        assert_eq!(default_route, Ip4Net::default());
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_new_rejects_long_prefix() {
        Ip4Net::new(Ip4::UNSPECIFIED, 33);
    }
}
