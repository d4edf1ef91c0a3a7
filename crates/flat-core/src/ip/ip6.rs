//! IPv6 network type mirroring the IPv4 CIDR operations the reconciler needs.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

pub const MAX_PREFIX_LEN_V6: u8 = 128;

/// An IPv6 network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ip6Net {
    pub ip: Ipv6Addr,
    pub prefix_len: u8,
}

impl Ip6Net {
    /// # Panics
    ///
    /// Panics if `prefix_len` exceeds 128.
    pub fn new(ip: Ipv6Addr, prefix_len: u8) -> Self {
        assert!(
            prefix_len <= MAX_PREFIX_LEN_V6,
            "IPv6 prefix length {prefix_len} exceeds {MAX_PREFIX_LEN_V6}"
        );
        Self { ip, prefix_len }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (ip, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_format(format!("invalid CIDR (missing '/'): {s:?}")))?;
        let ip: Ipv6Addr = ip
            .parse()
            .map_err(|_| Error::invalid_format(format!("invalid IPv6 address in {s:?}")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| Error::invalid_format(format!("invalid prefix length in {s:?}")))?;
        if prefix_len > MAX_PREFIX_LEN_V6 {
            return Err(Error::invalid_format(format!(
                "prefix length {prefix_len} exceeds {MAX_PREFIX_LEN_V6} in {s:?}"
            )));
        }
        Ok(Self { ip, prefix_len })
    }

    pub fn mask(&self) -> u128 {
        let host_bits = u32::from(MAX_PREFIX_LEN_V6.saturating_sub(self.prefix_len));
        u128::MAX.checked_shl(host_bits).unwrap_or(0)
    }

    pub fn network(&self) -> Ip6Net {
        Ip6Net {
            ip: Ipv6Addr::from(u128::from(self.ip) & self.mask()),
            prefix_len: self.prefix_len,
        }
    }

    pub fn contains(&self, ip: Ipv6Addr) -> bool {
        let mask = self.mask();
        (u128::from(self.ip) & mask) == (u128::from(ip) & mask)
    }

    pub fn overlaps(&self, other: &Ip6Net) -> bool {
        let mask = if self.prefix_len < other.prefix_len {
            self.mask()
        } else {
            other.mask()
        };
        (u128::from(self.ip) & mask) == (u128::from(other.ip) & mask)
    }
}

impl FromStr for Ip6Net {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ip6Net::parse(s)
    }
}

impl fmt::Display for Ip6Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

impl Serialize for Ip6Net {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ip6Net {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Ip6Net, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ip6Net::parse(&s).map_err(de::Error::custom)
    }
}
