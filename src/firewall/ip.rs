//! IP addresses and subnets, with interning of full addresses.
//!
//! A full address (`/32` for IPv4, `/128` for IPv6) appears in thousands of
//! hits, so [`IpCache`] hands out one shared instance per distinct address.
//! Subnets are rare enough that they are never interned.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::firewall::ParseError;
use crate::hash::IntArrayStrategy;
use crate::store::weak::{Canonical, IntWeakHashCache, WeakHashCache, canonical};
use crate::traits::SharedCache;

const ANY: &str = "Any";

/// An IPv4 address or subnet. Host bits below the prefix are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4 {
    address: u32,
    prefix_length: u8,
}

impl Ipv4 {
    pub const BITS: u8 = 32;

    /// A full address.
    pub const fn host(address: u32) -> Self {
        Self {
            address,
            prefix_length: Self::BITS,
        }
    }

    /// A subnet; bits past `prefix_length` are cleared.
    pub fn new(address: u32, prefix_length: u8) -> Result<Self, ParseError> {
        if prefix_length > Self::BITS {
            return Err(ParseError::new(format!(
                "IPv4 prefix length {prefix_length} exceeds {}",
                Self::BITS
            )));
        }
        Ok(Self {
            address: address & Self::mask(prefix_length),
            prefix_length,
        })
    }

    fn mask(prefix_length: u8) -> u32 {
        match prefix_length {
            0 => 0,
            p => u32::MAX << (Self::BITS - p),
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    pub fn is_host(&self) -> bool {
        self.prefix_length == Self::BITS
    }

    /// Whether `other` lies inside this subnet.
    pub fn contains(&self, other: &Ipv4) -> bool {
        self.prefix_length <= other.prefix_length
            && other.address & Self::mask(self.prefix_length) == self.address
    }
}

impl fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ipv4Addr::from(self.address))?;
        if !self.is_host() {
            write!(f, "/{}", self.prefix_length)?;
        }
        Ok(())
    }
}

/// An IPv6 address or subnet as four big-endian `u32` words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv6 {
    address: [u32; 4],
    prefix_length: u8,
}

impl Ipv6 {
    pub const BITS: u8 = 128;

    pub const fn host(address: [u32; 4]) -> Self {
        Self {
            address,
            prefix_length: Self::BITS,
        }
    }

    pub fn new(address: [u32; 4], prefix_length: u8) -> Result<Self, ParseError> {
        if prefix_length > Self::BITS {
            return Err(ParseError::new(format!(
                "IPv6 prefix length {prefix_length} exceeds {}",
                Self::BITS
            )));
        }
        let masked = words_to_bits(address) & Self::mask(prefix_length);
        Ok(Self {
            address: bits_to_words(masked),
            prefix_length,
        })
    }

    fn mask(prefix_length: u8) -> u128 {
        match prefix_length {
            0 => 0,
            p => u128::MAX << (Self::BITS - p),
        }
    }

    pub fn address(&self) -> [u32; 4] {
        self.address
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    pub fn is_host(&self) -> bool {
        self.prefix_length == Self::BITS
    }

    pub fn contains(&self, other: &Ipv6) -> bool {
        self.prefix_length <= other.prefix_length
            && words_to_bits(other.address) & Self::mask(self.prefix_length)
                == words_to_bits(self.address)
    }
}

impl fmt::Display for Ipv6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ipv6Addr::from(words_to_bits(self.address)))?;
        if !self.is_host() {
            write!(f, "/{}", self.prefix_length)?;
        }
        Ok(())
    }
}

fn words_to_bits(words: [u32; 4]) -> u128 {
    words
        .iter()
        .fold(0u128, |bits, &word| (bits << 32) | u128::from(word))
}

fn bits_to_words(bits: u128) -> [u32; 4] {
    [
        (bits >> 96) as u32,
        (bits >> 64) as u32,
        (bits >> 32) as u32,
        bits as u32,
    ]
}

/// An IP attribute value: any address, or a canonical IPv4/IPv6 value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ip {
    Any,
    V4(Canonical<Ipv4>),
    V6(Canonical<Ipv6>),
}

impl Ip {
    /// Whether `other` is covered by this address or subnet.
    ///
    /// `Any` covers everything; a concrete address never covers `Any`, and
    /// the two families never cover each other.
    pub fn contains(&self, other: &Ip) -> bool {
        match (self, other) {
            (Ip::Any, _) => true,
            (Ip::V4(a), Ip::V4(b)) => a.contains(b),
            (Ip::V6(a), Ip::V6(b)) => a.contains(b),
            _ => false,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Ip::Any)
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ip::Any => f.write_str(ANY),
            Ip::V4(ip) => fmt::Display::fmt(ip, f),
            Ip::V6(ip) => fmt::Display::fmt(ip, f),
        }
    }
}

/// Interns full IPv4 and IPv6 addresses.
///
/// Share one instance (usually through `Arc`) between every factory that
/// builds IP-valued attributes.
#[derive(Debug, Default)]
pub struct IpCache {
    v4: IntWeakHashCache<Ipv4>,
    v6: WeakHashCache<[u32; 4], Ipv6, IntArrayStrategy>,
}

impl IpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical instance of the full IPv4 address.
    pub fn ipv4(&self, address: u32) -> Canonical<Ipv4> {
        self.v4
            .get_or_add(address, |&address| canonical(Ipv4::host(address)))
    }

    /// IPv4 subnet; only `/32` goes through the interning table.
    pub fn ipv4_subnet(
        &self,
        address: u32,
        prefix_length: u8,
    ) -> Result<Canonical<Ipv4>, ParseError> {
        if prefix_length == Ipv4::BITS {
            return Ok(self.ipv4(address));
        }
        Ipv4::new(address, prefix_length).map(canonical)
    }

    /// Canonical instance of the full IPv6 address.
    pub fn ipv6(&self, address: [u32; 4]) -> Canonical<Ipv6> {
        self.v6
            .get_or_add(address, |&address| canonical(Ipv6::host(address)))
    }

    pub fn ipv6_subnet(
        &self,
        address: [u32; 4],
        prefix_length: u8,
    ) -> Result<Canonical<Ipv6>, ParseError> {
        if prefix_length == Ipv6::BITS {
            return Ok(self.ipv6(address));
        }
        Ipv6::new(address, prefix_length).map(canonical)
    }

    /// Parses `Any`, `a.b.c.d[/p]` or an IPv6 literal with optional `/p`.
    pub fn parse(&self, text: &str) -> Result<Ip, ParseError> {
        let text = text.trim();
        if text == ANY {
            return Ok(Ip::Any);
        }
        let (address, prefix) = match text.split_once('/') {
            Some((address, prefix)) => {
                let prefix = prefix
                    .parse::<u8>()
                    .map_err(|err| ParseError::new(format!("bad prefix in {text:?}: {err}")))?;
                (address, Some(prefix))
            },
            None => (text, None),
        };
        if address.contains(':') {
            let parsed: Ipv6Addr = address
                .parse()
                .map_err(|err| ParseError::new(format!("bad IPv6 address {text:?}: {err}")))?;
            let words = bits_to_words(u128::from(parsed));
            self.ipv6_subnet(words, prefix.unwrap_or(Ipv6::BITS))
                .map(Ip::V6)
        } else {
            let parsed: Ipv4Addr = address
                .parse()
                .map_err(|err| ParseError::new(format!("bad IPv4 address {text:?}: {err}")))?;
            self.ipv4_subnet(u32::from(parsed), prefix.unwrap_or(Ipv4::BITS))
                .map(Ip::V4)
        }
    }

    /// Number of distinct full addresses currently alive.
    pub fn interned(&self) -> usize {
        self.v4.len() + self.v6.len()
    }
}
