//! Hit attributes and the factories that intern them.
//!
//! Source and destination attributes of full addresses are interned one
//! level above the IP itself: an [`IpAttributeCache`] owns its own weak table
//! and borrows canonical IPs from a shared [`IpCache`], so a source and a
//! destination for the same host share one `Ipv4` value.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::firewall::ParseError;
use crate::firewall::ip::{Ip, IpCache};
use crate::hash::IntArrayStrategy;
use crate::store::weak::{Canonical, IntWeakHashCache, WeakHashCache, canonical};
use crate::traits::SharedCache;

/// An attribute whose value is an IP address or subnet.
pub trait IpAttribute: Send + Sync + 'static {
    fn from_ip(ip: Ip) -> Self;

    fn ip(&self) -> &Ip;

    /// Whether `other` is covered by this attribute.
    fn contains(&self, other: &Self) -> bool {
        self.ip().contains(other.ip())
    }
}

/// Source address of a hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source(Ip);

/// Destination address of a hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination(Ip);

impl IpAttribute for Source {
    fn from_ip(ip: Ip) -> Self {
        Self(ip)
    }

    fn ip(&self) -> &Ip {
        &self.0
    }
}

impl IpAttribute for Destination {
    fn from_ip(ip: Ip) -> Self {
        Self(ip)
    }

    fn ip(&self) -> &Ip {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Interns IP-valued attributes of full addresses.
pub struct IpAttributeCache<A> {
    ips: Arc<IpCache>,
    v4: IntWeakHashCache<A>,
    v6: WeakHashCache<[u32; 4], A, IntArrayStrategy>,
    _attribute: PhantomData<fn() -> A>,
}

/// Factory for canonical [`Source`] attributes.
pub type SourceCache = IpAttributeCache<Source>;

/// Factory for canonical [`Destination`] attributes.
pub type DestinationCache = IpAttributeCache<Destination>;

impl<A: IpAttribute> IpAttributeCache<A> {
    pub fn new(ips: Arc<IpCache>) -> Self {
        Self {
            ips,
            v4: IntWeakHashCache::new(),
            v6: WeakHashCache::new(),
            _attribute: PhantomData,
        }
    }

    /// The IP cache this factory draws canonical addresses from.
    pub fn ips(&self) -> &Arc<IpCache> {
        &self.ips
    }

    /// Canonical attribute for a full IPv4 address.
    pub fn ipv4(&self, address: u32) -> Canonical<A> {
        self.v4.get_or_add(address, |&address| {
            canonical(A::from_ip(Ip::V4(self.ips.ipv4(address))))
        })
    }

    /// Canonical attribute for a full IPv6 address.
    pub fn ipv6(&self, address: [u32; 4]) -> Canonical<A> {
        self.v6.get_or_add(address, |&address| {
            canonical(A::from_ip(Ip::V6(self.ips.ipv6(address))))
        })
    }

    /// Attribute for `ip`; only full addresses are interned.
    pub fn attribute(&self, ip: Ip) -> Canonical<A> {
        match &ip {
            Ip::V4(v4) if v4.is_host() => self.ipv4(v4.address()),
            Ip::V6(v6) if v6.is_host() => self.ipv6(v6.address()),
            _ => canonical(A::from_ip(ip)),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Canonical<A>, ParseError> {
        self.ips.parse(text).map(|ip| self.attribute(ip))
    }

    /// Number of distinct interned attributes currently alive.
    pub fn interned(&self) -> usize {
        self.v4.len() + self.v6.len()
    }
}

impl<A> fmt::Debug for IpAttributeCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpAttributeCache")
            .field("v4", &self.v4)
            .field("v6", &self.v6)
            .finish_non_exhaustive()
    }
}

/// Protocol and port of a hit. `None` in either field means "any".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Service {
    protocol: Option<String>,
    port: Option<u16>,
}

impl Service {
    pub fn new(protocol: Option<String>, port: Option<u16>) -> Self {
        Self { protocol, port }
    }

    pub fn any() -> Self {
        Self::new(None, None)
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether `other` is covered: an unset protocol or port covers any value,
    /// a set one covers only the same value.
    pub fn contains(&self, other: &Service) -> bool {
        let Some(protocol) = &self.protocol else {
            return true;
        };
        if other.protocol.as_ref() != Some(protocol) {
            return false;
        }
        match self.port {
            None => true,
            Some(port) => other.port == Some(port),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.protocol, self.port) {
            (None, _) => f.write_str("Any"),
            (Some(protocol), None) => f.write_str(protocol),
            (Some(protocol), Some(port)) => write!(f, "{protocol} {port}"),
        }
    }
}

type ServiceKey = (Option<String>, Option<u16>);

/// Interns [`Service`] attributes by `(protocol, port)`.
#[derive(Debug, Default)]
pub struct ServiceCache {
    services: WeakHashCache<ServiceKey, Service>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self, protocol: Option<&str>, port: Option<u16>) -> Canonical<Service> {
        self.services
            .get_or_add((protocol.map(str::to_owned), port), |(protocol, port)| {
                canonical(Service::new(protocol.clone(), *port))
            })
    }

    /// Parses `Any`, `<protocol>` or `<protocol> <port>`.
    pub fn parse(&self, text: &str) -> Result<Canonical<Service>, ParseError> {
        let mut parts = text.split_whitespace();
        let (protocol, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some("Any"), None, None) => (None, None),
            (Some(protocol), None, None) => (Some(protocol), None),
            (Some(protocol), Some(port), None) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|err| ParseError::new(format!("bad port in {text:?}: {err}")))?;
                (Some(protocol), Some(port))
            },
            _ => return Err(ParseError::new(format!("malformed service {text:?}"))),
        };
        Ok(self.service(protocol, port))
    }

    pub fn interned(&self) -> usize {
        self.services.len()
    }
}
