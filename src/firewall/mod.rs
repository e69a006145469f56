//! Firewall value types and their interning factories.
//!
//! Attribute values ([`Ip`], [`Source`], [`Destination`], [`Service`]) are
//! immutable and shared as [`Canonical`](crate::store::weak::Canonical)
//! handles. Full addresses go through weak interning tables, so every hit of
//! a job that names the same host points at the same value.

pub mod attribute;
pub mod hit;
pub mod ip;

pub use attribute::{
    Destination, DestinationCache, IpAttribute, IpAttributeCache, Service, ServiceCache, Source,
    SourceCache,
};
pub use hit::{Attributes, Filter, Hit, Rule, is_match};
pub use ip::{Ip, IpCache, Ipv4, Ipv6};

/// Malformed attribute text or out-of-range attribute values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
