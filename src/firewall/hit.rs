//! Hits, rules and filters, and the predicate that matches them.

use std::fmt;

use crate::firewall::attribute::{Destination, IpAttribute, Service, Source};
use crate::store::weak::Canonical;

/// The attributes carried by a hit, rule or filter.
///
/// A `None` attribute is unconstrained when used as a matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Attributes {
    pub source: Option<Canonical<Source>>,
    pub destination: Option<Canonical<Destination>>,
    pub service: Option<Canonical<Service>>,
}

impl Attributes {
    /// Whether every attribute this matcher sets contains the hit's attribute
    /// of the same kind. A hit lacking a constrained attribute never matches.
    pub fn matches(&self, hit: &Attributes) -> bool {
        covers(&self.source, &hit.source, |m, h| m.contains(h))
            && covers(&self.destination, &hit.destination, |m, h| m.contains(h))
            && covers(&self.service, &hit.service, |m, h| m.contains(h))
    }

    pub fn is_unconstrained(&self) -> bool {
        self.source.is_none() && self.destination.is_none() && self.service.is_none()
    }
}

fn covers<T>(matcher: &Option<T>, hit: &Option<T>, contains: impl Fn(&T, &T) -> bool) -> bool {
    match (matcher, hit) {
        (None, _) => true,
        (Some(m), Some(h)) => contains(m, h),
        (Some(_), None) => false,
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn any<T: fmt::Display>(value: &Option<T>) -> String {
            value.as_ref().map_or_else(|| "Any".to_string(), T::to_string)
        }
        write!(
            f,
            "source={} destination={} service={}",
            any(&self.source),
            any(&self.destination),
            any(&self.service)
        )
    }
}

/// One logged connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hit {
    id: u32,
    attributes: Attributes,
}

impl Hit {
    pub fn new(id: u32, attributes: Attributes) -> Self {
        Self { id, attributes }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// A firewall rule; hits it covers are considered explained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Rule {
    attributes: Attributes,
}

impl Rule {
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn matches(&self, hit: &Hit) -> bool {
        self.attributes.matches(&hit.attributes)
    }
}

/// Restricts analysis to hits whose attributes it contains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    attributes: Attributes,
}

impl Filter {
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }

    /// The filter that lets every hit through.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_any(&self) -> bool {
        self.attributes.is_unconstrained()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn matches(&self, hit: &Hit) -> bool {
        self.attributes.matches(&hit.attributes)
    }
}

/// A hit is of interest when the filter lets it through and no rule covers it.
pub fn is_match<'a>(
    hit: &Hit,
    rules: impl IntoIterator<Item = &'a Rule>,
    filter: &Filter,
) -> bool {
    filter.matches(hit) && !rules.into_iter().any(|rule| rule.matches(hit))
}
