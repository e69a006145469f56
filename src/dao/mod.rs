//! Memoizing data access for hits and rules.
//!
//! The DAOs sit between analysis code and a [`HitsLoader`] / [`RulesLoader`]
//! that reads jobs from storage. Every load runs at most once per job, even
//! when many threads ask for the same job at once, and match counts are
//! memoized per `(job, rule set, filter)`. Loader failures are not cached: the
//! caller gets the loader's [`DaoError`] and the next request loads again.

pub mod error;
pub mod hits;
pub mod rule_set;
pub mod rules;

pub use error::DaoError;
pub use hits::CachedHitsDao;
pub use rule_set::{HitsQuery, RuleSet};
pub use rules::CachedRulesDao;

use crate::firewall::{Hit, Rule};

/// Reads the hits logged for a job.
pub trait HitsLoader {
    fn load_hits(&self, job: &str) -> Result<Vec<Hit>, DaoError>;
}

/// Reads the rules configured for a job.
pub trait RulesLoader {
    fn load_rules(&self, job: &str) -> Result<Vec<Rule>, DaoError>;

    /// The rule the job started from, before any analysis.
    fn load_original_rule(&self, job: &str) -> Result<Rule, DaoError>;
}

/// A window `[start, end)` over a result list of `total` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub start: usize,
    pub end: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, start: usize, end: usize, total: usize) -> Self {
        Self {
            data,
            start,
            end,
            total,
        }
    }

    /// A page holding the whole list.
    pub fn full(data: Vec<T>) -> Self {
        let total = data.len();
        Self::new(data, 0, total, total)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
