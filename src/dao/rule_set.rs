use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};

use crate::firewall::{Filter, Rule};

/// Unordered, duplicate-free set of rules.
///
/// Matching does not depend on rule order, so two rule lists with the same
/// members share one memoized count. The hash is order-independent.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: FxHashSet<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn contains(&self, rule: &Rule) -> bool {
        self.rules.contains(rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

impl PartialEq for RuleSet {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl Eq for RuleSet {}

impl Hash for RuleSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let sum = self
            .rules
            .iter()
            .map(|rule| {
                let mut hasher = FxHasher::default();
                rule.hash(&mut hasher);
                hasher.finish()
            })
            .fold(0u64, u64::wrapping_add);
        state.write_usize(self.rules.len());
        state.write_u64(sum);
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = &'a Rule>>(iter: I) -> Self {
        iter.into_iter().cloned().collect()
    }
}

/// Key of a memoized match count: a job analyzed under a rule set and filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HitsQuery {
    pub job: String,
    pub rules: RuleSet,
    pub filter: Filter,
}

impl HitsQuery {
    pub fn new(job: impl Into<String>, rules: &[Rule], filter: &Filter) -> Self {
        Self {
            job: job.into(),
            rules: rules.iter().collect(),
            filter: filter.clone(),
        }
    }
}
