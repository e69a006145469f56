use std::sync::Arc;

use tracing::debug;

use crate::dao::{DaoError, Page, RulesLoader};
use crate::firewall::Rule;
use crate::store::heavy::HeavySynchronizedHashCache;
use crate::traits::SharedCache;

/// Rules DAO that memoizes each job's rule list and original rule.
#[derive(Debug)]
pub struct CachedRulesDao<L> {
    loader: L,
    rules: HeavySynchronizedHashCache<String, Arc<[Rule]>>,
    original_rules: HeavySynchronizedHashCache<String, Rule>,
}

impl<L: RulesLoader> CachedRulesDao<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            rules: HeavySynchronizedHashCache::new(),
            original_rules: HeavySynchronizedHashCache::new(),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    fn all_rules(&self, job: &str) -> Result<Arc<[Rule]>, DaoError> {
        self.rules.try_get_or_add(job.to_owned(), |job| {
            let rules = self.loader.load_rules(job)?;
            debug!(job = job.as_str(), rules = rules.len(), "loaded rules");
            Ok(Arc::from(rules))
        })
    }

    /// All rules of `job`.
    pub fn rules(&self, job: &str) -> Result<Page<Rule>, DaoError> {
        Ok(Page::full(self.all_rules(job)?.to_vec()))
    }

    /// Rules of `job` in `[start, end)`.
    ///
    /// `end` is clamped to the number of rules; `start` must be below it.
    pub fn rules_page(&self, job: &str, start: usize, end: usize) -> Result<Page<Rule>, DaoError> {
        if start > end {
            return Err(DaoError::InvalidRange { start, end });
        }
        let rules = self.all_rules(job)?;
        let total = rules.len();
        if start >= total {
            return Err(DaoError::OutOfRange { start, total });
        }
        let end = end.min(total);
        Ok(Page::new(rules[start..end].to_vec(), start, end, total))
    }

    /// The rule `job` started from.
    pub fn original_rule(&self, job: &str) -> Result<Rule, DaoError> {
        self.original_rules.try_get_or_add(job.to_owned(), |job| {
            let rule = self.loader.load_original_rule(job)?;
            debug!(job = job.as_str(), "loaded original rule");
            Ok(rule)
        })
    }

    /// Drops the memoized rules of `job`, e.g. after the job's rules changed.
    pub fn invalidate(&self, job: &str) {
        let job = job.to_owned();
        self.rules.remove(&job);
        self.original_rules.remove(&job);
    }
}
