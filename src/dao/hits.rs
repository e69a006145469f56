use std::sync::Arc;

use tracing::debug;

use crate::dao::{DaoError, HitsLoader, HitsQuery, Page};
use crate::firewall::{Filter, Hit, Rule, is_match};
use crate::store::heavy::{HeavyCacheMetrics, HeavySynchronizedHashCache};
use crate::traits::SharedCache;

/// Hits DAO that memoizes job loads and match counts.
///
/// Two independent memoizing caches back it: `job -> hits` and
/// [`HitsQuery`] `-> count`. Computing a count reads through the hits cache,
/// which is a different instance, so it never re-enters the cache it fills.
#[derive(Debug)]
pub struct CachedHitsDao<L> {
    loader: L,
    hits: HeavySynchronizedHashCache<String, Arc<[Hit]>>,
    counts: HeavySynchronizedHashCache<HitsQuery, usize>,
}

impl<L: HitsLoader> CachedHitsDao<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            hits: HeavySynchronizedHashCache::new(),
            counts: HeavySynchronizedHashCache::new(),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Every hit of `job`, loaded once.
    pub fn all_hits(&self, job: &str) -> Result<Arc<[Hit]>, DaoError> {
        self.hits.try_get_or_add(job.to_owned(), |job| {
            let hits = self.loader.load_hits(job)?;
            debug!(job = job.as_str(), hits = hits.len(), "loaded hits");
            Ok(Arc::from(hits))
        })
    }

    /// Hits of `job` that pass `filter` and match none of `rules`.
    ///
    /// With no rules and the "any" filter this is the cached list itself.
    pub fn hits(
        &self,
        job: &str,
        rules: &[Rule],
        filter: &Filter,
    ) -> Result<Arc<[Hit]>, DaoError> {
        let all = self.all_hits(job)?;
        if rules.is_empty() && filter.is_any() {
            return Ok(all);
        }
        Ok(matching(&all, rules, filter).into())
    }

    /// The matching hits as one page; records their count for [`hits_count`].
    ///
    /// [`hits_count`]: Self::hits_count
    pub fn hits_list(
        &self,
        job: &str,
        rules: &[Rule],
        filter: &Filter,
    ) -> Result<Page<Hit>, DaoError> {
        let all = self.all_hits(job)?;
        let matched = matching(&all, rules, filter);
        self.counts.add(HitsQuery::new(job, rules, filter), matched.len());
        Ok(Page::full(matched))
    }

    /// The matching hits in `[start, end)`, clamped to the result size.
    pub fn hits_page(
        &self,
        job: &str,
        rules: &[Rule],
        filter: &Filter,
        start: usize,
        end: usize,
    ) -> Result<Page<Hit>, DaoError> {
        if start > end {
            return Err(DaoError::InvalidRange { start, end });
        }
        let list = self.hits_list(job, rules, filter)?;
        let total = self.hits_count(job, rules, filter)?;
        if list.is_empty() {
            return Ok(Page::new(Vec::new(), 0, 0, total));
        }
        let from = start.min(list.len());
        let to = end.min(list.len());
        Ok(Page::new(
            list.data[from..to].to_vec(),
            start.min(total.saturating_sub(1)),
            end.min(total),
            total,
        ))
    }

    /// Number of hits of `job` matching `(rules, filter)`, memoized per query.
    pub fn hits_count(
        &self,
        job: &str,
        rules: &[Rule],
        filter: &Filter,
    ) -> Result<usize, DaoError> {
        self.counts
            .try_get_or_add(HitsQuery::new(job, rules, filter), |query| {
                let all = self.all_hits(&query.job)?;
                if query.rules.is_empty() && query.filter.is_any() {
                    return Ok(all.len());
                }
                let count = all
                    .iter()
                    .filter(|hit| is_match(hit, query.rules.iter(), &query.filter))
                    .count();
                debug!(
                    job = query.job.as_str(),
                    rules = query.rules.len(),
                    count,
                    "counted hits"
                );
                Ok(count)
            })
    }

    /// Drops every memoized load and count.
    pub fn invalidate(&self) {
        self.hits.clear();
        self.counts.clear();
    }

    pub fn hits_metrics(&self) -> HeavyCacheMetrics {
        self.hits.metrics()
    }

    pub fn count_metrics(&self) -> HeavyCacheMetrics {
        self.counts.metrics()
    }
}

fn matching(hits: &[Hit], rules: &[Rule], filter: &Filter) -> Vec<Hit> {
    hits.iter()
        .filter(|hit| is_match(hit, rules, filter))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::firewall::{Attributes, IpCache, ServiceCache, SourceCache};

    struct Fixture {
        sources: SourceCache,
        services: ServiceCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sources: SourceCache::new(Arc::new(IpCache::new())),
                services: ServiceCache::new(),
            }
        }

        fn attributes(&self, source: &str, service: &str) -> Attributes {
            Attributes {
                source: Some(self.sources.parse(source).unwrap()),
                destination: None,
                service: Some(self.services.parse(service).unwrap()),
            }
        }
    }

    struct Loader {
        hits: Vec<Hit>,
        loads: AtomicUsize,
    }

    impl HitsLoader for Loader {
        fn load_hits(&self, job: &str) -> Result<Vec<Hit>, DaoError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match job {
                "missing" => Err(io::Error::new(io::ErrorKind::NotFound, "no such job").into()),
                _ => Ok(self.hits.clone()),
            }
        }
    }

    fn dao(fixture: &Fixture) -> CachedHitsDao<Loader> {
        let hits = [
            ("10.0.0.1", "TCP 80"),
            ("10.0.0.2", "TCP 443"),
            ("192.168.1.1", "TCP 80"),
            ("192.168.1.2", "UDP 53"),
            ("172.16.0.1", "TCP 22"),
        ]
        .into_iter()
        .enumerate()
        .map(|(id, (source, service))| {
            Hit::new(id as u32, fixture.attributes(source, service))
        })
        .collect();
        CachedHitsDao::new(Loader {
            hits,
            loads: AtomicUsize::new(0),
        })
    }

    fn rule(fixture: &Fixture, source: &str) -> Rule {
        Rule::new(Attributes {
            source: Some(fixture.sources.parse(source).unwrap()),
            ..Attributes::default()
        })
    }

    #[test]
    fn loads_each_job_once() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        let a = dao.hits("job", &[], &Filter::any()).unwrap();
        let b = dao.all_hits("job").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dao.loader().loads.load(Ordering::SeqCst), 1);
        dao.invalidate();
        dao.all_hits("job").unwrap();
        assert_eq!(dao.loader().loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rules_exclude_covered_hits() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        let rules = [rule(&fixture, "10.0.0.0/8")];
        let remaining = dao.hits("job", &rules, &Filter::any()).unwrap();
        let ids: Vec<u32> = remaining.iter().map(Hit::id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(dao.hits_count("job", &rules, &Filter::any()).unwrap(), 3);
    }

    #[test]
    fn counts_are_memoized_per_rule_set() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        let a = rule(&fixture, "10.0.0.0/8");
        let b = rule(&fixture, "192.168.0.0/16");
        let filter = Filter::new(Attributes {
            service: Some(fixture.services.parse("TCP").unwrap()),
            ..Attributes::default()
        });
        assert_eq!(dao.hits_count("job", &[a.clone(), b.clone()], &filter).unwrap(), 1);
        assert_eq!(dao.hits_count("job", &[b, a.clone(), a], &filter).unwrap(), 1);
        let metrics = dao.count_metrics();
        assert_eq!(metrics.computations, 1);
        assert_eq!(metrics.hits, 1);
    }

    #[test]
    fn list_records_the_count() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        let rules = [rule(&fixture, "192.168.0.0/16")];
        let page = dao.hits_list("job", &rules, &Filter::any()).unwrap();
        assert_eq!((page.start, page.end, page.total), (0, 3, 3));
        assert_eq!(dao.hits_count("job", &rules, &Filter::any()).unwrap(), 3);
        assert_eq!(dao.count_metrics().computations, 0);
    }

    #[test]
    fn pages_are_clamped() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        let page = dao.hits_page("job", &[], &Filter::any(), 1, 3).unwrap();
        assert_eq!(page.data.iter().map(Hit::id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!((page.start, page.end, page.total), (1, 3, 5));

        let tail = dao.hits_page("job", &[], &Filter::any(), 4, 100).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!((tail.start, tail.end), (4, 5));

        assert!(matches!(
            dao.hits_page("job", &[], &Filter::any(), 3, 1),
            Err(DaoError::InvalidRange { start: 3, end: 1 })
        ));
    }

    #[test]
    fn empty_result_page() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        let rules = [rule(&fixture, "Any")];
        let page = dao.hits_page("job", &rules, &Filter::any(), 0, 10).unwrap();
        assert!(page.is_empty());
        assert_eq!((page.start, page.end, page.total), (0, 0, 0));
    }

    #[test]
    fn page_survives_a_count_from_an_older_load() {
        // First load is empty, later loads are not.
        struct Growing {
            hits: Vec<Hit>,
            loads: AtomicUsize,
        }

        impl HitsLoader for Growing {
            fn load_hits(&self, _job: &str) -> Result<Vec<Hit>, DaoError> {
                match self.loads.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(Vec::new()),
                    _ => Ok(self.hits.clone()),
                }
            }
        }

        let fixture = Fixture::new();
        let hits = vec![Hit::new(0, fixture.attributes("10.0.0.1", "TCP 80"))];
        let dao = CachedHitsDao::new(Growing {
            hits,
            loads: AtomicUsize::new(0),
        });
        assert_eq!(dao.hits_count("job", &[], &Filter::any()).unwrap(), 0);
        // Only the hit lists were dropped, as when an invalidation lands
        // between the two caches.
        dao.hits.clear();

        let page = dao.hits_page("job", &[], &Filter::any(), 0, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!((page.start, page.end, page.total), (0, 0, 0));
    }

    #[test]
    fn loader_errors_reach_the_caller_and_are_not_cached() {
        let fixture = Fixture::new();
        let dao = dao(&fixture);
        for _ in 0..2 {
            match dao.hits_count("missing", &[], &Filter::any()) {
                Err(DaoError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::NotFound),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(dao.loader().loads.load(Ordering::SeqCst), 2);
        assert_eq!(dao.hits_metrics().failures, 2);
    }
}
