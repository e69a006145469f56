// ==============================================
// INTERNING AND RECLAMATION TESTS (integration)
// ==============================================
//
// Canonical attribute instances are shared while owned and disappear from
// every interning table once the last owner drops them.

use std::sync::{Arc, Barrier};
use std::thread;

use hitcache::firewall::{DestinationCache, Ip, IpAttribute, IpCache, ServiceCache, SourceCache};
use hitcache::store::weak::{IntWeakHashCache, canonical};
use hitcache::traits::SharedCache;

// ==============================================
// Identity
// ==============================================

mod identity {
    use super::*;

    #[test]
    fn equal_addresses_share_one_instance_across_factories() {
        let ips = Arc::new(IpCache::new());
        let sources = SourceCache::new(Arc::clone(&ips));
        let destinations = DestinationCache::new(Arc::clone(&ips));

        let source = sources.parse("192.0.2.10").unwrap();
        let destination = destinations.parse("192.0.2.10").unwrap();
        let (Ip::V4(a), Ip::V4(b)) = (source.ip(), destination.ip()) else {
            panic!("expected IPv4 attributes");
        };
        assert!(Arc::ptr_eq(a, b));
        assert!(Arc::ptr_eq(&source, &sources.parse("192.0.2.10").unwrap()));
        assert_eq!(ips.interned(), 1);
    }

    #[test]
    fn concurrent_parsing_yields_one_instance_per_address() {
        let ips = Arc::new(IpCache::new());
        let sources = Arc::new(SourceCache::new(Arc::clone(&ips)));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sources = Arc::clone(&sources);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..100u32)
                        .map(|i| {
                            let text = format!("10.0.{}.{}", i / 10, i % 10);
                            sources.parse(&text).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for parsed in &results[1..] {
            for (a, b) in parsed.iter().zip(&results[0]) {
                assert!(Arc::ptr_eq(a, b));
            }
        }
        assert_eq!(sources.interned(), 100);
        assert_eq!(ips.interned(), 100);

        drop(results);
        assert_eq!(sources.interned(), 0);
        assert_eq!(ips.interned(), 0);
    }
}

// ==============================================
// Reclamation
// ==============================================

mod reclamation {
    use super::*;

    #[test]
    fn released_values_are_gone_and_the_table_shrinks() {
        let cache: IntWeakHashCache<u32> = IntWeakHashCache::new();
        let kept: Vec<_> = (0..10u32).map(|k| cache.add(k, canonical(k))).collect();
        let dropped: Vec<_> = (10..1000u32).map(|k| cache.add(k, canonical(k))).collect();
        let grown = cache.capacity();
        assert_eq!(cache.len(), 1000);

        drop(dropped);
        assert_eq!(cache.len(), 10);
        assert!(cache.capacity() < grown);
        assert_eq!(cache.get(&500), None);
        for (k, value) in kept.iter().enumerate() {
            assert!(Arc::ptr_eq(&cache.get(&(k as u32)).unwrap(), value));
        }
        cache.check_invariants().unwrap();
    }

    #[test]
    fn services_are_released_with_their_last_owner() {
        let services = ServiceCache::new();
        let http = services.parse("TCP 80").unwrap();
        let again = services.service(Some("TCP"), Some(80));
        assert!(Arc::ptr_eq(&http, &again));
        assert_eq!(services.interned(), 1);

        drop(http);
        assert_eq!(services.interned(), 1);
        drop(again);
        assert_eq!(services.interned(), 0);
    }

    #[test]
    fn drops_on_other_threads_are_observed() {
        let ips = Arc::new(IpCache::new());
        let address = ips.parse("2001:db8::42").unwrap();
        assert_eq!(ips.interned(), 1);
        thread::spawn(move || drop(address)).join().unwrap();
        assert_eq!(ips.interned(), 0);
    }
}
