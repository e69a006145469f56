//! Memoizing cache with at-most-once computation per key.
//!
//! ## Architecture
//!
//! ```text
//!   Mutex<BucketTable<K, Arc<Slot<E>>>>          structural lock (brief)
//!            │
//!            ├── key a ──► Slot { Mutex<Ready(e)> }
//!            ├── key b ──► Slot { Mutex<Computing> }  ◄── held by the computing thread
//!            └── key c ──► Slot { Mutex<Ready(e)> }
//! ```
//!
//! ## Protocol (`get_or_add`)
//!
//! 1. Lock the table and look the key up.
//! 2. Found: clone the slot handle, release the table, then lock the slot.
//!    This blocks while another thread is computing that key.
//! 3. Absent: create a slot in the `Computing` state, lock it, link it into
//!    the table, and only then release the table. No thread can observe the
//!    claimed slot unlocked.
//! 4. Run the supplier holding only the slot lock, store the result, release.
//!
//! A thread never holds the table lock while waiting for a slot lock, so a
//! slow supplier for one key never blocks lookups or computations of others.
//! `remove` unlinks without waiting: removing a key that is being computed
//! returns `None`, and the computed element is handed to its caller but not
//! cached.
//!
//! ## Failure
//!
//! If the supplier returns an error or panics, the slot is marked
//! `Abandoned`, its lock released, and the entry unlinked from the table.
//! The failing caller gets the original error (or the panic resumes).
//! Threads that were waiting on the slot see `Abandoned`, drop their handle
//! and restart from step 1, so exactly one of them recomputes. `get` treats an
//! abandoned slot as absent.
//!
//! ## Thread Safety
//! - `Send + Sync`; share it through `Arc` or a `static`.
//! - Suppliers must not call back into the same cache instance. A supplier
//!   may use other caches, including another `HeavySynchronizedHashCache`.
//!
//! ## Example Usage
//! ```rust
//! use hitcache::store::heavy::HeavySynchronizedHashCache;
//! use hitcache::traits::SharedCache;
//!
//! let cache: HeavySynchronizedHashCache<String, usize> = HeavySynchronizedHashCache::new();
//! let parsed: Result<usize, std::num::ParseIntError> =
//!     cache.try_get_or_add("42".to_string(), |s| s.parse());
//! assert_eq!(parsed, Ok(42));
//!
//! // A failure caches nothing; a later call retries.
//! assert!(cache.try_get_or_add("x".to_string(), |s| s.parse::<usize>()).is_err());
//! assert_eq!(cache.get(&"x".to_string()), None);
//! assert_eq!(cache.metrics().failures, 1);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::builder::CacheConfig;
use crate::ds::bucket_table::BucketTable;
use crate::ds::sizing::TableSizing;
use crate::error::{ConfigError, InvariantError};
use crate::hash::{DefaultStrategy, HashStrategy, hash};
use crate::traits::SharedCache;

/// Snapshot of memoizing-cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeavyCacheMetrics {
    /// Lookups answered by a ready element.
    pub hits: u64,
    /// Lookups that found no usable element.
    pub misses: u64,
    /// Supplier invocations.
    pub computations: u64,
    /// Supplier invocations that returned an error or panicked.
    pub failures: u64,
    /// Times a caller had to block on another thread's computation.
    pub waits: u64,
}

#[derive(Debug, Default)]
struct HeavyCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
    waits: AtomicU64,
}

impl HeavyCounters {
    fn snapshot(&self) -> HeavyCacheMetrics {
        HeavyCacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }

    fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_computation(&self) {
        self.computations.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
enum SlotState<E> {
    Computing,
    Ready(E),
    Abandoned,
}

#[derive(Debug)]
struct Slot<E> {
    state: Mutex<SlotState<E>>,
    /// Set once `state` holds `Ready`; never cleared.
    ready: AtomicBool,
}

impl<E> Slot<E> {
    fn new(state: SlotState<E>) -> Arc<Self> {
        let ready = matches!(state, SlotState::Ready(_));
        Arc::new(Self {
            state: Mutex::new(state),
            ready: AtomicBool::new(ready),
        })
    }
}

/// Outcome of waiting on an existing slot.
enum Lookup<E> {
    Ready(E),
    Retry,
}

/// Memoizing cache: table-wide lock for structure, per-entry lock for values.
pub struct HeavySynchronizedHashCache<K, E, S = DefaultStrategy> {
    table: Mutex<BucketTable<K, Arc<Slot<E>>>>,
    strategy: S,
    counters: HeavyCounters,
}

impl<K, E, S> HeavySynchronizedHashCache<K, E, S>
where
    S: HashStrategy<K> + Default,
{
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        Self::with_strategy(S::default())
    }

    /// Create a cache sized for `initial_capacity` keys at the default load factor.
    ///
    /// # Panics
    ///
    /// Panics if `initial_capacity` exceeds the maximum table size.
    pub fn with_capacity(initial_capacity: usize) -> Self {
        match Self::try_with_config(CacheConfig::with_capacity(initial_capacity)) {
            Ok(cache) => cache,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_with_config(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::try_with_strategy(config, S::default())
    }
}

impl<K, E, S> HeavySynchronizedHashCache<K, E, S>
where
    S: HashStrategy<K>,
{
    pub fn with_strategy(strategy: S) -> Self {
        let sizing = match TableSizing::try_new(&CacheConfig::default()) {
            Ok(sizing) => sizing,
            Err(err) => unreachable!("default config is valid: {err}"),
        };
        Self::from_sizing(sizing, strategy)
    }

    pub fn try_with_strategy(config: CacheConfig, strategy: S) -> Result<Self, ConfigError> {
        Ok(Self::from_sizing(TableSizing::try_new(&config)?, strategy))
    }

    fn from_sizing(sizing: TableSizing, strategy: S) -> Self {
        Self {
            table: Mutex::new(BucketTable::new(sizing)),
            strategy,
            counters: HeavyCounters::default(),
        }
    }

    /// Snapshot the hit/miss/computation counters.
    pub fn metrics(&self) -> HeavyCacheMetrics {
        self.counters.snapshot()
    }

    /// Current number of bucket slots.
    pub fn capacity(&self) -> usize {
        self.table.lock().capacity()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.table.lock().check_invariants(&self.strategy)
    }

    fn find_slot(
        &self,
        table: &BucketTable<K, Arc<Slot<E>>>,
        h: u32,
        key: &K,
    ) -> Option<Arc<Slot<E>>> {
        table
            .find(h, |k, _| self.strategy.equals(k, key))
            .map(|(_, slot)| Arc::clone(slot))
    }

    /// Locks `slot`, counting a wait when another thread holds it.
    fn lock_slot<'a>(&self, slot: &'a Slot<E>) -> MutexGuard<'a, SlotState<E>> {
        match slot.state.try_lock() {
            Some(state) => state,
            None => {
                self.counters.inc_wait();
                slot.state.lock()
            },
        }
    }

    /// Unlinks `slot` if it is still the table's entry for `h`.
    fn unlink_slot(&self, h: u32, slot: &Arc<Slot<E>>) {
        self.table.lock().unlink(h, |_, linked| Arc::ptr_eq(linked, slot));
    }
}

impl<K, E, S> HeavySynchronizedHashCache<K, E, S>
where
    E: Clone,
    S: HashStrategy<K>,
{
    /// Waits for `slot` and reads it; an abandoned slot is unlinked.
    fn await_slot(&self, h: u32, slot: &Arc<Slot<E>>) -> Lookup<E> {
        let state = self.lock_slot(slot);
        match &*state {
            SlotState::Ready(element) => Lookup::Ready(element.clone()),
            // Computing is never observable here: the computing thread holds
            // the slot lock until it leaves that state.
            SlotState::Computing | SlotState::Abandoned => {
                drop(state);
                self.unlink_slot(h, slot);
                Lookup::Retry
            },
        }
    }
}

/// Marks the slot abandoned and unlinks it unless the computation completes.
struct Computation<'a, K, E, S>
where
    S: HashStrategy<K>,
{
    cache: &'a HeavySynchronizedHashCache<K, E, S>,
    slot: &'a Arc<Slot<E>>,
    hash: u32,
    state: Option<MutexGuard<'a, SlotState<E>>>,
}

impl<K, E, S> Computation<'_, K, E, S>
where
    S: HashStrategy<K>,
{
    fn complete(mut self, element: E) {
        if let Some(mut state) = self.state.take() {
            *state = SlotState::Ready(element);
            self.slot.ready.store(true, Ordering::Release);
        }
    }
}

impl<K, E, S> Drop for Computation<'_, K, E, S>
where
    S: HashStrategy<K>,
{
    fn drop(&mut self) {
        if let Some(mut state) = self.state.take() {
            *state = SlotState::Abandoned;
            // Release the slot before taking the table lock.
            drop(state);
            self.cache.counters.inc_failure();
            self.cache.unlink_slot(self.hash, self.slot);
            warn!(hash = self.hash, "memoized computation failed; entry removed");
        }
    }
}

impl<K, E, S> Default for HeavySynchronizedHashCache<K, E, S>
where
    S: HashStrategy<K> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E, S> fmt::Debug for HeavySynchronizedHashCache<K, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("HeavySynchronizedHashCache")
            .field("len", &table.len())
            .field("capacity", &table.capacity())
            .field("metrics", &self.counters.snapshot())
            .finish()
    }
}

impl<K, E, S> SharedCache<K, E> for HeavySynchronizedHashCache<K, E, S>
where
    K: Clone + Send,
    E: Clone + Send,
    S: HashStrategy<K> + Send + Sync,
{
    fn get(&self, key: &K) -> Option<E> {
        let h = hash(&self.strategy, key);
        let slot = self.find_slot(&self.table.lock(), h, key);
        let found = match slot {
            Some(slot) => match self.await_slot(h, &slot) {
                Lookup::Ready(element) => Some(element),
                Lookup::Retry => None,
            },
            None => None,
        };
        match found {
            Some(element) => {
                self.counters.inc_hit();
                Some(element)
            },
            None => {
                self.counters.inc_miss();
                None
            },
        }
    }

    fn add(&self, key: K, element: E) -> E {
        let h = hash(&self.strategy, &key);
        loop {
            let mut table = self.table.lock();
            if let Some(slot) = self.find_slot(&table, h, &key) {
                drop(table);
                match self.await_slot(h, &slot) {
                    Lookup::Ready(existing) => return existing,
                    Lookup::Retry => continue,
                }
            }
            table.push_front(key, h, Slot::new(SlotState::Ready(element.clone())));
            return element;
        }
    }

    fn remove(&self, key: &K) -> Option<E> {
        let h = hash(&self.strategy, key);
        let (_, slot) = self
            .table
            .lock()
            .unlink(h, |k, _| self.strategy.equals(k, key))?;
        let state = match slot.state.try_lock() {
            Some(state) => state,
            // Readers hold a ready slot only while cloning its element.
            None if slot.ready.load(Ordering::Acquire) => slot.state.lock(),
            // A computation is in flight; its element goes to its caller only.
            None => return None,
        };
        match &*state {
            SlotState::Ready(element) => Some(element.clone()),
            SlotState::Computing | SlotState::Abandoned => None,
        }
    }

    fn len(&self) -> usize {
        self.table.lock().len()
    }

    fn clear(&self) {
        self.table.lock().clear();
    }

    fn try_get_or_add<F, X>(&self, key: K, supplier: F) -> Result<E, X>
    where
        F: FnOnce(&K) -> Result<E, X>,
    {
        let h = hash(&self.strategy, &key);
        loop {
            let mut table = self.table.lock();
            if let Some(slot) = self.find_slot(&table, h, &key) {
                drop(table);
                match self.await_slot(h, &slot) {
                    Lookup::Ready(element) => {
                        self.counters.inc_hit();
                        return Ok(element);
                    },
                    Lookup::Retry => {
                        debug!(hash = h, "retrying after abandoned computation");
                        continue;
                    },
                }
            }

            let slot = Slot::new(SlotState::Computing);
            let state = slot.state.lock();
            table.push_front(key.clone(), h, Arc::clone(&slot));
            drop(table);

            self.counters.inc_miss();
            self.counters.inc_computation();
            let computation = Computation {
                cache: self,
                slot: &slot,
                hash: h,
                state: Some(state),
            };
            return match supplier(&key) {
                Ok(element) => {
                    computation.complete(element.clone());
                    Ok(element)
                },
                Err(err) => {
                    drop(computation);
                    Err(err)
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn get_or_add_computes_once() {
        let cache: HeavySynchronizedHashCache<String, usize> = HeavySynchronizedHashCache::new();
        assert_eq!(cache.get_or_add("abc".to_string(), |k| k.len()), 3);
        assert_eq!(cache.get_or_add("abc".to_string(), |_| unreachable!()), 3);
        let metrics = cache.metrics();
        assert_eq!(metrics.computations, 1);
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn add_get_remove_round_trip() {
        let cache: HeavySynchronizedHashCache<u32, &str> = HeavySynchronizedHashCache::new();
        assert_eq!(cache.add(1, "one"), "one");
        assert_eq!(cache.add(1, "uno"), "one");
        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.remove(&1), Some("one"));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.remove(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn error_removes_entry_and_allows_retry() {
        let cache: HeavySynchronizedHashCache<u32, u32> = HeavySynchronizedHashCache::new();
        let failed: Result<u32, String> = cache.try_get_or_add(1, |_| Err("io".to_string()));
        assert_eq!(failed, Err("io".to_string()));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.try_get_or_add(1, |k| Ok::<_, String>(k + 1)), Ok(2));
        assert_eq!(cache.metrics().failures, 1);
        assert_eq!(cache.metrics().computations, 2);
    }

    #[test]
    fn panic_removes_entry() {
        let cache: HeavySynchronizedHashCache<u32, u32> = HeavySynchronizedHashCache::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.get_or_add(9, |_| panic!("supplier blew up"))
        }));
        assert!(outcome.is_err());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_or_add(9, |k| *k), 9);
    }

    #[test]
    fn grows_like_bucket_cache() {
        let cache: HeavySynchronizedHashCache<u32, u32> = HeavySynchronizedHashCache::new();
        for key in 0..100 {
            cache.add(key, key);
        }
        assert!(cache.capacity() >= 128);
        for key in 0..100 {
            assert_eq!(cache.get(&key), Some(key));
        }
        cache.check_invariants().unwrap();
        cache.clear();
        assert_eq!(cache.capacity(), 8);
    }

    #[test]
    fn waiters_observe_single_result() {
        let cache: Arc<HeavySynchronizedHashCache<u32, u64>> =
            Arc::new(HeavySynchronizedHashCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let (cache, calls, barrier) =
                    (Arc::clone(&cache), Arc::clone(&calls), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_add(7, |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        77
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 77);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().computations, 1);
    }

    #[test]
    fn slow_key_does_not_block_other_keys() {
        let cache: Arc<HeavySynchronizedHashCache<u32, u32>> =
            Arc::new(HeavySynchronizedHashCache::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_add(1, |_| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    1
                })
            })
        };
        started_rx.recv().unwrap();

        // The slow supplier is still running; other keys proceed.
        assert_eq!(cache.get_or_add(2, |_| 2), 2);
        assert_eq!(cache.add(3, 3), 3);
        assert_eq!(cache.len(), 3);

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap(), 1);
        assert_eq!(cache.get(&1), Some(1));
    }

    #[test]
    fn remove_does_not_wait_for_in_flight_computation() {
        let cache: Arc<HeavySynchronizedHashCache<u32, u32>> =
            Arc::new(HeavySynchronizedHashCache::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let slow = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_add(1, |_| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    10
                })
            })
        };
        started_rx.recv().unwrap();

        // The supplier cannot finish before the release below, so a blocking
        // remove would never return.
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.len(), 0);

        release_tx.send(()).unwrap();
        assert_eq!(slow.join().unwrap(), 10);
        // The detached result was not cached.
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get_or_add(1, |_| 11), 11);
        assert_eq!(cache.metrics().failures, 0);
    }

    #[test]
    fn waiter_recomputes_after_failure() {
        let cache: Arc<HeavySynchronizedHashCache<u32, u32>> =
            Arc::new(HeavySynchronizedHashCache::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let failing = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.try_get_or_add(5, |_| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Err::<u32, &str>("load failed")
                })
            })
        };
        started_rx.recv().unwrap();

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_or_add(5, |_| 55))
        };
        // Give the waiter time to block on the slot.
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert_eq!(failing.join().unwrap(), Err("load failed"));
        assert_eq!(waiter.join().unwrap(), 55);
        assert_eq!(cache.get(&5), Some(55));
        assert_eq!(cache.len(), 1);
    }
}
