//! Interning cache that holds its elements weakly.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──owns──► Arc<Interned<T>> ◄──Weak── entry ── WeakHashCache
//!                         │                                  ▲
//!                         │ drop of last Arc                 │ drained by every
//!                         ▼                                  │ cache operation
//!                    watchers: [(queue, hash, id), ...] ──► ReclaimQueue
//! ```
//!
//! - A cached value lives in an [`Interned<T>`] shared through [`Canonical<T>`]
//!   (`Arc<Interned<T>>`). The table only stores a `Weak` handle, so the cache
//!   never keeps a value alive.
//! - When a value is added, the cache registers a watcher on it. Dropping the
//!   last strong handle posts `(hash, entry id)` to every watching cache's
//!   reclamation queue.
//! - Every public operation first drains the queue and unlinks the notified
//!   entries, so `len` never counts a value that is known to be gone.
//! - `get` upgrades the handle, so it cannot return a reclaimed value even if
//!   its notification has not been drained yet. `add` and `get_or_add`
//!   replace such a dead entry instead of returning it.
//!
//! ## Key Components
//! - [`Interned`] / [`Canonical`]: the shared value and its handle.
//! - [`WeakHashCache`]: generic cache keyed through a [`HashStrategy`].
//! - [`IntWeakHashCache`]: `u32`-keyed variant hashing keys to themselves.
//!
//! ## Example Usage
//! ```rust
//! use std::sync::Arc;
//!
//! use hitcache::store::weak::{canonical, IntWeakHashCache};
//! use hitcache::traits::SharedCache;
//!
//! let cache: IntWeakHashCache<String> = IntWeakHashCache::new();
//! let first = cache.get_or_add(0x0A00_0001, |_| canonical("10.0.0.1".to_string()));
//! let again = cache.get_or_add(0x0A00_0001, |_| canonical("unused".to_string()));
//! assert!(Arc::ptr_eq(&first, &again));
//!
//! drop(first);
//! drop(again);
//! assert_eq!(cache.get(&0x0A00_0001), None);
//! assert_eq!(cache.len(), 0);
//! ```
//!
//! ## Thread Safety
//! - The table sits behind a `parking_lot::Mutex`; the reclamation queue has
//!   its own lock and is only ever appended to by destructors, so dropping a
//!   value while the table lock is held cannot deadlock.
//! - `get_or_add` runs its supplier under the table lock; the supplier must
//!   not touch this cache, but may intern through other caches.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::builder::CacheConfig;
use crate::ds::bucket_table::BucketTable;
use crate::ds::sizing::TableSizing;
use crate::error::{ConfigError, InvariantError};
use crate::hash::{DefaultStrategy, HashStrategy, IdentityStrategy, hash};
use crate::traits::SharedCache;

/// Shared handle to an interned value.
pub type Canonical<T> = Arc<Interned<T>>;

/// Wraps `value` in a fresh, unregistered [`Canonical`] handle.
pub fn canonical<T>(value: T) -> Canonical<T> {
    Arc::new(Interned::new(value))
}

/// Reclamation notice posted when an interned value is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reclaimed {
    hash: u32,
    id: u64,
}

#[derive(Debug, Default)]
struct ReclaimQueue {
    pending: Mutex<Vec<Reclaimed>>,
}

impl ReclaimQueue {
    fn push(&self, notice: Reclaimed) {
        self.pending.lock().push(notice);
    }

    fn drain(&self) -> Vec<Reclaimed> {
        std::mem::take(&mut *self.pending.lock())
    }
}

#[derive(Debug)]
struct Watcher {
    queue: Weak<ReclaimQueue>,
    notice: Reclaimed,
}

/// An immutable value plus the caches watching for its reclamation.
///
/// Equality, hashing, ordering and formatting all delegate to the value.
pub struct Interned<T> {
    value: T,
    watchers: Mutex<Vec<Watcher>>,
}

impl<T> Interned<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    fn watch(&self, queue: &Arc<ReclaimQueue>, notice: Reclaimed) {
        let mut watchers = self.watchers.lock();
        // Drop registrations whose cache is gone so long-lived values stay small.
        watchers.retain(|w| w.queue.strong_count() > 0);
        watchers.push(Watcher {
            queue: Arc::downgrade(queue),
            notice,
        });
    }
}

impl<T> Drop for Interned<T> {
    fn drop(&mut self) {
        for watcher in self.watchers.get_mut().drain(..) {
            if let Some(queue) = watcher.queue.upgrade() {
                queue.push(watcher.notice);
            }
        }
    }
}

impl<T> Deref for Interned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: PartialEq> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: Eq> Eq for Interned<T> {}

impl<T: Hash> Hash for Interned<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: PartialOrd> PartialOrd for Interned<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl<T: Ord> Ord for Interned<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Interned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

impl<T: fmt::Display> fmt::Display for Interned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

#[derive(Debug)]
struct WeakEntry<T> {
    id: u64,
    handle: Weak<Interned<T>>,
}

#[derive(Debug)]
struct Table<K, T> {
    entries: BucketTable<K, WeakEntry<T>>,
    next_id: u64,
}

/// Interning cache whose entries disappear once their value is unowned.
pub struct WeakHashCache<K, T, S = DefaultStrategy> {
    table: Mutex<Table<K, T>>,
    queue: Arc<ReclaimQueue>,
    strategy: S,
}

/// [`WeakHashCache`] keyed by raw `u32` values.
pub type IntWeakHashCache<T> = WeakHashCache<u32, T, IdentityStrategy>;

impl<K, T, S> WeakHashCache<K, T, S>
where
    S: HashStrategy<K> + Default,
{
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        Self::with_strategy(S::default())
    }

    /// Create a cache sized for `initial_capacity` values at the default load factor.
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

impl<K, T, S> WeakHashCache<K, T, S>
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
            table: Mutex::new(Table {
                entries: BucketTable::new(sizing),
                next_id: 0,
            }),
            queue: Arc::new(ReclaimQueue::default()),
            strategy,
        }
    }

    /// Unlinks every entry whose value has been reported dropped.
    ///
    /// Returns the number of entries removed. Every other operation does this
    /// implicitly; calling it directly only matters for `capacity` readings.
    pub fn purge_reclaimed(&self) -> usize {
        let mut table = self.table.lock();
        self.purge(&mut table)
    }

    /// Current number of bucket slots.
    pub fn capacity(&self) -> usize {
        self.table.lock().entries.capacity()
    }

    /// Verify bucket placement, uniqueness and the entry count.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.table.lock().entries.check_invariants(&self.strategy)
    }

    fn purge(&self, table: &mut Table<K, T>) -> usize {
        let notices = self.queue.drain();
        if notices.is_empty() {
            return 0;
        }
        let purged = notices
            .into_iter()
            .filter(|notice| {
                table
                    .entries
                    .unlink(notice.hash, |_, entry| entry.id == notice.id)
                    .is_some()
            })
            .count();
        trace!(purged, len = table.entries.len(), "purged reclaimed entries");
        purged
    }

    /// Finds the entry for `key`; a dead entry is unlinked and reported absent.
    fn find_live(&self, table: &mut Table<K, T>, h: u32, key: &K) -> Option<Canonical<T>> {
        let (id, live) = table
            .entries
            .find(h, |k, _| self.strategy.equals(k, key))
            .map(|(_, entry)| (entry.id, entry.handle.upgrade()))?;
        if live.is_none() {
            table.entries.unlink(h, |_, entry| entry.id == id);
        }
        live
    }

    fn insert(&self, table: &mut Table<K, T>, key: K, h: u32, element: &Canonical<T>) {
        let id = table.next_id;
        table.next_id += 1;
        element.watch(&self.queue, Reclaimed { hash: h, id });
        table.entries.push_front(
            key,
            h,
            WeakEntry {
                id,
                handle: Arc::downgrade(element),
            },
        );
    }
}

impl<K, T, S> Default for WeakHashCache<K, T, S>
where
    S: HashStrategy<K> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T, S> fmt::Debug for WeakHashCache<K, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("WeakHashCache")
            .field("len", &table.entries.len())
            .field("capacity", &table.entries.capacity())
            .finish_non_exhaustive()
    }
}

impl<K, T, S> SharedCache<K, Canonical<T>> for WeakHashCache<K, T, S>
where
    K: Send,
    T: Send + Sync,
    S: HashStrategy<K> + Send + Sync,
{
    fn get(&self, key: &K) -> Option<Canonical<T>> {
        let mut table = self.table.lock();
        self.purge(&mut table);
        let h = hash(&self.strategy, key);
        table
            .entries
            .find(h, |k, _| self.strategy.equals(k, key))
            .and_then(|(_, entry)| entry.handle.upgrade())
    }

    fn add(&self, key: K, element: Canonical<T>) -> Canonical<T> {
        let mut table = self.table.lock();
        self.purge(&mut table);
        let h = hash(&self.strategy, &key);
        if let Some(existing) = self.find_live(&mut table, h, &key) {
            return existing;
        }
        self.insert(&mut table, key, h, &element);
        element
    }

    fn remove(&self, key: &K) -> Option<Canonical<T>> {
        let mut table = self.table.lock();
        self.purge(&mut table);
        let h = hash(&self.strategy, key);
        table
            .entries
            .unlink(h, |k, _| self.strategy.equals(k, key))
            .and_then(|(_, entry)| entry.handle.upgrade())
    }

    fn len(&self) -> usize {
        let mut table = self.table.lock();
        self.purge(&mut table);
        table.entries.len()
    }

    fn clear(&self) {
        let mut table = self.table.lock();
        self.queue.drain();
        table.entries.clear();
    }

    fn try_get_or_add<F, X>(&self, key: K, supplier: F) -> Result<Canonical<T>, X>
    where
        F: FnOnce(&K) -> Result<Canonical<T>, X>,
    {
        let mut table = self.table.lock();
        self.purge(&mut table);
        let h = hash(&self.strategy, &key);
        if let Some(existing) = self.find_live(&mut table, h, &key) {
            return Ok(existing);
        }
        let element = supplier(&key)?;
        self.insert(&mut table, key, h, &element);
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::hash::IntArrayStrategy;

    #[test]
    fn interned_delegates_to_value() {
        let a = canonical(String::from("tcp"));
        let b = canonical(String::from("tcp"));
        assert_eq!(a, b);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 3);
        assert_eq!(format!("{a}"), "tcp");
        assert_eq!(format!("{a:?}"), "\"tcp\"");
    }

    #[test]
    fn get_or_add_returns_canonical_instance() {
        let cache: WeakHashCache<String, u32> = WeakHashCache::new();
        let first = cache.get_or_add("a".to_string(), |_| canonical(1));
        let second = cache.get_or_add("a".to_string(), |_| canonical(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(**second, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn dropping_last_handle_reclaims_entry() {
        let cache: IntWeakHashCache<&str> = IntWeakHashCache::new();
        let value = cache.add(7, canonical("seven"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&7).is_some());
        drop(value);
        assert_eq!(cache.get(&7), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn entry_survives_while_any_handle_lives() {
        let cache: IntWeakHashCache<&str> = IntWeakHashCache::new();
        let a = cache.add(1, canonical("one"));
        let b = Arc::clone(&a);
        drop(a);
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get(&1).unwrap(), &b));
    }

    #[test]
    fn add_replaces_dead_entry_before_drain() {
        let cache: IntWeakHashCache<&str> = IntWeakHashCache::new();
        drop(cache.add(3, canonical("old")));
        // The notice is queued but not drained yet.
        let fresh = cache.add(3, canonical("new"));
        assert_eq!(**fresh, "new");
        assert_eq!(cache.len(), 1);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn stale_notice_does_not_unlink_replacement() {
        let cache: IntWeakHashCache<&str> = IntWeakHashCache::new();
        let old = cache.add(4, canonical("old"));
        assert_eq!(cache.remove(&4).as_deref().map(|v| **v), Some("old"));
        let new = cache.add(4, canonical("new"));
        drop(old);
        assert_eq!(cache.purge_reclaimed(), 0);
        assert!(Arc::ptr_eq(&cache.get(&4).unwrap(), &new));
    }

    #[test]
    fn remove_returns_live_value_only() {
        let cache: WeakHashCache<u64, String> = WeakHashCache::new();
        let kept = cache.add(1, canonical("kept".to_string()));
        assert_eq!(cache.remove(&1).map(|v| v.get().clone()), Some("kept".to_string()));
        assert_eq!(cache.remove(&1), None);
        drop(kept);
        assert!(cache.is_empty());
    }

    #[test]
    fn shrinks_after_mass_reclamation() {
        let cache: IntWeakHashCache<u32> = IntWeakHashCache::new();
        let values: Vec<_> = (1..=200).map(|k| cache.add(k, canonical(k))).collect();
        let grown = cache.capacity();
        assert!(grown >= 256);
        drop(values);
        assert_eq!(cache.purge_reclaimed(), 200);
        assert_eq!(cache.capacity(), 8);
        assert!(cache.is_empty());
    }

    #[test]
    fn one_value_in_two_caches() {
        let left: IntWeakHashCache<&str> = IntWeakHashCache::new();
        let right: WeakHashCache<[u32; 4], &str, IntArrayStrategy> = WeakHashCache::new();
        let value = left.add(9, canonical("shared"));
        right.add([0, 0, 0, 9], Arc::clone(&value));
        drop(value);
        assert_eq!(left.len(), 0);
        assert_eq!(right.len(), 0);
    }

    #[test]
    fn value_outliving_cache_drops_cleanly() {
        let value;
        {
            let cache: IntWeakHashCache<&str> = IntWeakHashCache::new();
            value = cache.add(1, canonical("orphan"));
        }
        assert_eq!(**value, "orphan");
    }

    #[test]
    fn clear_forgets_everything() {
        let cache: IntWeakHashCache<u32> = IntWeakHashCache::new();
        let a = cache.add(1, canonical(1));
        cache.add(2, canonical(2));
        cache.clear();
        assert!(cache.is_empty());
        drop(a);
        assert_eq!(cache.purge_reclaimed(), 0);
    }

    #[test]
    fn concurrent_interning_yields_one_instance() {
        let cache: Arc<IntWeakHashCache<u32>> = Arc::new(IntWeakHashCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    (0..64)
                        .map(|k| cache.get_or_add(k, |k| canonical(*k)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<Canonical<u32>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for interned in &results[1..] {
            for (a, b) in interned.iter().zip(&results[0]) {
                assert!(Arc::ptr_eq(a, b));
            }
        }
        assert_eq!(cache.len(), 64);
        drop(results);
        assert_eq!(cache.len(), 0);
    }
}
