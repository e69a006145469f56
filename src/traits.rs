//! # Cache Contract
//!
//! Every cache in this crate, whatever its collision strategy or reference
//! policy, answers the same six operations. Two traits carry them, split by
//! ownership model rather than by feature set.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────┐    ┌──────────────────────────────────────┐
//!   │            Cache<K, E>               │    │          SharedCache<K, E>           │
//!   │        (single owner, &mut)          │    │      (thread-safe, &self, Sync)      │
//!   │                                      │    │                                      │
//!   │  get(&, &K) → Option<E>              │    │  get(&, &K) → Option<E>              │
//!   │  add(&mut, K, E) → E                 │    │  add(&, K, E) → E                    │
//!   │  remove(&mut, &K) → Option<E>        │    │  remove(&, &K) → Option<E>           │
//!   │  len(&) → usize                      │    │  len(&) → usize                      │
//!   │  clear(&mut)                         │    │  clear(&)                            │
//!   │  get_or_add(&mut, K, FnOnce) → E     │    │  get_or_add(&, K, FnOnce) → E        │
//!   │  try_get_or_add(&mut, K, FnOnce)     │    │  try_get_or_add(&, K, FnOnce)        │
//!   └──────────────────┬───────────────────┘    └──────────────────▲───────────────────┘
//!                      │                                           │
//!        BucketHashCache                           SynchronizedCache<C: Cache>
//!        IntOpenAddressingHashCache                WeakHashCache / IntWeakHashCache
//!                      └──── wrapped by ──────────►HeavySynchronizedHashCache
//! ```
//!
//! ## Semantics shared by all implementations
//!
//! | Operation        | Behavior                                                     |
//! |------------------|--------------------------------------------------------------|
//! | `get`            | Element for `key`, or `None` if absent                       |
//! | `add`            | Inserts if absent; returns the *winning* element (existing   |
//! |                  | one if the key was present, otherwise the new one)           |
//! | `remove`         | Removes the entry; returns its element when still available  |
//! | `len`            | Number of live entries                                       |
//! | `clear`          | Removes everything and shrinks the table                     |
//! | `get_or_add`     | Runs `supplier` only when `key` is absent                    |
//! | `try_get_or_add` | Fallible supplier; an `Err` inserts nothing and is returned  |
//!
//! Elements are returned by value, so element types are usually cheap to
//! clone (`Arc<T>`, small `Copy` values).
//!
//! ## Suppliers
//!
//! A supplier must not call back into the cache instance that invoked it.
//! Synchronized caches hold a lock (structural or per-entry) while the
//! supplier runs, so re-entering the same instance deadlocks. Calling a
//! *different* cache instance from a supplier is fine.
//!
//! ## Example Usage
//!
//! ```
//! use hitcache::store::bucket::BucketHashCache;
//! use hitcache::traits::Cache;
//!
//! fn intern_all<C: Cache<String, usize>>(cache: &mut C, words: &[&str]) {
//!     for word in words {
//!         cache.get_or_add(word.to_string(), |w| w.len());
//!     }
//! }
//!
//! let mut cache: BucketHashCache<String, usize> = BucketHashCache::new();
//! intern_all(&mut cache, &["deny", "allow", "deny"]);
//! assert_eq!(cache.len(), 2);
//! assert_eq!(cache.get(&"allow".to_string()), Some(5));
//! ```

use std::convert::Infallible;

/// Operations of a cache owned by a single thread (or behind an external lock).
///
/// # Example
///
/// ```
/// use hitcache::store::open_addressing::IntOpenAddressingHashCache;
/// use hitcache::traits::Cache;
///
/// let mut cache: IntOpenAddressingHashCache<&str> = IntOpenAddressingHashCache::new();
/// assert_eq!(cache.add(7, "seven"), "seven");
/// // The first element stays: add is insert-if-absent.
/// assert_eq!(cache.add(7, "SEVEN"), "seven");
/// assert_eq!(cache.get(&7), Some("seven"));
/// assert_eq!(cache.remove(&7), Some("seven"));
/// assert_eq!(cache.get(&7), None);
/// ```
pub trait Cache<K, E> {
    /// Returns the element cached for `key`.
    fn get(&self, key: &K) -> Option<E>;

    /// Caches `element` under `key` unless the key is already present.
    ///
    /// Returns the element that ends up cached for `key`.
    fn add(&mut self, key: K, element: E) -> E;

    /// Removes `key`, returning its element if one was cached.
    fn remove(&mut self, key: &K) -> Option<E>;

    /// Returns the number of cached entries.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    fn clear(&mut self);

    /// Returns the element for `key`, computing and caching it if absent.
    ///
    /// `supplier` runs at most once, and only when `key` is absent.
    fn get_or_add<F>(&mut self, key: K, supplier: F) -> E
    where
        F: FnOnce(&K) -> E,
    {
        match self.try_get_or_add(key, |k| Ok::<E, Infallible>(supplier(k))) {
            Ok(element) => element,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`get_or_add`](Self::get_or_add).
    ///
    /// If `supplier` fails nothing is cached and its error is returned as is.
    fn try_get_or_add<F, X>(&mut self, key: K, supplier: F) -> Result<E, X>
    where
        F: FnOnce(&K) -> Result<E, X>,
    {
        if let Some(element) = self.get(&key) {
            return Ok(element);
        }
        let element = supplier(&key)?;
        Ok(self.add(key, element))
    }
}

/// Operations of a cache that synchronizes internally and is shared by reference.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use hitcache::store::heavy::HeavySynchronizedHashCache;
/// use hitcache::traits::SharedCache;
///
/// let cache = Arc::new(HeavySynchronizedHashCache::<u32, u64>::new());
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let cache = Arc::clone(&cache);
///         thread::spawn(move || cache.get_or_add(10, |n| (1..=u64::from(*n)).product()))
///     })
///     .collect();
/// for handle in handles {
///     assert_eq!(handle.join().unwrap(), 3_628_800);
/// }
/// assert_eq!(cache.len(), 1);
/// ```
pub trait SharedCache<K, E>: Send + Sync {
    /// Returns the element cached for `key`.
    fn get(&self, key: &K) -> Option<E>;

    /// Caches `element` under `key` unless the key is already present.
    ///
    /// Returns the element that ends up cached for `key`, which is the
    /// existing one if another thread won the race.
    fn add(&self, key: K, element: E) -> E;

    /// Removes `key`, returning its element if one was cached.
    fn remove(&self, key: &K) -> Option<E>;

    /// Returns the number of cached entries.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    fn clear(&self);

    /// Returns the element for `key`, computing and caching it if absent.
    ///
    /// `supplier` must not re-enter this cache.
    fn get_or_add<F>(&self, key: K, supplier: F) -> E
    where
        F: FnOnce(&K) -> E,
    {
        match self.try_get_or_add(key, |k| Ok::<E, Infallible>(supplier(k))) {
            Ok(element) => element,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`get_or_add`](Self::get_or_add).
    ///
    /// If `supplier` fails nothing is cached and its error is returned to
    /// this caller.
    fn try_get_or_add<F, X>(&self, key: K, supplier: F) -> Result<E, X>
    where
        F: FnOnce(&K) -> Result<E, X>;
}

/// Read-only access to cached entries.
///
/// Implemented by views that must not let their holder modify the cache, such
/// as [`UnmodifiableCache`](crate::store::synchronized::UnmodifiableCache) and
/// [`EmptyCache`](crate::store::synchronized::EmptyCache).
pub trait CacheView<K, E> {
    /// Returns the element cached for `key`.
    fn get(&self, key: &K) -> Option<E>;

    /// Returns the number of cached entries.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
