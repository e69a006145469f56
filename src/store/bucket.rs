//! Chained-bucket hash cache.
//!
//! ## Architecture
//! - Entries live in a power-of-two bucket array; each bucket is a singly
//!   linked chain of `{ key, mixed hash, element }` nodes.
//! - Lookup compares the stored hash first, then strategy equality.
//! - The table doubles once `len >= capacity * load_factor` and halves once
//!   `len <= grow_threshold / 4` (never below 8 slots).
//!
//! ## Key Components
//! - `BucketHashCache`: single-owner cache implementing [`Cache`].
//!
//! ## Core Operations
//! - `add`: insert-if-absent, returning the winning element.
//! - `get` / `get_ref`: look up by key.
//! - `remove`: unlink the entry, possibly shrinking.
//! - `get_or_add`: compute on miss.
//!
//! ## Performance Trade-offs
//! - One allocation per entry; resizes relink nodes without reallocating them.
//! - Rehash is a full scan, so a single insert may cost O(n).
//!
//! ## When to Use
//! - Keys that need a custom equality (e.g. raw `u32` word arrays via
//!   [`IntArrayStrategy`](crate::hash::IntArrayStrategy)).
//! - A local cache that must shrink back after a burst.
//!
//! ## Example Usage
//! ```rust
//! use hitcache::hash::IntArrayStrategy;
//! use hitcache::store::bucket::BucketHashCache;
//! use hitcache::traits::Cache;
//!
//! let mut cache: BucketHashCache<Vec<u32>, &str, _> =
//!     BucketHashCache::with_strategy(IntArrayStrategy);
//! cache.add(vec![10, 0, 0, 1], "gateway");
//! assert_eq!(cache.get(&vec![10, 0, 0, 1]), Some("gateway"));
//! assert!(!cache.contains_key(&vec![10, 0, 0, 2]));
//! ```
//!
//! ## Type Constraints
//! - `S: HashStrategy<K>` supplies equality and hashing.
//! - `E: Clone` for the [`Cache`] impl, since elements are returned by value.
//!
//! ## Thread Safety
//! - Not synchronized. Wrap it in
//!   [`SynchronizedCache`](crate::store::synchronized::SynchronizedCache) to share it.
//!
//! ## Implementation Notes
//! - A "null" key is an ordinary key: use `Option<K>` keys and `None`.

use crate::builder::CacheConfig;
use crate::ds::bucket_table::BucketTable;
use crate::ds::sizing::TableSizing;
use crate::error::{ConfigError, InvariantError};
use crate::hash::{DefaultStrategy, HashStrategy, hash};
use crate::traits::Cache;

/// Single-owner chained-bucket cache.
#[derive(Debug)]
pub struct BucketHashCache<K, E, S = DefaultStrategy> {
    table: BucketTable<K, E>,
    strategy: S,
}

impl<K, E, S> BucketHashCache<K, E, S>
where
    S: HashStrategy<K> + Default,
{
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        Self::with_strategy(S::default())
    }

    /// Create a cache sized for `initial_capacity` elements at the default load factor.
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

    /// Create a cache from `config`, rejecting invalid parameters.
    pub fn try_with_config(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::try_with_strategy(config, S::default())
    }
}

impl<K, E, S> BucketHashCache<K, E, S>
where
    S: HashStrategy<K>,
{
    /// Create a cache with the default configuration and a custom strategy.
    pub fn with_strategy(strategy: S) -> Self {
        let sizing = match TableSizing::try_new(&CacheConfig::default()) {
            Ok(sizing) => sizing,
            Err(err) => unreachable!("default config is valid: {err}"),
        };
        Self {
            table: BucketTable::new(sizing),
            strategy,
        }
    }

    /// Create a cache from `config` and a custom strategy.
    pub fn try_with_strategy(config: CacheConfig, strategy: S) -> Result<Self, ConfigError> {
        Ok(Self {
            table: BucketTable::new(TableSizing::try_new(&config)?),
            strategy,
        })
    }

    /// Borrow the element cached for `key`.
    pub fn get_ref(&self, key: &K) -> Option<&E> {
        let h = hash(&self.strategy, key);
        self.table
            .find(h, |k, _| self.strategy.equals(k, key))
            .map(|(_, element)| element)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get_ref(key).is_some()
    }

    /// Current number of bucket slots.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn load_factor(&self) -> f32 {
        self.table.sizing().load_factor()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Iterate over entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &E)> {
        self.table.iter()
    }

    /// Verify bucket placement, uniqueness and the entry count.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.table.check_invariants(&self.strategy)
    }
}

impl<K, E, S> Default for BucketHashCache<K, E, S>
where
    S: HashStrategy<K> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E, S> Cache<K, E> for BucketHashCache<K, E, S>
where
    E: Clone,
    S: HashStrategy<K>,
{
    fn get(&self, key: &K) -> Option<E> {
        self.get_ref(key).cloned()
    }

    fn add(&mut self, key: K, element: E) -> E {
        let h = hash(&self.strategy, &key);
        let strategy = &self.strategy;
        if let Some((_, existing)) = self.table.find(h, |k, _| strategy.equals(k, &key)) {
            return existing.clone();
        }
        self.table.push_front(key, h, element.clone());
        element
    }

    fn remove(&mut self, key: &K) -> Option<E> {
        let h = hash(&self.strategy, key);
        let strategy = &self.strategy;
        self.table
            .unlink(h, |k, _| strategy.equals(k, key))
            .map(|(_, element)| element)
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn clear(&mut self) {
        self.table.clear();
    }

    fn try_get_or_add<F, X>(&mut self, key: K, supplier: F) -> Result<E, X>
    where
        F: FnOnce(&K) -> Result<E, X>,
    {
        let h = hash(&self.strategy, &key);
        let strategy = &self.strategy;
        if let Some((_, existing)) = self.table.find(h, |k, _| strategy.equals(k, &key)) {
            return Ok(existing.clone());
        }
        let element = supplier(&key)?;
        self.table.push_front(key, h, element.clone());
        Ok(element)
    }
}
