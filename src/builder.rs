//! Configuration and a unified builder for every cache variant.
//!
//! [`CacheConfig`] carries the two knobs every table shares: the number of
//! elements it is initially sized for and the load factor. [`CacheBuilder`]
//! validates a configuration once and hands it to the chosen variant.
//!
//! ## Example
//!
//! ```rust
//! use hitcache::builder::CacheBuilder;
//! use hitcache::hash::FAST_LOAD_FACTOR;
//! use hitcache::traits::{Cache, SharedCache};
//!
//! let mut local = CacheBuilder::new(64)
//!     .load_factor(FAST_LOAD_FACTOR)
//!     .build_bucket::<String, u32>()
//!     .unwrap();
//! local.add("tcp".to_string(), 6);
//! assert_eq!(local.get(&"tcp".to_string()), Some(6));
//!
//! let shared = CacheBuilder::new(16).build_heavy::<String, usize>().unwrap();
//! assert_eq!(shared.get_or_add("job".to_string(), |job| job.len()), 3);
//! ```

use std::hash::Hash;

use crate::ds::sizing::TableSizing;
use crate::error::ConfigError;
use crate::hash::{DEFAULT_INIT_CAPACITY, DEFAULT_LOAD_FACTOR, HashStrategy};
use crate::store::bucket::BucketHashCache;
use crate::store::heavy::HeavySynchronizedHashCache;
use crate::store::open_addressing::IntOpenAddressingHashCache;
use crate::store::synchronized::SynchronizedBucketHashCache;
use crate::store::weak::{IntWeakHashCache, WeakHashCache};

/// Initial sizing parameters shared by every cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Number of elements the table is sized for before its first resize.
    pub initial_capacity: usize,
    /// Target ratio of entries to table slots, in `(0, 1]`.
    pub load_factor: f32,
}

impl CacheConfig {
    pub const fn new(initial_capacity: usize, load_factor: f32) -> Self {
        Self {
            initial_capacity,
            load_factor,
        }
    }

    /// Config for `initial_capacity` elements at the default load factor.
    pub const fn with_capacity(initial_capacity: usize) -> Self {
        Self::new(initial_capacity, DEFAULT_LOAD_FACTOR)
    }

    /// Checks the load factor range and that the scaled capacity fits.
    ///
    /// # Example
    ///
    /// ```
    /// use hitcache::builder::CacheConfig;
    ///
    /// assert!(CacheConfig::new(8, 0.75).validate().is_ok());
    /// assert!(CacheConfig::new(8, 0.0).validate().is_err());
    /// assert!(CacheConfig::new(8, 1.01).validate().is_err());
    /// assert!(CacheConfig::new(8, f32::NAN).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        TableSizing::try_new(self).map(|_| ())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INIT_CAPACITY, DEFAULT_LOAD_FACTOR)
    }
}

/// Builder for creating cache instances.
///
/// Every `build_*` method validates the configuration and returns
/// [`ConfigError`] instead of panicking.
#[derive(Debug, Clone, Copy)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    /// Create a builder for `initial_capacity` elements at the default load factor.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            config: CacheConfig::with_capacity(initial_capacity),
        }
    }

    /// Override the load factor.
    pub fn load_factor(mut self, load_factor: f32) -> Self {
        self.config.load_factor = load_factor;
        self
    }

    /// The configuration the builder will hand to each cache.
    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Single-owner chained-bucket cache keyed by the key's own `Eq + Hash`.
    pub fn build_bucket<K, E>(self) -> Result<BucketHashCache<K, E>, ConfigError>
    where
        K: Eq + Hash,
    {
        BucketHashCache::try_with_config(self.config)
    }

    /// Single-owner chained-bucket cache with a custom strategy.
    pub fn build_bucket_with<K, E, S>(
        self,
        strategy: S,
    ) -> Result<BucketHashCache<K, E, S>, ConfigError>
    where
        S: HashStrategy<K>,
    {
        BucketHashCache::try_with_strategy(self.config, strategy)
    }

    /// Chained-bucket cache behind a single mutex.
    pub fn build_synchronized<K, E>(self) -> Result<SynchronizedBucketHashCache<K, E>, ConfigError>
    where
        K: Eq + Hash,
    {
        self.build_bucket().map(SynchronizedBucketHashCache::new)
    }

    /// Open-addressing cache for `u32` keys.
    pub fn build_open_addressing<E>(self) -> Result<IntOpenAddressingHashCache<E>, ConfigError> {
        IntOpenAddressingHashCache::try_with_config(self.config)
    }

    /// Interning cache holding its elements weakly.
    pub fn build_weak<K, T>(self) -> Result<WeakHashCache<K, T>, ConfigError>
    where
        K: Eq + Hash,
    {
        WeakHashCache::try_with_config(self.config)
    }

    /// Interning cache with a custom strategy.
    pub fn build_weak_with<K, T, S>(
        self,
        strategy: S,
    ) -> Result<WeakHashCache<K, T, S>, ConfigError>
    where
        S: HashStrategy<K>,
    {
        WeakHashCache::try_with_strategy(self.config, strategy)
    }

    /// Interning cache for `u32` keys.
    pub fn build_int_weak<T>(self) -> Result<IntWeakHashCache<T>, ConfigError> {
        IntWeakHashCache::try_with_config(self.config)
    }

    /// Memoizing cache with at-most-once computation per key.
    pub fn build_heavy<K, E>(self) -> Result<HeavySynchronizedHashCache<K, E>, ConfigError>
    where
        K: Eq + Hash,
    {
        HeavySynchronizedHashCache::try_with_config(self.config)
    }

    /// Memoizing cache with a custom strategy.
    pub fn build_heavy_with<K, E, S>(
        self,
        strategy: S,
    ) -> Result<HeavySynchronizedHashCache<K, E, S>, ConfigError>
    where
        S: HashStrategy<K>,
    {
        HeavySynchronizedHashCache::try_with_strategy(self.config, strategy)
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }
}
