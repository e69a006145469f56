//! Cache wrappers.
//!
//! - [`SynchronizedCache`]: turns any [`Cache`] into a [`SharedCache`].
//! - [`UnmodifiableCache`]: read-only [`CacheView`] over a shared cache.
//! - [`EmptyCache`]: a [`CacheView`] that never holds anything.
//!
//! ## Synchronization
//!
//! Every operation, including the supplier run by `get_or_add`, executes
//! under one `parking_lot::Mutex`. That makes `get_or_add` atomic per key
//! but serializes computations for *all* keys; use
//! [`HeavySynchronizedHashCache`](crate::store::heavy::HeavySynchronizedHashCache)
//! when suppliers are slow.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use hitcache::store::synchronized::SynchronizedBucketHashCache;
//! use hitcache::traits::SharedCache;
//!
//! let cache: Arc<SynchronizedBucketHashCache<u32, u32>> = Arc::new(Default::default());
//! let workers: Vec<_> = (0..4u32)
//!     .map(|t| {
//!         let cache = Arc::clone(&cache);
//!         thread::spawn(move || {
//!             for key in 0..100 {
//!                 cache.add(key, t);
//!             }
//!         })
//!     })
//!     .collect();
//! for worker in workers {
//!     worker.join().unwrap();
//! }
//! assert_eq!(cache.len(), 100);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::hash::DefaultStrategy;
use crate::store::bucket::BucketHashCache;
use crate::traits::{Cache, CacheView, SharedCache};

/// A [`BucketHashCache`] behind a single mutex.
pub type SynchronizedBucketHashCache<K, E, S = DefaultStrategy> =
    SynchronizedCache<BucketHashCache<K, E, S>>;

/// Wraps a single-owner cache in one mutex.
#[derive(Debug, Default)]
pub struct SynchronizedCache<C> {
    inner: Mutex<C>,
}

impl<C> SynchronizedCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Lock the wrapped cache for a batch of operations.
    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock()
    }

    pub fn get_mut(&mut self) -> &mut C {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> C {
        self.inner.into_inner()
    }
}

impl<K, E, C> SharedCache<K, E> for SynchronizedCache<C>
where
    C: Cache<K, E> + Send,
{
    fn get(&self, key: &K) -> Option<E> {
        self.inner.lock().get(key)
    }

    fn add(&self, key: K, element: E) -> E {
        self.inner.lock().add(key, element)
    }

    fn remove(&self, key: &K) -> Option<E> {
        self.inner.lock().remove(key)
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn clear(&self) {
        self.inner.lock().clear();
    }

    fn try_get_or_add<F, X>(&self, key: K, supplier: F) -> Result<E, X>
    where
        F: FnOnce(&K) -> Result<E, X>,
    {
        self.inner.lock().try_get_or_add(key, supplier)
    }
}

/// Read-only view over a shared cache.
///
/// The view keeps the cache alive and sees every change made through other
/// handles, but offers no way to modify it.
pub struct UnmodifiableCache<C, K, E> {
    inner: Arc<C>,
    _entries: PhantomData<fn(&K) -> E>,
}

impl<C, K, E> UnmodifiableCache<C, K, E>
where
    C: SharedCache<K, E>,
{
    pub fn new(inner: Arc<C>) -> Self {
        Self {
            inner,
            _entries: PhantomData,
        }
    }
}

impl<C, K, E> Clone for UnmodifiableCache<C, K, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _entries: PhantomData,
        }
    }
}

impl<C: fmt::Debug, K, E> fmt::Debug for UnmodifiableCache<C, K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnmodifiableCache").field(&self.inner).finish()
    }
}

impl<C, K, E> CacheView<K, E> for UnmodifiableCache<C, K, E>
where
    C: SharedCache<K, E>,
{
    fn get(&self, key: &K) -> Option<E> {
        self.inner.get(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// A cache view with no entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyCache;

impl<K, E> CacheView<K, E> for EmptyCache {
    fn get(&self, _key: &K) -> Option<E> {
        None
    }

    fn len(&self) -> usize {
        0
    }
}
