//! Error types for the hitcache library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (NaN or out-of-range load factor, capacity overflow).
//! - [`InvariantError`]: Returned by `check_invariants` methods when a table's
//!   internal structure is inconsistent.
//!
//! Loader errors raised by the DAO layer live in [`crate::dao::DaoError`].
//!
//! ## Example Usage
//!
//! ```
//! use hitcache::builder::CacheConfig;
//! use hitcache::error::ConfigError;
//! use hitcache::store::bucket::BucketHashCache;
//!
//! let cache: Result<BucketHashCache<String, i32>, ConfigError> =
//!     BucketHashCache::try_with_config(CacheConfig::new(16, 0.5));
//! assert!(cache.is_ok());
//!
//! let bad = BucketHashCache::<String, i32>::try_with_config(CacheConfig::new(16, f32::NAN));
//! assert!(bad.unwrap_err().to_string().contains("load factor"));
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by `try_with_config` constructors and
/// [`CacheBuilder`](crate::builder::CacheBuilder) `build_*` methods. Carries a
/// human-readable description of which parameter failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when a table invariant does not hold.
///
/// Produced by `check_invariants` (e.g.
/// [`IntOpenAddressingHashCache::check_invariants`](crate::store::open_addressing::IntOpenAddressingHashCache::check_invariants)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
