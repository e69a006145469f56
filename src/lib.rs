//! hitcache: interning and memoizing hash caches for firewall hit analysis.
//!
//! - [`store`]: the cache implementations (chained buckets, open addressing,
//!   weak interning, at-most-once memoization, a synchronized wrapper).
//! - [`firewall`]: attribute value types interned through those caches.
//! - [`dao`]: hit and rule access memoized per job.
//!
//! Every cache implements [`traits::Cache`] or [`traits::SharedCache`]; see
//! [`traits`] for the common contract.

pub mod builder;
pub mod dao;
pub mod ds;
pub mod error;
pub mod firewall;
pub mod hash;
pub mod prelude;
pub mod store;
pub mod traits;
