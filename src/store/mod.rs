//! Cache implementations.
//!
//! - [`bucket`]: single-owner chained-bucket cache.
//! - [`synchronized`]: one-mutex wrapper for any single-owner cache, plus
//!   read-only views.
//! - [`open_addressing`]: single-owner cache for raw `u32` keys.
//! - [`weak`]: interning caches that never keep their values alive.
//! - [`heavy`]: memoizing cache with at-most-once computation per key.

pub mod bucket;
pub mod heavy;
pub mod open_addressing;
pub mod synchronized;
pub mod weak;
