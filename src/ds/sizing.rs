//! Capacity bookkeeping shared by every hash table in the crate.
//!
//! A table's capacity is always a power of two so an index is `hash & mask`.
//! Growth and shrinking are driven by two thresholds derived from the load
//! factor:
//!
//! ```text
//!   shrink_threshold = grow_threshold / 4        grow_threshold = capacity * load_factor
//!   ──────────┬──────────────────────────────────────────┬──────────────►  len
//!    halve    │            steady state                  │  double
//!   (cap > 8) │                                          │
//! ```

use crate::builder::CacheConfig;
use crate::error::ConfigError;
use crate::hash::{MINIMUM_CAPACITY, checked_next_power_of_two};

/// Largest table a cache grows to.
pub const MAXIMUM_CAPACITY: usize = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TableSizing {
    capacity: usize,
    grow_threshold: usize,
    shrink_threshold: usize,
    load_factor: f32,
}

impl TableSizing {
    /// Validates `config` and computes the initial table size.
    pub(crate) fn try_new(config: &CacheConfig) -> Result<Self, ConfigError> {
        let load_factor = config.load_factor;
        if load_factor.is_nan() || load_factor <= 0.0 || load_factor > 1.0 {
            return Err(ConfigError::new(format!(
                "load factor must be in range (0, 1] and not NaN: {load_factor}"
            )));
        }

        let scaled = config.initial_capacity as f64 / f64::from(load_factor);
        if scaled > MAXIMUM_CAPACITY as f64 {
            return Err(ConfigError::new(format!(
                "initial capacity {} exceeds the maximum table size at load factor {load_factor}",
                config.initial_capacity
            )));
        }
        let capacity = checked_next_power_of_two(scaled as usize).ok_or_else(|| {
            ConfigError::new(format!(
                "initial capacity overflow: {}",
                config.initial_capacity
            ))
        })?;
        Ok(Self::with_capacity(capacity, load_factor))
    }

    fn with_capacity(capacity: usize, load_factor: f32) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let grow_threshold = (capacity as f64 * f64::from(load_factor)) as usize;
        Self {
            capacity,
            grow_threshold,
            shrink_threshold: grow_threshold >> 2,
            load_factor,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn mask(&self) -> usize {
        self.capacity - 1
    }

    #[inline]
    pub(crate) fn index(&self, hash: u32) -> usize {
        hash as usize & self.mask()
    }

    #[cfg(test)]
    fn grow_threshold(&self) -> usize {
        self.grow_threshold
    }

    #[cfg(test)]
    fn shrink_threshold(&self) -> usize {
        self.shrink_threshold
    }

    #[inline]
    pub(crate) fn load_factor(&self) -> f32 {
        self.load_factor
    }

    /// Returns `true` once `len` reached the grow threshold.
    #[inline]
    pub(crate) fn needs_grow(&self, len: usize) -> bool {
        len >= self.grow_threshold && self.capacity < MAXIMUM_CAPACITY
    }

    /// Returns `true` once `len` fell to the shrink threshold above the minimum capacity.
    #[inline]
    pub(crate) fn needs_shrink(&self, len: usize) -> bool {
        len <= self.shrink_threshold && self.capacity > MINIMUM_CAPACITY
    }

    pub(crate) fn grown(&self) -> Self {
        Self::with_capacity(self.capacity << 1, self.load_factor)
    }

    pub(crate) fn shrunk(&self) -> Self {
        Self::with_capacity(self.capacity >> 1, self.load_factor)
    }

    /// Sizing for an emptied table.
    pub(crate) fn cleared(&self) -> Self {
        if self.capacity > MINIMUM_CAPACITY {
            Self::with_capacity(MINIMUM_CAPACITY, self.load_factor)
        } else {
            *self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizing(initial_capacity: usize, load_factor: f32) -> TableSizing {
        TableSizing::try_new(&CacheConfig::new(initial_capacity, load_factor)).unwrap()
    }

    #[test]
    fn default_config_yields_sixteen_slots() {
        // 8 / 0.75 = 10.67 -> 16
        let s = sizing(8, 0.75);
        assert_eq!(s.capacity(), 16);
        assert_eq!(s.mask(), 15);
        assert_eq!(s.grow_threshold(), 12);
        assert_eq!(s.shrink_threshold(), 3);
    }

    #[test]
    fn zero_capacity_rounds_to_one_slot() {
        let s = sizing(0, 0.75);
        assert_eq!(s.capacity(), 1);
        assert!(s.needs_grow(0));
        assert!(!s.needs_shrink(0));
    }

    #[test]
    fn rejects_bad_load_factors() {
        for lf in [0.0, -0.5, 1.5, f32::NAN, f32::INFINITY] {
            let err = TableSizing::try_new(&CacheConfig::new(8, lf)).unwrap_err();
            assert!(err.message().contains("load factor"), "{lf}: {err}");
        }
    }

    #[test]
    fn rejects_oversized_capacity() {
        let err = TableSizing::try_new(&CacheConfig::new(usize::MAX, 0.5)).unwrap_err();
        assert!(err.message().contains("maximum table size"));
    }

    #[test]
    fn grow_and_shrink_stay_powers_of_two() {
        let s = sizing(8, 0.75);
        let g = s.grown();
        assert_eq!(g.capacity(), 32);
        assert_eq!(g.grow_threshold(), 24);
        assert_eq!(g.shrunk(), s);
    }

    #[test]
    fn shrink_never_below_minimum() {
        let s = sizing(4, 1.0);
        assert_eq!(s.capacity(), 4);
        assert!(!s.needs_shrink(0));
        assert_eq!(s.cleared(), s);
        let big = sizing(1000, 0.75);
        assert_eq!(big.cleared().capacity(), MINIMUM_CAPACITY);
    }

    #[test]
    fn index_masks_hash() {
        let s = sizing(8, 0.75);
        assert_eq!(s.index(0xFFFF_FFFF), 15);
        assert_eq!(s.index(16), 0);
    }
}
