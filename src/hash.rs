//! Hash strategies and the bit-mixing step shared by every table.
//!
//! Caches never use a key's hash directly. A [`HashStrategy`] supplies the
//! equality and 32-bit hash code, and [`mix`] spreads that code before it is
//! masked into a power-of-two table index. Mixing matters for keys with
//! low-entropy hash codes such as small integers or IPv4 addresses that share
//! a prefix.
//!
//! ## Key Components
//!
//! - [`HashStrategy`]: pluggable `equals` + `hash_code` pair.
//! - [`DefaultStrategy`]: delegates to the key's own `Eq` and `Hash`.
//! - [`IdentityStrategy`]: primitive integer keys hash to themselves.
//! - [`IntArrayStrategy`]: element-wise equality and polynomial hash over
//!   `u32` words (raw IPv6 addresses, composite integer keys).
//!
//! ## Example Usage
//!
//! ```
//! use hitcache::hash::{mix, next_power_of_two, HashStrategy, IntArrayStrategy};
//!
//! let strategy = IntArrayStrategy;
//! assert!(strategy.equals(&[1u32, 2, 3], &[1, 2, 3]));
//! assert_eq!(
//!     strategy.hash_code(&[1u32, 2, 3]),
//!     strategy.hash_code(&vec![1u32, 2, 3])
//! );
//!
//! assert_ne!(mix(1) & 7, mix(2) & 7);
//! assert_eq!(next_power_of_two(9), 16);
//! ```

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Default load factor for every cache.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Load factor trading memory for shorter chains and probe sequences.
pub const FAST_LOAD_FACTOR: f32 = 0.5;

/// Load factor for hot lookup paths that tolerate a sparse table.
pub const VERY_FAST_LOAD_FACTOR: f32 = 0.25;

/// Default number of elements a new cache is sized for.
pub const DEFAULT_INIT_CAPACITY: usize = 8;

/// Tables never shrink below this many slots.
pub const MINIMUM_CAPACITY: usize = 8;

/// 32-bit golden ratio.
const PHI: u32 = 0x9E37_79B9;

/// Spreads a hash code so its high bits influence the low, masked bits.
#[inline]
pub fn mix(x: u32) -> u32 {
    let h = x.wrapping_mul(PHI);
    h ^ (h >> 16)
}

/// Mixed hash of `key` under `strategy`.
#[inline]
pub fn hash<K: ?Sized, S: HashStrategy<K>>(strategy: &S, key: &K) -> u32 {
    mix(strategy.hash_code(key))
}

/// Smallest power of two `>= x`; `0` maps to `1`.
///
/// Returns `None` when the result does not fit in `usize`.
#[inline]
pub fn checked_next_power_of_two(x: usize) -> Option<usize> {
    x.max(1).checked_next_power_of_two()
}

/// Smallest power of two `>= x`; `0` maps to `1`.
///
/// # Panics
///
/// Panics if the result does not fit in `usize`.
#[inline]
pub fn next_power_of_two(x: usize) -> usize {
    x.max(1).next_power_of_two()
}

/// Equality and hash function pair used in place of a key's own identity.
///
/// Implementations must be consistent: `equals(a, b)` implies
/// `hash_code(a) == hash_code(b)`.
pub trait HashStrategy<K: ?Sized> {
    /// Returns `true` if `a` and `b` denote the same key.
    fn equals(&self, a: &K, b: &K) -> bool;

    /// Returns the raw (unmixed) hash code of `key`.
    fn hash_code(&self, key: &K) -> u32;
}

/// Strategy that defers to the key's `Eq` and `Hash` implementations.
///
/// Hash codes come from [`FxHasher`], folded to 32 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DefaultStrategy;

impl<K> HashStrategy<K> for DefaultStrategy
where
    K: Eq + Hash + ?Sized,
{
    #[inline]
    fn equals(&self, a: &K, b: &K) -> bool {
        a == b
    }

    #[inline]
    fn hash_code(&self, key: &K) -> u32 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let h = hasher.finish();
        (h ^ (h >> 32)) as u32
    }
}

/// Strategy for primitive integer keys: the key is its own hash code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdentityStrategy;

impl HashStrategy<u32> for IdentityStrategy {
    #[inline]
    fn equals(&self, a: &u32, b: &u32) -> bool {
        a == b
    }

    #[inline]
    fn hash_code(&self, key: &u32) -> u32 {
        *key
    }
}

impl HashStrategy<i32> for IdentityStrategy {
    #[inline]
    fn equals(&self, a: &i32, b: &i32) -> bool {
        a == b
    }

    #[inline]
    fn hash_code(&self, key: &i32) -> u32 {
        *key as u32
    }
}

impl HashStrategy<u64> for IdentityStrategy {
    #[inline]
    fn equals(&self, a: &u64, b: &u64) -> bool {
        a == b
    }

    #[inline]
    fn hash_code(&self, key: &u64) -> u32 {
        (*key ^ (*key >> 32)) as u32
    }
}

/// Strategy for keys that are raw `u32` word arrays.
///
/// Works for any `AsRef<[u32]>` key (`[u32; N]`, `Vec<u32>`, `Box<[u32]>`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntArrayStrategy;

impl<A> HashStrategy<A> for IntArrayStrategy
where
    A: AsRef<[u32]> + ?Sized,
{
    #[inline]
    fn equals(&self, a: &A, b: &A) -> bool {
        a.as_ref() == b.as_ref()
    }

    fn hash_code(&self, key: &A) -> u32 {
        key.as_ref()
            .iter()
            .rev()
            .fold(17u32, |h, &word| h.wrapping_mul(31).wrapping_add(word))
    }
}
