//! Open-addressing cache for raw `u32` keys.
//!
//! ## Architecture
//!
//! ```text
//!   keys:      [ 0 | 17 | 33 | 0 | 4 | ... ]     0 marks an empty slot
//!   elements:  [ - |  a |  b | - | c | ... ]     same index as keys
//!   zero:      Option<E>                         the element of key 0
//! ```
//!
//! - Home slot = `mix(key) & mask`; collisions probe forward one slot at a
//!   time, wrapping at the end.
//! - Key `0` doubles as the empty marker, so its element lives outside the
//!   arrays.
//!
//! ## Backward-shift deletion
//!
//! Removing a key leaves a gap. Walking forward from the gap, any entry whose
//! home slot is not cyclically inside `(gap, position]` would become
//! unreachable, so it moves into the gap and the walk continues from its old
//! position. The walk stops at the next empty slot. No tombstones are used,
//! which keeps every surviving key reachable by plain linear probing.
//!
//! ## Performance Trade-offs
//! - No per-entry allocation and no key boxing.
//! - Probe sequences lengthen quickly as the load factor approaches 1.
//!
//! ## Example Usage
//! ```rust
//! use hitcache::store::open_addressing::IntOpenAddressingHashCache;
//! use hitcache::traits::Cache;
//!
//! let mut cache: IntOpenAddressingHashCache<&str> = IntOpenAddressingHashCache::new();
//! cache.add(0x0A00_0001, "10.0.0.1");
//! cache.add(0, "0.0.0.0");
//! assert_eq!(cache.get(&0x0A00_0001), Some("10.0.0.1"));
//! assert_eq!(cache.get(&0), Some("0.0.0.0"));
//! assert_eq!(cache.len(), 2);
//! ```

use std::iter;

use tracing::trace;

use crate::builder::CacheConfig;
use crate::ds::sizing::TableSizing;
use crate::error::{ConfigError, InvariantError};
use crate::hash::{DEFAULT_INIT_CAPACITY, mix};
use crate::traits::Cache;

const EMPTY: u32 = 0;

/// Closed-hashing cache keyed by `u32`.
#[derive(Debug, Clone)]
pub struct IntOpenAddressingHashCache<E> {
    keys: Vec<u32>,
    elements: Vec<Option<E>>,
    zero: Option<E>,
    len: usize,
    sizing: TableSizing,
}

fn empty_elements<E>(capacity: usize) -> Vec<Option<E>> {
    iter::repeat_with(|| None).take(capacity).collect()
}

impl<E> IntOpenAddressingHashCache<E> {
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INIT_CAPACITY)
    }

    /// Create a cache sized for `initial_capacity` keys at the default load factor.
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
        let sizing = TableSizing::try_new(&config)?;
        Ok(Self {
            keys: vec![EMPTY; sizing.capacity()],
            elements: empty_elements(sizing.capacity()),
            zero: None,
            len: 0,
            sizing,
        })
    }

    /// Number of slots in the key array.
    pub fn capacity(&self) -> usize {
        self.sizing.capacity()
    }

    pub fn load_factor(&self) -> f32 {
        self.sizing.load_factor()
    }

    pub fn contains_key(&self, key: u32) -> bool {
        self.get_ref(key).is_some()
    }

    /// Borrow the element cached for `key`.
    pub fn get_ref(&self, key: u32) -> Option<&E> {
        if key == EMPTY {
            return self.zero.as_ref();
        }
        self.find(key).and_then(|pos| self.elements[pos].as_ref())
    }

    /// Iterate over `(key, element)` pairs, key `0` first when present.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &E)> {
        let zero = self.zero.as_ref().map(|element| (EMPTY, element));
        let slots = self
            .keys
            .iter()
            .zip(&self.elements)
            .filter_map(|(&key, element)| element.as_ref().map(|e| (key, e)));
        zero.into_iter().chain(slots)
    }

    /// Verify that every key is reachable from its home slot and counts agree.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.keys.len() != self.capacity() || self.elements.len() != self.capacity() {
            return Err(InvariantError::new(format!(
                "array lengths {}/{} do not match capacity {}",
                self.keys.len(),
                self.elements.len(),
                self.capacity()
            )));
        }
        let mut occupied = 0;
        for (pos, &key) in self.keys.iter().enumerate() {
            if (key == EMPTY) != self.elements[pos].is_none() {
                return Err(InvariantError::new(format!(
                    "slot {pos} key/element occupancy mismatch"
                )));
            }
            if key == EMPTY {
                continue;
            }
            occupied += 1;
            if self.find(key) != Some(pos) {
                return Err(InvariantError::new(format!(
                    "key {key} in slot {pos} unreachable from home slot {}",
                    self.home(key)
                )));
            }
        }
        let expected = occupied + usize::from(self.zero.is_some());
        if expected != self.len {
            return Err(InvariantError::new(format!(
                "len {} but {expected} stored keys",
                self.len
            )));
        }
        Ok(())
    }

    #[inline]
    fn home(&self, key: u32) -> usize {
        self.sizing.index(mix(key))
    }

    #[inline]
    fn next(&self, pos: usize) -> usize {
        (pos + 1) & self.sizing.mask()
    }

    /// Slot holding `key`, which must be non-zero.
    fn find(&self, key: u32) -> Option<usize> {
        let mut pos = self.home(key);
        loop {
            match self.keys[pos] {
                EMPTY => return None,
                k if k == key => return Some(pos),
                _ => pos = self.next(pos),
            }
        }
    }

    /// Places a non-zero key known to be absent into the first free slot.
    fn place(
        keys: &mut [u32],
        elements: &mut [Option<E>],
        sizing: &TableSizing,
        key: u32,
        element: E,
    ) {
        let mut pos = sizing.index(mix(key));
        while keys[pos] != EMPTY {
            pos = (pos + 1) & sizing.mask();
        }
        keys[pos] = key;
        elements[pos] = Some(element);
    }

    fn insert_absent(&mut self, key: u32, element: E) {
        if key == EMPTY {
            self.zero = Some(element);
        } else {
            Self::place(&mut self.keys, &mut self.elements, &self.sizing, key, element);
        }
        self.len += 1;
        while self.sizing.needs_grow(self.len) {
            self.rehash(self.sizing.grown());
        }
    }

    /// Clears `pos` and shifts later entries of the same run back into the gap.
    fn shift_keys(&mut self, mut pos: usize) {
        loop {
            let last = pos;
            pos = self.next(pos);
            let key = loop {
                let key = self.keys[pos];
                if key == EMPTY {
                    self.keys[last] = EMPTY;
                    self.elements[last] = None;
                    return;
                }
                let slot = self.home(key);
                // Move `key` unless its home lies cyclically in (last, pos].
                let stays = if last <= pos {
                    last < slot && slot <= pos
                } else {
                    last < slot || slot <= pos
                };
                if !stays {
                    break key;
                }
                pos = self.next(pos);
            };
            self.keys[last] = key;
            self.elements[last] = self.elements[pos].take();
        }
    }

    fn after_remove(&mut self) {
        self.len -= 1;
        while self.sizing.needs_shrink(self.len) {
            self.rehash(self.sizing.shrunk());
        }
    }

    fn rehash(&mut self, sizing: TableSizing) {
        trace!(
            from = self.sizing.capacity(),
            to = sizing.capacity(),
            len = self.len,
            "rehashing open-addressing table"
        );
        let mut keys = vec![EMPTY; sizing.capacity()];
        let mut elements = empty_elements(sizing.capacity());
        let old_keys = std::mem::take(&mut self.keys);
        let old_elements = std::mem::take(&mut self.elements);
        for (key, element) in old_keys.into_iter().zip(old_elements) {
            if let Some(element) = element {
                Self::place(&mut keys, &mut elements, &sizing, key, element);
            }
        }
        self.keys = keys;
        self.elements = elements;
        self.sizing = sizing;
    }
}

impl<E> Default for IntOpenAddressingHashCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Cache<u32, E> for IntOpenAddressingHashCache<E> {
    fn get(&self, key: &u32) -> Option<E> {
        self.get_ref(*key).cloned()
    }

    fn add(&mut self, key: u32, element: E) -> E {
        if let Some(existing) = self.get_ref(key) {
            return existing.clone();
        }
        self.insert_absent(key, element.clone());
        element
    }

    fn remove(&mut self, key: &u32) -> Option<E> {
        let removed = if *key == EMPTY {
            self.zero.take()?
        } else {
            let pos = self.find(*key)?;
            let element = self.elements[pos].take();
            self.shift_keys(pos);
            element?
        };
        self.after_remove();
        Some(removed)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.zero = None;
        self.len = 0;
        let sizing = self.sizing.cleared();
        if sizing != self.sizing {
            self.sizing = sizing;
            self.keys = vec![EMPTY; sizing.capacity()];
            self.elements = empty_elements(sizing.capacity());
        } else {
            self.keys.fill(EMPTY);
            self.elements.iter_mut().for_each(|element| *element = None);
        }
    }

    fn try_get_or_add<F, X>(&mut self, key: u32, supplier: F) -> Result<E, X>
    where
        F: FnOnce(&u32) -> Result<E, X>,
    {
        if let Some(existing) = self.get_ref(key) {
            return Ok(existing.clone());
        }
        let element = supplier(&key)?;
        self.insert_absent(key, element.clone());
        Ok(element)
    }
}
