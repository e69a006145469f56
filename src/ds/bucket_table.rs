//! Chained-bucket hash table shared by the bucket, weak and memoizing caches.
//!
//! ## Architecture
//!
//! ```text
//!   buckets (capacity = 2^n)
//!   ┌───┐
//!   │ 0 │──► [key, hash, value] ──► [key, hash, value] ──► ∅
//!   ├───┤
//!   │ 1 │──► ∅
//!   ├───┤
//!   │ 2 │──► [key, hash, value] ──► ∅
//!   └───┘
//!   index = mixed hash & mask; new entries become the bucket head
//! ```
//!
//! The table knows nothing about key equality. Callers pass the mixed hash
//! and a predicate; the stored hash is compared first so the predicate only
//! runs on probable matches. Resizing relinks the existing nodes into a fresh
//! bucket array (full scan, O(n)) without reallocating entries.

use std::iter;

use tracing::trace;

use crate::ds::sizing::TableSizing;
use crate::error::InvariantError;
use crate::hash::{HashStrategy, hash};

type Link<K, V> = Option<Box<Node<K, V>>>;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    hash: u32,
    value: V,
    next: Link<K, V>,
}

#[derive(Debug)]
pub(crate) struct BucketTable<K, V> {
    buckets: Vec<Link<K, V>>,
    len: usize,
    sizing: TableSizing,
}

fn empty_buckets<K, V>(capacity: usize) -> Vec<Link<K, V>> {
    iter::repeat_with(|| None).take(capacity).collect()
}

impl<K, V> BucketTable<K, V> {
    pub(crate) fn new(sizing: TableSizing) -> Self {
        Self {
            buckets: empty_buckets(sizing.capacity()),
            len: 0,
            sizing,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.sizing.capacity()
    }

    #[inline]
    pub(crate) fn sizing(&self) -> &TableSizing {
        &self.sizing
    }

    /// Finds the entry with `hash` accepted by `matches`.
    pub(crate) fn find<F>(&self, hash: u32, mut matches: F) -> Option<(&K, &V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut link = self.buckets[self.sizing.index(hash)].as_deref();
        while let Some(node) = link {
            if node.hash == hash && matches(&node.key, &node.value) {
                return Some((&node.key, &node.value));
            }
            link = node.next.as_deref();
        }
        None
    }

    /// Inserts a new entry as the head of its bucket, growing if needed.
    ///
    /// The caller guarantees no entry for `key` is present.
    pub(crate) fn push_front(&mut self, key: K, hash: u32, value: V) {
        let index = self.sizing.index(hash);
        let next = self.buckets[index].take();
        self.buckets[index] = Some(Box::new(Node {
            key,
            hash,
            value,
            next,
        }));
        self.len += 1;
        if self.sizing.needs_grow(self.len) {
            self.rehash(self.sizing.grown());
        }
    }

    /// Unlinks the first entry with `hash` accepted by `matches`, shrinking if needed.
    pub(crate) fn unlink<F>(&mut self, hash: u32, mut matches: F) -> Option<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let index = self.sizing.index(hash);
        let mut cursor = &mut self.buckets[index];
        while cursor
            .as_ref()
            .is_some_and(|node| !(node.hash == hash && matches(&node.key, &node.value)))
        {
            cursor = &mut cursor.as_mut()?.next;
        }
        let mut node = cursor.take()?;
        *cursor = node.next.take();

        self.len -= 1;
        if self.sizing.needs_shrink(self.len) {
            self.rehash(self.sizing.shrunk());
        }
        let Node { key, value, .. } = *node;
        Some((key, value))
    }

    /// Drops every entry and shrinks back to the minimum capacity.
    pub(crate) fn clear(&mut self) {
        for head in &mut self.buckets {
            let mut link = head.take();
            // Unlink iteratively so long chains never recurse in `Drop`.
            while let Some(mut node) = link {
                link = node.next.take();
            }
        }
        self.len = 0;
        let sizing = self.sizing.cleared();
        if sizing != self.sizing {
            self.sizing = sizing;
            self.buckets = empty_buckets(sizing.capacity());
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets.iter().flat_map(|head| {
            iter::successors(head.as_deref(), |node| node.next.as_deref())
                .map(|node| (&node.key, &node.value))
        })
    }

    /// Verifies bucket placement, stored hashes, key uniqueness and the length.
    pub(crate) fn check_invariants<S>(&self, strategy: &S) -> Result<(), InvariantError>
    where
        S: HashStrategy<K>,
    {
        if !self.buckets.len().is_power_of_two() || self.buckets.len() != self.capacity() {
            return Err(InvariantError::new(format!(
                "bucket array length {} does not match capacity {}",
                self.buckets.len(),
                self.capacity()
            )));
        }
        let mut count = 0;
        for (index, head) in self.buckets.iter().enumerate() {
            let chain: Vec<&Node<K, V>> =
                iter::successors(head.as_deref(), |node| node.next.as_deref()).collect();
            for (position, node) in chain.iter().enumerate() {
                if hash(strategy, &node.key) != node.hash {
                    return Err(InvariantError::new(format!(
                        "stale hash in bucket {index} at position {position}"
                    )));
                }
                if self.sizing.index(node.hash) != index {
                    return Err(InvariantError::new(format!(
                        "entry with hash {:#x} stored in bucket {index}",
                        node.hash
                    )));
                }
                if chain[..position]
                    .iter()
                    .any(|other| strategy.equals(&other.key, &node.key))
                {
                    return Err(InvariantError::new(format!(
                        "duplicate key in bucket {index}"
                    )));
                }
            }
            count += chain.len();
        }
        if count != self.len {
            return Err(InvariantError::new(format!(
                "len {} but {count} linked entries",
                self.len
            )));
        }
        Ok(())
    }

    fn rehash(&mut self, sizing: TableSizing) {
        trace!(
            from = self.sizing.capacity(),
            to = sizing.capacity(),
            len = self.len,
            "rehashing bucket table"
        );
        let mut buckets = empty_buckets(sizing.capacity());
        for mut link in std::mem::take(&mut self.buckets) {
            while let Some(mut node) = link {
                link = node.next.take();
                let index = sizing.index(node.hash);
                node.next = buckets[index].take();
                buckets[index] = Some(node);
            }
        }
        self.buckets = buckets;
        self.sizing = sizing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CacheConfig;
    use crate::hash::DefaultStrategy;

    fn table(initial_capacity: usize) -> BucketTable<u32, &'static str> {
        let sizing = TableSizing::try_new(&CacheConfig::new(initial_capacity, 0.75)).unwrap();
        BucketTable::new(sizing)
    }

    fn insert(t: &mut BucketTable<u32, &'static str>, key: u32, value: &'static str) {
        t.push_front(key, hash(&DefaultStrategy, &key), value);
    }

    fn lookup(t: &BucketTable<u32, &'static str>, key: u32) -> Option<&'static str> {
        t.find(hash(&DefaultStrategy, &key), |k, _| *k == key)
            .map(|(_, v)| *v)
    }

    #[test]
    fn find_after_push_front() {
        let mut t = table(8);
        insert(&mut t, 1, "a");
        insert(&mut t, 2, "b");
        assert_eq!(lookup(&t, 1), Some("a"));
        assert_eq!(lookup(&t, 2), Some("b"));
        assert_eq!(lookup(&t, 3), None);
        assert_eq!(t.len(), 2);
        t.check_invariants(&DefaultStrategy).unwrap();
    }

    #[test]
    fn grows_past_threshold_and_keeps_entries() {
        let mut t = table(8);
        assert_eq!(t.capacity(), 16);
        for key in 0..12 {
            insert(&mut t, key, "v");
        }
        assert_eq!(t.capacity(), 32);
        for key in 0..12 {
            assert_eq!(lookup(&t, key), Some("v"), "key {key} lost in rehash");
        }
        t.check_invariants(&DefaultStrategy).unwrap();
    }

    #[test]
    fn unlink_middle_of_chain() {
        // Equal hashes force every entry into one chain.
        let mut t = table(0);
        t.push_front(1, 0, "a");
        t.push_front(2, 0, "b");
        t.push_front(3, 0, "c");
        assert_eq!(t.unlink(0, |k, _| *k == 2), Some((2, "b")));
        assert_eq!(t.find(0, |k, _| *k == 1).map(|(_, v)| *v), Some("a"));
        assert_eq!(t.find(0, |k, _| *k == 3).map(|(_, v)| *v), Some("c"));
        assert_eq!(t.unlink(0, |k, _| *k == 2), None);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn shrinks_on_removal_but_not_below_minimum() {
        let mut t = table(8);
        for key in 0..100 {
            insert(&mut t, key, "v");
        }
        assert!(t.capacity() >= 128);
        for key in 0..100 {
            assert!(t.unlink(hash(&DefaultStrategy, &key), |k, _| *k == key).is_some());
            t.check_invariants(&DefaultStrategy).unwrap();
        }
        assert_eq!(t.len(), 0);
        assert_eq!(t.capacity(), 8);
    }

    #[test]
    fn clear_resets_to_minimum_capacity() {
        let mut t = table(64);
        for key in 0..50 {
            insert(&mut t, key, "v");
        }
        t.clear();
        assert_eq!(t.len(), 0);
        assert_eq!(t.capacity(), 8);
        assert_eq!(lookup(&t, 1), None);
        insert(&mut t, 1, "again");
        assert_eq!(lookup(&t, 1), Some("again"));
    }
}
