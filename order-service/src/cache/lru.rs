//! Fixed-capacity LRU map
//!
//! Intrusive doubly linked list stored in a slot vector plus a key → slot
//! index map. Insert, lookup-with-promotion and eviction are O(1).
//!
//! ```text
//!  head (MRU)                                   tail (LRU)
//!     │                                             │
//!     ▼                                             ▼
//!  [slot 2] ⇄ [slot 0] ⇄ [slot 3] ⇄ ... ⇄ [slot 1]
//! ```
//!
//! Slots are never freed: once the cache is full, the LRU slot is recycled in
//! place for the incoming key, so the slot vector never grows past `capacity`.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Least-recently-used cache (single owner, not synchronised)
pub struct LruCache<K, V> {
    capacity: NonZeroUsize,
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity.get()),
            nodes: Vec::with_capacity(capacity.get()),
            head: None,
            tail: None,
        }
    }

    /// Insert or replace `key`, marking it most recently used.
    ///
    /// Returns the evicted least-recently-used entry when the insert would
    /// otherwise exceed capacity. Replacing an existing key never evicts.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.nodes[idx].value = value;
            self.promote(idx);
            return None;
        }

        if self.nodes.len() < self.capacity.get() {
            let idx = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.attach_front(idx);
            self.map.insert(key, idx);
            return None;
        }

        // Full: recycle the LRU slot for the new entry
        let idx = self.tail?;
        self.detach(idx);
        let node = &mut self.nodes[idx];
        let old_key = std::mem::replace(&mut node.key, key.clone());
        let old_value = std::mem::replace(&mut node.value, value);
        self.map.remove(&old_key);
        self.map.insert(key, idx);
        self.attach_front(idx);
        Some((old_key, old_value))
    }

    /// Look up `key`, promoting it to most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        Some(&self.nodes[idx].value)
    }

    /// Look up `key` without touching recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|&idx| &self.nodes[idx].value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            nodes: &self.nodes,
            cursor: self.head,
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn attach_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;
        match self.head {
            Some(h) => self.nodes[h].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }
}

/// Iterator over keys, MRU first
pub struct Keys<'a, K, V> {
    nodes: &'a [Node<K, V>],
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.nodes[self.cursor?];
        self.cursor = node.next;
        Some(&node.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn cache(capacity: usize) -> LruCache<&'static str, u32> {
        LruCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_get_missing() {
        let mut c = cache(2);
        assert!(c.get("A").is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn test_eviction_ordering_scenario() {
        let mut c = cache(2);
        assert!(c.put("A", 1).is_none());
        assert!(c.put("B", 2).is_none());
        assert_eq!(c.put("C", 3), Some(("A", 1)));
        assert!(!c.contains("A"));

        // B freshly touched, so C is now the LRU entry
        assert_eq!(c.get("B"), Some(&2));
        assert_eq!(c.put("D", 4), Some(("C", 3)));

        assert_eq!(c.keys().copied().collect::<Vec<_>>(), vec!["D", "B"]);
    }

    #[test]
    fn test_reinsert_replaces_in_place() {
        let mut c = cache(2);
        c.put("A", 1);
        c.put("B", 2);

        // Cache is full, but re-inserting an existing key must not evict
        assert!(c.put("A", 10).is_none());
        assert_eq!(c.len(), 2);
        assert_eq!(c.peek("A"), Some(&10));
        assert_eq!(c.keys().copied().collect::<Vec<_>>(), vec!["A", "B"]);

        // A was promoted by the re-insert, B goes first
        assert_eq!(c.put("C", 3), Some(("B", 2)));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut c = cache(2);
        c.put("A", 1);
        c.put("B", 2);
        assert_eq!(c.peek("A"), Some(&1));
        assert_eq!(c.put("C", 3), Some(("A", 1)));
    }

    #[test]
    fn test_capacity_one() {
        let mut c = cache(1);
        assert!(c.put("A", 1).is_none());
        assert_eq!(c.put("B", 2), Some(("A", 1)));
        assert_eq!(c.get("B"), Some(&2));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_string_keys_lookup_by_str() {
        let mut c: LruCache<String, u32> = LruCache::new(NonZeroUsize::new(4).unwrap());
        c.put("order-1".to_string(), 1);
        assert_eq!(c.get("order-1"), Some(&1));
        assert!(c.contains("order-1"));
    }

    /// Naive reference model: a Vec ordered MRU → LRU
    struct Model {
        capacity: usize,
        entries: Vec<(u8, u32)>,
    }

    impl Model {
        fn put(&mut self, key: u8, value: u32) -> Option<(u8, u32)> {
            if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
                self.entries.remove(pos);
                self.entries.insert(0, (key, value));
                return None;
            }
            self.entries.insert(0, (key, value));
            if self.entries.len() > self.capacity {
                self.entries.pop()
            } else {
                None
            }
        }

        fn get(&mut self, key: u8) -> Option<u32> {
            let pos = self.entries.iter().position(|(k, _)| *k == key)?;
            let entry = self.entries.remove(pos);
            self.entries.insert(0, entry);
            Some(entry.1)
        }
    }

    #[test]
    fn test_matches_reference_model() {
        for capacity in 1..=6 {
            let mut rng = StdRng::seed_from_u64(capacity as u64);
            let mut lru: LruCache<u8, u32> = LruCache::new(NonZeroUsize::new(capacity).unwrap());
            let mut model = Model {
                capacity,
                entries: Vec::new(),
            };

            for step in 0..2_000u32 {
                let key = rng.gen_range(0..12u8);
                if rng.gen_bool(0.5) {
                    assert_eq!(lru.put(key, step), model.put(key, step), "put {key}");
                } else {
                    assert_eq!(lru.get(&key).copied(), model.get(key), "get {key}");
                }

                assert!(lru.len() <= capacity);
                let order: Vec<u8> = lru.keys().copied().collect();
                let expected: Vec<u8> = model.entries.iter().map(|(k, _)| *k).collect();
                assert_eq!(order, expected);
            }
        }
    }
}
