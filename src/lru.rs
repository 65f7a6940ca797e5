use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Least-recently-used map over an arena of slots linked by index, so the
/// recency list needs no raw pointers. `get` and `insert` promote the entry
/// to the front; the tail is always the coldest entry.
///
/// The cache does not evict on its own: the owner checks `len()` against its
/// budget and calls `pop_tail`, which lets it persist the victim before the
/// memory copy is discarded.
#[derive(Debug)]
pub struct LruCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    map: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

#[derive(Debug)]
struct Slot<K, V> {
    entry: Option<(K, V)>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Looks up a key and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.slots[idx].entry.as_ref().map(|(_, v)| v)
    }

    /// Inserts at the front. An existing entry is replaced and promoted.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx].entry = Some((key, value));
            self.move_to_front(idx);
            return;
        }

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx].entry = Some((key.clone(), value));
                idx
            }
            None => {
                self.slots.push(Slot {
                    entry: Some((key.clone(), value)),
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.link_front(idx);
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.slots[idx].entry.take().map(|(_, v)| v)
    }

    /// The least-recently-used entry, without promoting it.
    pub fn tail(&self) -> Option<(&K, &V)> {
        let idx = self.tail?;
        self.slots[idx].entry.as_ref().map(|(k, v)| (k, v))
    }

    /// Removes and returns the least-recently-used entry.
    pub fn pop_tail(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.unlink(idx);
        self.free.push(idx);
        let (key, value) = self.slots[idx].entry.take()?;
        self.map.remove(&key);
        Some((key, value))
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            if let Some((k, _)) = &self.slots[idx].entry {
                keys.push(k.clone());
            }
            cursor = self.slots[idx].next;
        }
        keys
    }

    fn link_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;
        if let Some(old_head) = self.head {
            self.slots[old_head].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_front(idx);
    }
}

impl<K, V> Default for LruCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_read() {
        let mut cache = LruCache::new();
        cache.insert(1, "one");
        cache.insert(2, "two");

        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.get(&2), Some(&"two"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_tail_is_least_recently_used() {
        let mut cache = LruCache::new();
        cache.insert(1, "one");
        cache.insert(2, "two");
        cache.insert(3, "three");

        // touch 1 so 2 becomes the coldest
        cache.get(&1);
        assert_eq!(cache.tail(), Some((&2, &"two")));
        assert_eq!(cache.pop_tail(), Some((2, "two")));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_insert_promotes_existing_key() {
        let mut cache = LruCache::new();
        cache.insert(1, "one");
        cache.insert(2, "two");
        cache.insert(1, "uno");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.tail(), Some((&2, &"two")));
        assert_eq!(cache.get(&1), Some(&"uno"));
    }

    #[test]
    fn test_remove_and_slot_reuse() {
        let mut cache = LruCache::new();
        cache.insert(1, "one");
        cache.insert(2, "two");
        assert_eq!(cache.remove(&1), Some("one"));
        assert_eq!(cache.remove(&1), None);

        // freed slot is reused, order stays consistent
        cache.insert(3, "three");
        assert_eq!(cache.keys(), vec![3, 2]);
    }

    #[test]
    fn test_recency_order() {
        let mut cache = LruCache::new();
        for i in 0..5 {
            cache.insert(i, i);
        }
        cache.get(&0);
        assert_eq!(cache.keys(), vec![0, 4, 3, 2, 1]);

        let mut drained = Vec::new();
        while let Some((k, _)) = cache.pop_tail() {
            drained.push(k);
        }
        assert_eq!(drained, vec![1, 2, 3, 4, 0]);
        assert!(cache.is_empty());
    }
}
