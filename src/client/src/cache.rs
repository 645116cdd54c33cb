use std::collections::HashMap;

/// Default number of responses kept per frontend
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Bounded map from request fingerprint to the last accepted response.
///
/// HashMap + doubly linked list over an arena of nodes. Inserting or
/// replacing an entry moves it to the most recent position; once full, the
/// least recently inserted entry is evicted and its node reused. Lookups do
/// not change the order.
pub struct ResponseCache<V> {
    /// Maps fingerprint to node index
    map: HashMap<String, usize>,
    nodes: Vec<CacheNode<V>>,
    /// Most recently inserted
    head: Option<usize>,
    /// Eviction candidate
    tail: Option<usize>,
    capacity: usize,
}

struct CacheNode<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<V> ResponseCache<V> {
    /// A cache holding at most `capacity` entries. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        ResponseCache {
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.map.get(key).map(|&idx| &self.nodes[idx].value)
    }

    /// Insert or replace the entry for `key` and mark it most recent - O(1)
    pub fn put(&mut self, key: impl Into<String>, value: V) {
        if self.capacity == 0 {
            return;
        }
        let key = key.into();

        if let Some(&idx) = self.map.get(&key) {
            self.nodes[idx].value = value;
            self.move_to_head(idx);
            return;
        }

        let idx = if self.nodes.len() < self.capacity {
            self.nodes.push(CacheNode {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.nodes.len() - 1
        } else {
            // Full: recycle the tail node
            let Some(idx) = self.tail else {
                return;
            };
            self.unlink(idx);
            let node = &mut self.nodes[idx];
            let evicted = std::mem::replace(&mut node.key, key.clone());
            node.value = value;
            self.map.remove(&evicted);
            idx
        };

        self.link_at_head(idx);
        self.map.insert(key, idx);
    }

    fn link_at_head(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;

        if let Some(old_head) = self.head {
            self.nodes[old_head].prev = Some(idx);
        }

        self.head = Some(idx);

        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_head(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.link_at_head(idx);
    }

    /// Unlink a node from the list (but don't remove from map)
    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;

        if let Some(prev_idx) = prev {
            self.nodes[prev_idx].next = next;
        } else {
            self.head = next;
        }

        if let Some(next_idx) = next {
            self.nodes[next_idx].prev = prev;
        } else {
            self.tail = prev;
        }

        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    /// All keys, most recent first
    #[cfg(test)]
    pub fn keys_in_order(&self) -> Vec<String> {
        let mut result = Vec::new();
        let mut current = self.head;

        while let Some(idx) = current {
            result.push(self.nodes[idx].key.clone());
            current = self.nodes[idx].next;
        }

        result
    }
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic() {
        let mut cache = ResponseCache::new(3);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys_in_order(), vec!["C", "B", "A"]);
        assert_eq!(cache.get("B"), Some(&2));
        // lookups do not reorder
        assert_eq!(cache.keys_in_order(), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let mut cache = ResponseCache::new(2);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);

        assert!(cache.get("A").is_none());
        assert_eq!(cache.keys_in_order(), vec!["C", "B"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_reinsert_moves_to_front() {
        let mut cache = ResponseCache::new(3);
        cache.put("A", 1);
        cache.put("B", 2);
        cache.put("C", 3);

        cache.put("A", 10);
        assert_eq!(cache.keys_in_order(), vec!["A", "C", "B"]);
        assert_eq!(cache.get("A"), Some(&10));

        // B is now the oldest
        cache.put("D", 4);
        assert!(cache.get("B").is_none());
        assert_eq!(cache.keys_in_order(), vec!["D", "A", "C"]);
    }

    #[test]
    fn test_cache_single_slot() {
        let mut cache = ResponseCache::new(1);
        cache.put("A", 1);
        cache.put("B", 2);
        assert_eq!(cache.keys_in_order(), vec!["B"]);
        assert_eq!(cache.get("A"), None);
    }

    #[test]
    fn test_cache_zero_capacity() {
        let mut cache = ResponseCache::new(0);
        cache.put("A", 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_node_reuse() {
        let mut cache = ResponseCache::new(DEFAULT_CACHE_CAPACITY);
        for i in 0..100 {
            cache.put(format!("key{}", i), i);
        }
        assert_eq!(cache.len(), DEFAULT_CACHE_CAPACITY);
        assert_eq!(cache.nodes.len(), DEFAULT_CACHE_CAPACITY);
        assert_eq!(cache.get("key99"), Some(&99));
        assert_eq!(cache.get("key67"), None);
    }
}
