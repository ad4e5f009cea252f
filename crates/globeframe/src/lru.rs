//! A capacity-bounded least-recently-used cache.
//!
//! Entries carry a caller-supplied cost. When an insertion would exceed the
//! capacity, the least-recently-used entries are evicted until the used
//! capacity falls to the low-water mark and the new entry fits.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use web_time::Instant;

use crate::error::{Error, Result};

struct Entry<V> {
    value: V,
    cost: usize,
    last_access: u64,
    last_touched: Instant,
}

/// LRU cache keyed by `K` with per-entry costs.
pub struct LruCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Access log, oldest first. Stale records are skipped lazily.
    access_order: VecDeque<(u64, K)>,
    capacity: usize,
    low_water: usize,
    used_capacity: usize,
    timestamp: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache with the low-water mark at 75% of capacity.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self::build(capacity, capacity * 3 / 4)
    }

    /// Create a cache with an explicit low-water mark.
    pub fn with_low_water(capacity: usize, low_water: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid("LruCache", "capacity must be at least 1"));
        }
        if low_water >= capacity {
            return Err(Error::invalid(
                "LruCache",
                format!("low water {low_water} must be less than capacity {capacity}"),
            ));
        }
        Ok(Self::build(capacity, low_water))
    }

    fn build(capacity: usize, low_water: usize) -> Self {
        Self {
            entries: HashMap::new(),
            access_order: VecDeque::new(),
            capacity,
            low_water,
            used_capacity: 0,
            timestamp: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn low_water(&self) -> usize {
        self.low_water
    }

    #[must_use]
    pub fn used_capacity(&self) -> usize {
        self.used_capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up an entry and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let timestamp = self.next_timestamp();
        let entry = self.entries.get_mut(key)?;
        entry.last_access = timestamp;
        entry.last_touched = Instant::now();
        self.access_order.push_back((timestamp, key.clone()));
        self.compact_access_order();
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Look up an entry without affecting its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert an entry, returning every value displaced by the insertion.
    ///
    /// The list holds a replaced value for the same key, the evicted
    /// least-recently-used entries, or the new value itself when its cost
    /// exceeds the whole capacity.
    pub fn put(&mut self, key: K, value: V, cost: usize) -> Vec<(K, V)> {
        let mut displaced = Vec::new();
        if cost > self.capacity {
            displaced.push((key, value));
            return displaced;
        }
        if let Some(old) = self.remove_entry(&key) {
            displaced.push((key.clone(), old));
        }
        if self.used_capacity + cost > self.capacity {
            self.make_space(cost, &mut displaced);
        }

        let timestamp = self.next_timestamp();
        self.used_capacity += cost;
        self.access_order.push_back((timestamp, key.clone()));
        self.entries.insert(
            key,
            Entry {
                value,
                cost,
                last_access: timestamp,
                last_touched: Instant::now(),
            },
        );
        self.compact_access_order();
        displaced
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.remove_entry(key);
        self.compact_access_order();
        value
    }

    fn remove_entry(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.used_capacity -= entry.cost;
        Some(entry.value)
    }

    /// Remove entries that have not been accessed within `max_age`.
    pub fn trim_to_age(&mut self, max_age: Duration) -> Vec<(K, V)> {
        let now = Instant::now();
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_touched) > max_age)
            .map(|(key, _)| key.clone())
            .collect();
        let mut trimmed = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(value) = self.remove_entry(&key) {
                trimmed.push((key, value));
            }
        }
        self.compact_access_order();
        trimmed
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
        self.used_capacity = 0;
        // The timestamp stays monotonic.
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.access_order.clear();
        self.used_capacity = 0;
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }

    fn make_space(&mut self, required: usize, displaced: &mut Vec<(K, V)>) {
        while self.used_capacity > self.low_water || self.capacity - self.used_capacity < required {
            let Some((timestamp, key)) = self.access_order.pop_front() else {
                break;
            };
            let current = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.last_access == timestamp);
            if current {
                if let Some(value) = self.remove_entry(&key) {
                    displaced.push((key, value));
                }
            }
        }
    }

    /// Drop stale access records once they outnumber live entries.
    fn compact_access_order(&mut self) {
        if self.access_order.len() <= 2 * self.entries.len() + 64 {
            return;
        }
        let entries = &self.entries;
        self.access_order.retain(|(timestamp, key)| {
            entries
                .get(key)
                .is_some_and(|entry| entry.last_access == *timestamp)
        });
    }

    fn next_timestamp(&mut self) -> u64 {
        self.timestamp += 1;
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_put_and_get() {
        let mut cache = LruCache::new(10);
        assert!(cache.is_empty());

        assert!(cache.put("a", 1, 3).is_empty());
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.used_capacity(), 3);

        // Replacing a key hands back the old value.
        let displaced = cache.put("a", 2, 4);
        assert_eq!(displaced, vec![("a", 1)]);
        assert_eq!(cache.used_capacity(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used_to_low_water() {
        let mut cache = LruCache::with_low_water(4, 2).unwrap();
        cache.put("a", 1, 1);
        cache.put("b", 2, 1);
        cache.put("c", 3, 1);
        cache.put("d", 4, 1);

        // Touch "a" so "b" becomes the oldest.
        cache.get(&"a");

        let evicted = cache.put("e", 5, 1);
        let keys: Vec<_> = evicted.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert!(cache.contains_key(&"a"));
        assert!(cache.contains_key(&"e"));
        assert_eq!(cache.used_capacity(), 3);
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let mut cache = LruCache::new(4);
        cache.put("small", 1, 2);
        let displaced = cache.put("huge", 2, 5);
        assert_eq!(displaced, vec![("huge", 2)]);
        assert!(cache.contains_key(&"small"));
        assert_eq!(cache.used_capacity(), 2);
    }

    #[test]
    fn test_clear_and_remove() {
        let mut cache = LruCache::new(8);
        cache.put(1, "x", 2);
        cache.put(2, "y", 2);
        assert_eq!(cache.remove(&1), Some("x"));
        assert_eq!(cache.used_capacity(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.used_capacity(), 0);
    }

    #[test]
    fn test_trim_to_age() {
        let mut cache = LruCache::new(8);
        cache.put(1, "x", 1);
        std::thread::sleep(Duration::from_millis(20));
        cache.put(2, "y", 1);
        let trimmed = cache.trim_to_age(Duration::from_millis(10));
        assert_eq!(trimmed, vec![(1, "x")]);
        assert!(cache.contains_key(&2));
    }

    #[test]
    fn test_access_log_stays_bounded() {
        let mut cache = LruCache::new(1024);
        for key in 0..10_000u32 {
            cache.put(key, (), 1);
            cache.remove(&key);
        }
        assert!(cache.is_empty());
        assert!(cache.access_order.len() <= 64);

        for key in 0..10_000u32 {
            cache.put(key % 8, (), 1);
        }
        cache.trim_to_age(Duration::ZERO);
        assert!(cache.access_order.len() <= 2 * cache.len() + 64);
    }

    #[test]
    fn test_invalid_low_water() {
        assert!(LruCache::<u8, u8>::with_low_water(4, 4).is_err());
        assert!(LruCache::<u8, u8>::with_low_water(0, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(
            ops in prop::collection::vec((0u8..16, 1usize..6, any::<bool>()), 1..200)
        ) {
            let mut cache = LruCache::new(20);
            for (key, cost, read) in ops {
                if read {
                    cache.get(&key);
                } else {
                    cache.put(key, (), cost);
                }
                prop_assert!(cache.used_capacity() <= cache.capacity());
                let sum: usize = cache.entries.values().map(|e| e.cost).sum();
                prop_assert_eq!(sum, cache.used_capacity());
            }
        }
    }
}
