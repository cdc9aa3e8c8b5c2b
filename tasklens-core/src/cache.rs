use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::mem::size_of;
use std::time::{Duration, Instant};

/// Approximate heap footprint used for the byte budget.
pub trait CacheWeight {
    fn weight(&self) -> usize;
}

impl<T> CacheWeight for Vec<T> {
    fn weight(&self) -> usize {
        size_of::<Vec<T>>() + self.capacity() * size_of::<T>()
    }
}

impl CacheWeight for String {
    fn weight(&self) -> usize {
        size_of::<String>() + self.capacity()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub bytes: usize,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted: Instant,
    ttl: Duration,
    size: usize,
    hits: u64,
    last_access: u64, // logical clock, higher = more recent
}

impl<V> CacheEntry<V> {
    fn expired(&self) -> bool {
        self.inserted.elapsed() >= self.ttl
    }
}

/// Keyed cache with lazy TTL expiry and least-recently-used eviction once the
/// tracked size passes `max_bytes`. Not synchronized; wrap in a lock to share.
pub struct CacheManager<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    max_bytes: usize,
    bytes: usize,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<K, V> CacheManager<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + CacheWeight,
{
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_bytes,
            bytes: 0,
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.clock += 1;
        match self.entries.get(key).map(|e| e.expired()) {
            None => {}
            Some(true) => {
                self.remove(key);
                self.expirations += 1;
            }
            Some(false) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.hits += 1;
                    entry.last_access = self.clock;
                    self.hits += 1;
                    return Some(entry.value.clone());
                }
            }
        }
        self.misses += 1;
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|e| !e.expired())
    }

    /// Stores `value`; returns false when it alone exceeds the whole budget.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) -> bool {
        self.clock += 1;
        self.remove(&key);
        let size = value.weight();
        if size > self.max_bytes {
            tracing::debug!(size, budget = self.max_bytes, "cache value larger than budget, not stored");
            return false;
        }
        self.bytes += size;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted: Instant::now(),
                ttl,
                size,
                hits: 0,
                last_access: self.clock,
            },
        );
        self.evict_to_budget();
        true
    }

    /// Drops every entry whose key satisfies `pred`; returns how many went.
    pub fn invalidate<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let doomed: Vec<K> = self.entries.keys().filter(|k| pred(k)).cloned().collect();
        for k in &doomed {
            self.remove(k);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }

    pub fn entry_hits(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|e| e.hits)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            bytes: self.bytes,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.bytes -= entry.size;
        Some(entry)
    }

    fn evict_to_budget(&mut self) {
        while self.bytes > self.max_bytes {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    self.remove(&k);
                    self.evictions += 1;
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(3600);

    fn blob(n: usize) -> Vec<u8> {
        let mut v = Vec::with_capacity(n);
        v.resize(n, 0);
        v
    }

    #[test]
    fn hit_and_miss_accounting() {
        let mut c: CacheManager<&str, Vec<u8>> = CacheManager::new(1 << 20);
        assert!(c.get(&"a").is_none());
        c.set("a", blob(10), LONG);
        assert_eq!(c.get(&"a").map(|v| v.len()), Some(10));
        c.get(&"a");
        let s = c.stats();
        assert_eq!((s.hits, s.misses), (2, 1));
        assert_eq!(c.entry_hits(&"a"), Some(2));
    }

    #[test]
    fn ttl_expiry_is_lazy() {
        let mut c: CacheManager<u32, Vec<u8>> = CacheManager::new(1 << 20);
        c.set(1, blob(4), Duration::from_millis(20));
        assert!(c.contains(&1));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(c.len(), 1); // still physically present
        assert!(c.get(&1).is_none());
        assert_eq!(c.len(), 0);
        assert_eq!(c.stats().expirations, 1);
    }

    #[test]
    fn zero_ttl_never_hits() {
        let mut c: CacheManager<u32, Vec<u8>> = CacheManager::new(1 << 20);
        c.set(1, blob(4), Duration::ZERO);
        assert!(c.get(&1).is_none());
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let one = blob(100).weight();
        let mut c: CacheManager<u32, Vec<u8>> = CacheManager::new(one * 2);
        c.set(1, blob(100), LONG);
        c.set(2, blob(100), LONG);
        c.get(&1); // 2 is now the coldest
        c.set(3, blob(100), LONG);
        assert!(c.contains(&1));
        assert!(!c.contains(&2));
        assert!(c.contains(&3));
        assert_eq!(c.stats().evictions, 1);
        assert!(c.stats().bytes <= c.max_bytes());
    }

    #[test]
    fn oversized_value_is_rejected_and_replaces_stale() {
        let mut c: CacheManager<u32, Vec<u8>> = CacheManager::new(64);
        c.set(1, blob(8), LONG);
        assert!(!c.set(1, blob(1000), LONG));
        assert!(c.get(&1).is_none());
        assert_eq!(c.stats().bytes, 0);
    }

    #[test]
    fn invalidate_by_predicate() {
        let mut c: CacheManager<(u64, u64), Vec<u8>> = CacheManager::new(1 << 20);
        c.set((1, 1), blob(1), LONG);
        c.set((1, 2), blob(1), LONG);
        c.set((2, 1), blob(1), LONG);
        assert_eq!(c.invalidate(|(version, _)| *version == 1), 2);
        assert_eq!(c.len(), 1);
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.stats().bytes, 0);
    }

    #[test]
    fn replacing_a_key_tracks_bytes() {
        let mut c: CacheManager<u32, Vec<u8>> = CacheManager::new(1 << 20);
        c.set(1, blob(10), LONG);
        c.set(1, blob(20), LONG);
        assert_eq!(c.len(), 1);
        assert_eq!(c.stats().bytes, blob(20).weight());
    }
}
