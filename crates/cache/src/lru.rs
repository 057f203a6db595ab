//! Memory-aware LRU cache
//!
//! Caches preloaded media handles keyed by URL. Two budgets apply at once:
//! a maximum entry count and a maximum estimated memory footprint. When an
//! insert would exceed either budget, least recently used entries are evicted
//! synchronously before the insert completes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::pressure::MemoryPressure;

/// A value that can be stored in [`MemoryAwareLruCache`]
pub trait CacheValue: Clone + Send + 'static {
    /// Estimated memory footprint in bytes (see [`crate::estimate`])
    fn estimated_bytes(&self) -> usize;

    /// Release external resources owned by this value
    ///
    /// Invoked whenever the cache drops an entry: budget eviction, `delete`,
    /// replacement under the same key and `clear`. Always called outside the
    /// cache lock. The default does nothing.
    fn release(&self) {}

    /// Whether a cached value can still be handed out
    ///
    /// `get` treats an unusable entry as a miss and drops it. Called with
    /// the cache locked, so it must not touch the cache. The default is
    /// always usable.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub size: usize,

    /// Maximum number of entries
    pub max_size: usize,

    /// Estimated memory used by cached entries (bytes)
    pub memory_usage: usize,

    /// Maximum estimated memory allowed (bytes)
    pub max_memory: usize,

    /// Memory usage as a percentage of the budget (0-100)
    pub memory_percentage: f64,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted due to budget pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Current memory pressure level
    pub fn pressure(&self) -> MemoryPressure {
        MemoryPressure::from_utilization(self.memory_percentage / 100.0)
    }
}

struct CacheEntry<V> {
    value: V,
    estimated_bytes: usize,
}

/// Internal cache state
struct CacheState<V> {
    /// Map from key to entry
    entries: HashMap<String, CacheEntry<V>>,

    /// Recency list (most recently used at back, least recently used at front)
    recency: VecDeque<String>,

    /// Current estimated memory usage in bytes
    memory_used: usize,

    max_entries: usize,
    max_memory: usize,

    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: CacheValue> CacheState<V> {
    fn new(max_entries: usize, max_memory: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: VecDeque::new(),
            memory_used: 0,
            max_entries,
            max_memory,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Move a key to the back of the recency list (mark as most recently used)
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(entry.estimated_bytes);
        self.recency.retain(|k| k != key);
        Some(entry)
    }

    /// Evict the least recently used entry into `evicted`
    fn evict_lru(&mut self, evicted: &mut Vec<V>) -> bool {
        let Some(key) = self.recency.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(entry.estimated_bytes);
            self.evictions += 1;
            tracing::debug!(
                key = %key,
                bytes = entry.estimated_bytes,
                "evicted least recently used cache entry"
            );
            evicted.push(entry.value);
        }
        true
    }

    /// Evict entries until `incoming_bytes` (and one more entry when
    /// `incoming_entry` is set) fit within both budgets
    ///
    /// Returns the evicted values, still to be released.
    fn evict_to_fit(&mut self, incoming_bytes: usize, incoming_entry: bool) -> Vec<V> {
        let extra_entries = usize::from(incoming_entry);
        let mut evicted = Vec::new();
        while !self.entries.is_empty()
            && (self.memory_used + incoming_bytes > self.max_memory
                || self.entries.len() + extra_entries > self.max_entries)
        {
            if !self.evict_lru(&mut evicted) {
                break;
            }
        }
        evicted
    }

    fn stats(&self) -> CacheStats {
        let memory_percentage = if self.max_memory == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.max_memory as f64 * 100.0
        };
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_entries,
            memory_usage: self.memory_used,
            max_memory: self.max_memory,
            memory_percentage,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

/// Memory-aware LRU cache
///
/// Thread-safe cache shared between the scheduler and its loaders. Cloning
/// the cache yields another handle to the same storage.
///
/// # Example
///
/// ```
/// use media_preload_cache::{CacheValue, MemoryAwareLruCache};
///
/// #[derive(Clone)]
/// struct Blob(Vec<u8>);
///
/// impl CacheValue for Blob {
///     fn estimated_bytes(&self) -> usize {
///         self.0.len()
///     }
/// }
///
/// let cache = MemoryAwareLruCache::new(2, 1024 * 1024);
/// cache.set("a", Blob(vec![0; 16]));
/// cache.set("b", Blob(vec![0; 16]));
/// cache.set("c", Blob(vec![0; 16]));
///
/// assert!(!cache.has("a"));
/// assert!(cache.has("b"));
/// assert!(cache.has("c"));
/// ```
pub struct MemoryAwareLruCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V> Clone for MemoryAwareLruCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: CacheValue> MemoryAwareLruCache<V> {
    /// Create a cache with an entry-count budget and a memory budget in bytes
    pub fn new(max_entries: usize, max_memory: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(max_entries, max_memory))),
        }
    }

    /// Create a cache with a memory budget in megabytes
    pub fn with_mb_limit(max_entries: usize, megabytes: usize) -> Self {
        Self::new(max_entries, megabytes * 1024 * 1024)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run release hooks for values already out of the cache
    fn release_all(dropped: Vec<V>) {
        for value in &dropped {
            value.release();
        }
    }

    /// Store a value
    ///
    /// Least recently used entries are evicted, one at a time, until both
    /// budgets admit the new entry. A value that alone exceeds the memory
    /// budget (or a cache with a zero entry budget) is refused and `false`
    /// is returned. Replaced and evicted values are released.
    pub fn set(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        let estimated_bytes = value.estimated_bytes();
        let mut state = self.lock();

        if estimated_bytes > state.max_memory || state.max_entries == 0 {
            tracing::warn!(
                key = %key,
                bytes = estimated_bytes,
                max_memory = state.max_memory,
                "refusing cache insert that can never fit the budget"
            );
            return false;
        }

        // Replace in place: the old entry is never an eviction candidate
        let replaced = state.remove_entry(&key);
        let mut dropped = state.evict_to_fit(estimated_bytes, true);
        dropped.extend(replaced.map(|entry| entry.value));

        state.memory_used += estimated_bytes;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                estimated_bytes,
            },
        );
        state.recency.push_back(key);
        drop(state);

        Self::release_all(dropped);
        true
    }

    /// Retrieve a value and mark it most recently used
    ///
    /// A miss leaves recency untouched. An entry that is no longer
    /// [usable](CacheValue::is_usable) counts as a miss and is dropped.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.lock();

        let stale = match state.entries.get(key).map(|e| e.value.is_usable()) {
            Some(true) => {
                let value = state.entries.get(key).map(|e| e.value.clone());
                state.touch(key);
                state.hits += 1;
                return value;
            }
            Some(false) => state.remove_entry(key),
            None => None,
        };
        state.misses += 1;
        drop(state);

        if let Some(entry) = stale {
            tracing::debug!(key = %key, "dropped stale cache entry");
            entry.value.release();
        }
        None
    }

    /// Check if a key is cached without updating recency
    pub fn has(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Remove and release a key
    ///
    /// Returns `true` if the key was cached.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().remove_entry(key);
        match removed {
            Some(entry) => {
                entry.value.release();
                true
            }
            None => false,
        }
    }

    /// Release and drop every entry
    pub fn clear(&self) {
        let drained: Vec<CacheEntry<V>> = {
            let mut state = self.lock();
            state.recency.clear();
            state.memory_used = 0;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };

        // Release hooks run outside the lock; they may call back into platform code
        let released = drained.len();
        Self::release_all(drained.into_iter().map(|entry| entry.value).collect());
        tracing::debug!(released, "cache cleared");
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Update both budgets, evicting synchronously if usage now exceeds them
    pub fn set_limits(&self, max_entries: usize, max_memory: usize) {
        let evicted = {
            let mut state = self.lock();
            state.max_entries = max_entries;
            state.max_memory = max_memory;
            state.evict_to_fit(0, false)
        };
        Self::release_all(evicted);
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lock().recency.iter().cloned().collect()
    }

    /// Number of entries currently cached
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl<V: CacheValue> Default for MemoryAwareLruCache<V> {
    /// Create a cache holding 50 entries within 100MB
    fn default() -> Self {
        Self::with_mb_limit(50, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct Weighted(usize);

    impl CacheValue for Weighted {
        fn estimated_bytes(&self) -> usize {
            self.0
        }
    }

    #[derive(Clone)]
    struct Releasing(Arc<AtomicUsize>);

    impl CacheValue for Releasing {
        fn estimated_bytes(&self) -> usize {
            64
        }

        fn release(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_basic_set_get() {
        let cache = MemoryAwareLruCache::new(10, 1024);
        assert!(cache.set("a", Weighted(100)));

        assert_eq!(cache.get("a"), Some(Weighted(100)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache: MemoryAwareLruCache<Weighted> = MemoryAwareLruCache::new(10, 1024);

        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_count_budget_evicts_oldest() {
        let cache = MemoryAwareLruCache::new(2, 1024 * 1024);
        cache.set("a", Weighted(1));
        cache.set("b", Weighted(1));
        cache.set("c", Weighted(1));

        assert!(!cache.has("a"));
        assert!(cache.has("b"));
        assert!(cache.has("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_memory_budget_evicts_oldest() {
        let cache = MemoryAwareLruCache::new(10, 300);
        cache.set("a", Weighted(100));
        cache.set("b", Weighted(100));
        cache.set("c", Weighted(100));
        cache.set("d", Weighted(150)); // needs a and b gone

        assert!(!cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
        assert!(cache.has("d"));
        assert_eq!(cache.stats().memory_usage, 250);
    }

    #[test]
    fn test_get_moves_key_to_most_recent() {
        let cache = MemoryAwareLruCache::new(2, 1024);
        cache.set("a", Weighted(1));
        cache.set("b", Weighted(1));

        // Access a to make it more recently used
        assert!(cache.get("a").is_some());
        assert_eq!(cache.keys_by_recency(), vec!["b".to_string(), "a".to_string()]);

        // Adding c should evict b (now least recently used)
        cache.set("c", Weighted(1));

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
    }

    #[test]
    fn test_miss_does_not_touch_recency() {
        let cache = MemoryAwareLruCache::new(3, 1024);
        cache.set("a", Weighted(1));
        cache.set("b", Weighted(1));

        let before = cache.keys_by_recency();
        assert!(cache.get("zzz").is_none());
        assert_eq!(cache.keys_by_recency(), before);
    }

    #[test]
    fn test_has_does_not_touch_recency() {
        let cache = MemoryAwareLruCache::new(2, 1024);
        cache.set("a", Weighted(1));
        cache.set("b", Weighted(1));

        assert!(cache.has("a"));
        cache.set("c", Weighted(1));

        assert!(!cache.has("a"));
    }

    #[test]
    fn test_update_existing_key() {
        let cache = MemoryAwareLruCache::new(2, 1024);
        cache.set("a", Weighted(100));
        cache.set("b", Weighted(100));
        cache.set("a", Weighted(200));

        // Replacing a key never evicts the other entry
        assert_eq!(cache.len(), 2);
        assert!(cache.has("b"));
        assert_eq!(cache.get("a"), Some(Weighted(200)));
        assert_eq!(cache.stats().memory_usage, 300);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_oversized_value_is_refused() {
        let cache = MemoryAwareLruCache::new(10, 100);
        cache.set("small", Weighted(10));

        assert!(!cache.set("huge", Weighted(101)));
        assert!(!cache.has("huge"));
        // Existing entries survive a refused insert
        assert!(cache.has("small"));
    }

    #[test]
    fn test_delete() {
        let cache = MemoryAwareLruCache::new(10, 1024);
        cache.set("a", Weighted(100));

        assert!(cache.delete("a"));
        assert!(!cache.has("a"));
        assert_eq!(cache.stats().memory_usage, 0);

        // Deleting again should return false
        assert!(!cache.delete("a"));
    }

    #[test]
    fn test_clear_invokes_release_hooks() {
        let released = Arc::new(AtomicUsize::new(0));
        let cache = MemoryAwareLruCache::new(10, 1024);
        cache.set("a", Releasing(Arc::clone(&released)));
        cache.set("b", Releasing(Arc::clone(&released)));

        cache.clear();

        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().memory_usage, 0);
        assert!(cache.keys_by_recency().is_empty());
    }

    #[test]
    fn test_eviction_delete_and_replace_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let cache = MemoryAwareLruCache::new(2, 1024);
        cache.set("a", Releasing(Arc::clone(&released)));
        cache.set("b", Releasing(Arc::clone(&released)));

        // Evicts a
        cache.set("c", Releasing(Arc::clone(&released)));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        cache.set("c", Releasing(Arc::clone(&released)));
        assert_eq!(released.load(Ordering::SeqCst), 2);

        assert!(cache.delete("b"));
        assert!(!cache.delete("b"));
        assert_eq!(released.load(Ordering::SeqCst), 3);

        cache.set_limits(0, 1024);
        assert_eq!(released.load(Ordering::SeqCst), 4);
        assert!(cache.is_empty());
    }

    #[derive(Clone)]
    struct Expiring(Arc<AtomicBool>);

    impl CacheValue for Expiring {
        fn estimated_bytes(&self) -> usize {
            16
        }

        fn is_usable(&self) -> bool {
            !self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_unusable_entry_is_a_miss() {
        let expired = Arc::new(AtomicBool::new(false));
        let cache = MemoryAwareLruCache::new(10, 1024);
        cache.set("a", Expiring(Arc::clone(&expired)));
        assert!(cache.get("a").is_some());

        expired.store(true, Ordering::SeqCst);

        assert!(cache.get("a").is_none());
        assert!(!cache.has("a"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.memory_usage, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_stats() {
        let cache = MemoryAwareLruCache::new(4, 1000);
        cache.set("a", Weighted(250));

        // One hit
        let _ = cache.get("a");
        // Two misses
        let _ = cache.get("b");
        let _ = cache.get("c");

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 4);
        assert_eq!(stats.memory_usage, 250);
        assert_eq!(stats.max_memory, 1000);
        assert!((stats.memory_percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);

        // Hit rate should be 1/3
        assert!((stats.hit_rate() - 0.333).abs() < 0.01);
        assert_eq!(stats.pressure(), MemoryPressure::Low);
    }

    #[test]
    fn test_set_limits_evicts() {
        let cache = MemoryAwareLruCache::new(10, 1000);
        cache.set("a", Weighted(300));
        cache.set("b", Weighted(300));
        cache.set("c", Weighted(300));

        cache.set_limits(10, 650);

        assert_eq!(cache.len(), 2);
        assert!(!cache.has("a"));
        assert!(cache.stats().memory_usage <= 650);

        cache.set_limits(1, 650);
        assert_eq!(cache.len(), 1);
        assert!(cache.has("c"));
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = MemoryAwareLruCache::new(10, 1024);
        let other = cache.clone();
        cache.set("a", Weighted(1));

        assert!(other.has("a"));
    }

    #[test]
    fn test_budgets_hold_for_random_operations() {
        let max_entries = 8;
        let max_memory = 4096;
        let cache = MemoryAwareLruCache::new(max_entries, max_memory);
        let mut rng = rand::thread_rng();

        for _ in 0..2000 {
            let key = format!("k{}", rng.gen_range(0..32));
            if rng.gen_bool(0.6) {
                cache.set(key, Weighted(rng.gen_range(1..1500)));
            } else {
                let _ = cache.get(&key);
            }

            let stats = cache.stats();
            assert!(stats.size <= max_entries, "count exceeded: {}", stats.size);
            assert!(
                stats.memory_usage <= max_memory,
                "memory exceeded: {}",
                stats.memory_usage
            );
            assert_eq!(cache.keys_by_recency().len(), stats.size);
        }
    }
}
