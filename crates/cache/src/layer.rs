//! Bounded TTL cache with frequency/recency eviction

use dashmap::DashMap;
use recon_core::{BaseEntity, EntityId, QueryOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache sizing and expiry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction kicks in
    pub capacity: usize,
    /// Per-entry time to live
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a live entry
    pub hits: u64,
    /// Lookups that found nothing (or an expired entry)
    pub misses: u64,
    /// Entries removed by capacity pressure
    pub evictions: u64,
    /// Current entry count
    pub entries: usize,
}

enum CachedValue {
    Entity(BaseEntity),
    Query {
        /// Normalized type filter of the cached options; empty covers all
        /// types. Kept so writes can invalidate affected result sets.
        types: Vec<String>,
        results: Vec<BaseEntity>,
    },
}

struct CacheEntry {
    value: CachedValue,
    inserted_at: Instant,
    last_access: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn new(value: CachedValue) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            last_access: now,
            access_count: 0,
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }

    /// Eviction priority: frequently and recently used entries survive.
    /// Lowest score goes first.
    fn priority(&self) -> i64 {
        self.access_count as i64 * 10 - self.last_access.elapsed().as_secs() as i64
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
        self.access_count += 1;
    }
}

/// Bounded read cache for individual entities and whole query results
pub struct CacheLayer {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn entity_key(id: &EntityId) -> String {
    format!("entity:{}", id)
}

impl CacheLayer {
    /// Create a cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // Entity entries
    // ========================================================================

    /// Cache a copy of an entity
    pub fn cache_entity(&self, entity: &BaseEntity) {
        self.insert(entity_key(&entity.id), CachedValue::Entity(entity.clone()));
    }

    /// Fetch a cached entity, refreshing its access bookkeeping
    pub fn get_entity(&self, id: &EntityId) -> Option<BaseEntity> {
        match self.get(&entity_key(id)) {
            Some(CachedValue::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    /// Drop an entity entry
    pub fn remove_entity(&self, id: &EntityId) {
        self.entries.remove(&entity_key(id));
    }

    // ========================================================================
    // Query entries
    // ========================================================================

    /// Cache a query result set keyed by the exact options used
    pub fn cache_query(&self, options: &QueryOptions, results: &[BaseEntity]) {
        let mut types = options.types.clone();
        types.sort();
        types.dedup();
        self.insert(
            options.cache_key(),
            CachedValue::Query {
                types,
                results: results.to_vec(),
            },
        );
    }

    /// Fetch a cached query result set
    pub fn get_query(&self, options: &QueryOptions) -> Option<Vec<BaseEntity>> {
        match self.get(&options.cache_key()) {
            Some(CachedValue::Query { results, .. }) => Some(results),
            _ => None,
        }
    }

    /// Drop every query entry whose type filter covers the given type
    ///
    /// Called after any entity write; an empty type filter covers all
    /// types, so unfiltered query entries always go.
    pub fn invalidate_queries_for_type(&self, entity_type: &str) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| match &entry.value {
            CachedValue::Query { types, .. } => {
                !(types.is_empty() || types.iter().any(|t| t == entity_type))
            }
            CachedValue::Entity(_) => true,
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(entity_type, dropped, "invalidated query cache entries");
        }
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    fn get(&self, key: &str) -> Option<CachedValue> {
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.expired(self.config.ttl) {
                    true
                } else {
                    entry.touch();
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(match &entry.value {
                        CachedValue::Entity(e) => CachedValue::Entity(e.clone()),
                        CachedValue::Query { types, results } => CachedValue::Query {
                            types: types.clone(),
                            results: results.clone(),
                        },
                    });
                }
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn insert(&self, key: String, value: CachedValue) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.evict();
        }
        self.entries.insert(key, CacheEntry::new(value));
    }

    /// Evict the lowest-priority entries until the cache is under capacity
    fn evict(&self) {
        let target = self.config.capacity.saturating_sub(1);
        let over = self.entries.len().saturating_sub(target);
        if over == 0 {
            return;
        }

        let mut scored: Vec<(String, i64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.priority()))
            .collect();
        scored.sort_by_key(|(_, priority)| *priority);

        for (key, _) in scored.into_iter().take(over) {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::NewEntity;

    fn entity(entity_type: &str) -> BaseEntity {
        NewEntity::new(entity_type).into_entity(EntityId::new(), Utc::now())
    }

    fn cache(capacity: usize) -> CacheLayer {
        CacheLayer::new(CacheConfig {
            capacity,
            ttl: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_entity_roundtrip() {
        let cache = cache(16);
        let e = entity("node");
        cache.cache_entity(&e);
        assert_eq!(cache.get_entity(&e.id), Some(e));
    }

    #[test]
    fn test_miss_on_absent() {
        let cache = cache(16);
        assert!(cache.get_entity(&EntityId::new()).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_remove_entity() {
        let cache = cache(16);
        let e = entity("node");
        cache.cache_entity(&e);
        cache.remove_entity(&e.id);
        assert!(cache.get_entity(&e.id).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = CacheLayer::new(CacheConfig {
            capacity: 16,
            ttl: Duration::from_millis(10),
        });
        let e = entity("node");
        cache.cache_entity(&e);
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get_entity(&e.id).is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_capacity_eviction_prefers_hot_entries() {
        let cache = cache(3);
        let hot = entity("node");
        let cold_a = entity("node");
        let cold_b = entity("node");
        cache.cache_entity(&hot);
        cache.cache_entity(&cold_a);
        cache.cache_entity(&cold_b);

        // Raise the hot entry's access count well above the others.
        for _ in 0..5 {
            cache.get_entity(&hot.id);
        }

        cache.cache_entity(&entity("node"));
        assert!(cache.get_entity(&hot.id).is_some());
        assert!(cache.stats().evictions >= 1);
        assert!(cache.stats().entries <= 3);
    }

    #[test]
    fn test_query_roundtrip_keyed_by_options() {
        let cache = cache(16);
        let results = vec![entity("node"), entity("node")];
        let options = QueryOptions::new().with_type("node");
        cache.cache_query(&options, &results);

        assert_eq!(cache.get_query(&options), Some(results));
        assert!(cache
            .get_query(&QueryOptions::new().with_type("event"))
            .is_none());
    }

    #[test]
    fn test_invalidate_queries_for_type() {
        let cache = cache(16);
        let node_options = QueryOptions::new().with_type("node");
        let event_options = QueryOptions::new().with_type("event");
        let open_options = QueryOptions::new();
        cache.cache_query(&node_options, &[entity("node")]);
        cache.cache_query(&event_options, &[entity("event")]);
        cache.cache_query(&open_options, &[entity("node"), entity("event")]);

        cache.invalidate_queries_for_type("node");

        assert!(cache.get_query(&node_options).is_none());
        assert!(cache.get_query(&open_options).is_none());
        assert!(cache.get_query(&event_options).is_some());
    }

    #[test]
    fn test_invalidation_leaves_entity_entries() {
        let cache = cache(16);
        let e = entity("node");
        cache.cache_entity(&e);
        cache.invalidate_queries_for_type("node");
        assert!(cache.get_entity(&e.id).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = cache(16);
        cache.cache_entity(&entity("node"));
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
