//! Read cache for entities and query result sets
//!
//! A secondary, non-authoritative tier: bounded capacity, per-entry TTL,
//! and priority eviction combining access frequency with recency. Only
//! the orchestrator writes here, which keeps invalidation centralized in
//! one place; after an eviction the cache is never the source of truth.

mod layer;

pub use layer::{CacheConfig, CacheLayer, CacheStats};
