//! Authoritative in-memory tier
//!
//! The entity store owns the authoritative copy of every entity and
//! relationship. Operations here never suspend and never touch disk; the
//! orchestrator layers durability, caching, and events on top.
//!
//! # Resource-sharing discipline
//!
//! The maps behind this store are the single shared mutable resource in
//! the system. Only the orchestrator's transaction machinery and the
//! migration engine mutate them; the cache and the search index read them
//! and react to emitted events.

mod entity_store;

pub use entity_store::{EntityStore, StoreStats};
