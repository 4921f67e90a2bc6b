//! recondb — a local-first tiered data store for intelligence workloads
//!
//! An authoritative in-memory working set, a durable file-backed tier
//! behind a swappable adapter, a read-through cache, a reactive
//! full-text search index, and a schema-migration engine, coordinated
//! by a transactional [`StoreHandle`].
//!
//! # Quick start
//!
//! ```no_run
//! use recondb::{NewEntity, SearchRequest, StoreConfig, StoreHandle};
//!
//! let store = StoreHandle::open_dir("./data")?;
//!
//! let report = store.store_entity(
//!     NewEntity::new("report")
//!         .with_field("title", "weekly summary")
//!         .with_tag("osint"),
//! )?;
//!
//! let fetched = store.get_entity(&report.id)?;
//! assert_eq!(fetched.id, report.id);
//!
//! store.wait_for_index_sync(std::time::Duration::from_secs(1));
//! let hits = store.search(&SearchRequest::new("weekly"))?;
//! # let _ = (hits, StoreConfig::in_memory());
//! # Ok::<(), recondb::RecondbError>(())
//! ```
//!
//! # Crates
//!
//! | Crate | Concern |
//! |-------|---------|
//! | `recon-core` | Types, errors, events, transactions, the backend seam |
//! | `recon-store` | Authoritative in-memory tier |
//! | `recon-persist` | File-backed and in-memory persistent adapters |
//! | `recon-cache` | TTL + capacity read cache |
//! | `recon-search` | Inverted-index full-text search |
//! | `recon-migrate` | Declarative schema migrations |
//! | `recon-engine` | The `StoreHandle` facade and event plumbing |

// Core vocabulary
pub use recon_core::{
    BaseEntity, Direction, EntityId, EntityPatch, MigrationLogEntry, NewEntity, NewRelationship,
    PersistentBackend, QueryOptions, RecondbError, Relationship, RelationshipId, Result,
    SortField, SortOrder, StorageResult, StoreEvent, Transaction, TransactionStatus,
};

// The facade
pub use recon_engine::{
    EventBus, PersistenceMode, SearchResult, SequencedEvent, StoreConfig, StoreHandle,
    StoreHandleStats, WriteOptions, CONFIG_FILE_NAME,
};

// Search surface
pub use recon_search::{SearchHit, SearchRequest, SearchSchema};

// Migration surface
pub use recon_migrate::{
    FieldType, MigrationOperation, MigrationPlan, MigrationResult, MigrationStatus, MigrationStep,
    TransformRegistry,
};

// Tier building blocks, for tests and custom wiring
pub use recon_cache::{CacheConfig, CacheLayer, CacheStats};
pub use recon_persist::{FailingBackend, FileBackend, MemoryBackend};
pub use recon_store::EntityStore;
