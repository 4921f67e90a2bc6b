//! The store facade
//!
//! `StoreHandle` is the one surface callers use. Reads route cache →
//! memory → persistent tier, promoting hits into the tiers above. Writes
//! fan out to the memory tier, the cache, and the persistent tier inside
//! a compensating transaction, then publish a lifecycle event — so a
//! failed write leaves every tier exactly as it was, and subscribers
//! never see a write that was rolled back.
//!
//! # Concurrency
//!
//! Individual tier operations are internally consistent under concurrent
//! callers, but there is no cross-call isolation: two concurrent updates
//! to the same id race and the last write wins. Callers needing
//! serialization must layer it above the store.

use crate::config::{PersistenceMode, StoreConfig};
use crate::events::{EventBus, SequencedEvent};
use crate::indexer::IndexWorker;
use parking_lot::Mutex;
use recon_cache::{CacheLayer, CacheStats};
use recon_core::{
    BaseEntity, EntityId, EntityPatch, NewEntity, NewRelationship, PersistentBackend,
    QueryOptions, RecondbError, Relationship, StorageResult, StoreEvent, Transaction,
};
use recon_migrate::{
    MigrationContext, MigrationEngine, MigrationPlan, MigrationResult, MigrationStatus,
    TransformRegistry,
};
use recon_persist::{FileBackend, MemoryBackend};
use recon_search::{IndexStats, SearchIndex, SearchRequest, SearchSchema};
use recon_store::EntityStore;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Per-write persistence policy
///
/// The default persists to the configured backend; `ephemeral()` skips
/// the persistent tier entirely, for derived or scratch records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write through to the persistent tier
    pub persist: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { persist: true }
    }
}

impl WriteOptions {
    /// Skip the persistent tier for this write
    pub fn ephemeral() -> Self {
        Self { persist: false }
    }
}

/// One search result, resolved back to its entity
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched entity
    pub entity: BaseEntity,
    /// Relevance score, higher is better
    pub score: f32,
    /// field → highlighted snippets
    pub highlights: HashMap<String, Vec<String>>,
}

/// Per-tier counters
#[derive(Debug, Clone)]
pub struct StoreHandleStats {
    /// Entities in the memory tier
    pub entities: usize,
    /// Relationships in the memory tier
    pub relationships: usize,
    /// Cache counters
    pub cache: CacheStats,
    /// Search index counters
    pub index: IndexStats,
    /// Entities in the persistent tier, when one is configured
    pub persisted_entities: Option<usize>,
}

struct StoreInner {
    config: StoreConfig,
    store: EntityStore,
    cache: CacheLayer,
    backend: Option<Arc<dyn PersistentBackend>>,
    index: Arc<SearchIndex>,
    bus: EventBus,
    migrations: MigrationEngine,
    transforms: Mutex<TransformRegistry>,
    worker: Mutex<IndexWorker>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.bus.close();
        self.worker.lock().join();
    }
}

/// Handle to one store
///
/// Cheap to clone; clones share the same tiers. Constructed explicitly
/// and passed to collaborators — there is no global instance.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

impl StoreHandle {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Open a store with the default search schema
    pub fn open(config: StoreConfig) -> StorageResult<Self> {
        Self::open_with_schema(config, SearchSchema::default())
    }

    /// Open a file-backed store rooted at a directory, loading (or
    /// writing) its `recon.toml`
    pub fn open_dir(data_dir: impl Into<std::path::PathBuf>) -> StorageResult<Self> {
        let config = StoreConfig::load_or_init(data_dir)?;
        Self::open(config)
    }

    /// Open a store with an explicit search schema
    ///
    /// When a persistent tier is configured, its records hydrate the
    /// memory tier and the search index before the handle is returned.
    pub fn open_with_schema(config: StoreConfig, schema: SearchSchema) -> StorageResult<Self> {
        config.validate()?;

        let backend: Option<Arc<dyn PersistentBackend>> = match config.persistence {
            PersistenceMode::File => Some(Arc::new(FileBackend::open(config.data_dir()?)?)),
            PersistenceMode::Memory => Some(Arc::new(MemoryBackend::new())),
            PersistenceMode::None => None,
        };
        Self::build(config, schema, backend)
    }

    /// Open a store over a caller-supplied backend
    ///
    /// The configured persistence mode is ignored; the given adapter is
    /// the persistent tier. This is how tests wire in failure-injecting
    /// or shared backends.
    pub fn open_with_backend(
        config: StoreConfig,
        schema: SearchSchema,
        backend: Arc<dyn PersistentBackend>,
    ) -> StorageResult<Self> {
        Self::build(config, schema, Some(backend))
    }

    fn build(
        config: StoreConfig,
        schema: SearchSchema,
        backend: Option<Arc<dyn PersistentBackend>>,
    ) -> StorageResult<Self> {
        let store = EntityStore::new();
        let index = Arc::new(SearchIndex::new(schema));

        if let Some(backend) = &backend {
            let mut hydrated = 0usize;
            for entity in backend.query_entities(&QueryOptions::default())? {
                index.index_entity(&entity);
                store.insert_existing(entity);
                hydrated += 1;
            }
            for relationship in backend.list_relationships()? {
                store.insert_existing_relationship(relationship);
            }
            if hydrated > 0 {
                debug!(hydrated, "hydrated memory tier from persistent records");
            }
        }

        let bus = EventBus::new();
        let worker = IndexWorker::spawn(index.clone(), bus.subscribe());
        info!(persistence = ?config.persistence, "opened store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                cache: CacheLayer::new(config.cache_config()),
                config,
                store,
                backend,
                index,
                bus,
                migrations: MigrationEngine::new(),
                transforms: Mutex::new(TransformRegistry::with_builtins()),
                worker: Mutex::new(worker),
            }),
        })
    }

    /// The configuration this store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // ========================================================================
    // Entity writes
    // ========================================================================

    /// Store a new entity with the default write policy
    pub fn store_entity(&self, new: NewEntity) -> StorageResult<BaseEntity> {
        self.store_entity_with(new, WriteOptions::default())
    }

    /// Store a new entity
    ///
    /// Fans out to the memory tier, the cache, and (policy permitting)
    /// the persistent tier inside one transaction; on any step failing,
    /// prior steps are compensated before the error returns, so the
    /// caller never observes a partially applied write.
    pub fn store_entity_with(
        &self,
        new: NewEntity,
        options: WriteOptions,
    ) -> StorageResult<BaseEntity> {
        let inner = &*self.inner;
        let store = &inner.store;
        let cache = &inner.cache;
        let mut txn = Transaction::new();

        // Validation failures reject the write before any tier is touched.
        let entity = store.create(new)?;
        let id = entity.id;
        txn.record("memory-write", move || {
            store.remove_silent(&id);
            Ok(())
        })?;

        let cached = entity.clone();
        txn.run_step(
            "cache-write",
            || {
                cache.cache_entity(&cached);
                Ok(())
            },
            move || {
                cache.remove_entity(&id);
                Ok(())
            },
        )?;

        if options.persist {
            if let Some(backend) = &inner.backend {
                let write_to = backend.clone();
                let undo_on = backend.clone();
                let persisted = entity.clone();
                txn.run_step(
                    "persist-write",
                    move || write_to.put_entity(&persisted),
                    move || undo_on.delete_entity(&id),
                )?;
            }
        }

        txn.commit()?;
        inner.cache.invalidate_queries_for_type(&entity.entity_type);
        inner.bus.publish(StoreEvent::EntityCreated {
            entity: entity.clone(),
        });
        debug!(id = %entity.id, entity_type = %entity.entity_type, "stored entity");
        Ok(entity)
    }

    /// Update an entity
    ///
    /// The pre-mutation snapshot is the rollback payload for every tier.
    /// Ephemeral entities (never persisted) stay ephemeral. Concurrent
    /// updates to the same id are last-write-wins.
    pub fn update_entity(&self, id: &EntityId, patch: EntityPatch) -> StorageResult<BaseEntity> {
        let inner = &*self.inner;
        let store = &inner.store;
        let cache = &inner.cache;
        let id = *id;

        let snapshot = match store.get(&id) {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() => match &inner.backend {
                // Promote a persisted-but-not-resident record first.
                Some(backend) => {
                    let persisted = backend.get_entity(&id)?;
                    store.insert_existing(persisted.clone());
                    persisted
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        };

        let persist_to = match &inner.backend {
            Some(backend) => backend.contains_entity(&id)?.then(|| backend.clone()),
            None => None,
        };

        let mut txn = Transaction::new();

        let memory_snapshot = snapshot.clone();
        let updated = txn.run_step(
            "memory-write",
            || store.update(&id, &patch),
            move || {
                store.insert_existing(memory_snapshot);
                Ok(())
            },
        )?;

        let cached = updated.clone();
        txn.run_step(
            "cache-write",
            || {
                cache.cache_entity(&cached);
                Ok(())
            },
            move || {
                cache.remove_entity(&id);
                Ok(())
            },
        )?;

        if let Some(backend) = persist_to {
            let undo_on = backend.clone();
            let persisted = updated.clone();
            let disk_snapshot = snapshot.clone();
            txn.run_step(
                "persist-write",
                move || backend.put_entity(&persisted),
                move || undo_on.put_entity(&disk_snapshot),
            )?;
        }

        txn.commit()?;
        inner.cache.invalidate_queries_for_type(&updated.entity_type);
        inner.bus.publish(StoreEvent::EntityUpdated {
            entity: updated.clone(),
            delta: patch,
        });
        debug!(id = %id, "updated entity");
        Ok(updated)
    }

    /// Delete an entity
    ///
    /// Relationships touching the entity are removed in the same
    /// transaction; an edge without a resolvable endpoint must never
    /// survive a delete.
    pub fn delete_entity(&self, id: &EntityId) -> StorageResult<()> {
        let inner = &*self.inner;
        let store = &inner.store;
        let cache = &inner.cache;
        let id = *id;

        let resident = store.get(&id).ok();
        let snapshot = match &resident {
            Some(snapshot) => snapshot.clone(),
            None => match &inner.backend {
                Some(backend) => backend.get_entity(&id)?,
                None => return Err(RecondbError::NotFound(id)),
            },
        };
        let was_resident = resident.is_some();
        let on_disk = match &inner.backend {
            Some(backend) => backend.contains_entity(&id)?,
            None => false,
        };

        let mut txn = Transaction::new();

        let memory_snapshot = snapshot.clone();
        txn.run_step(
            "memory-delete",
            || {
                store.remove_silent(&id);
                Ok(())
            },
            move || {
                if was_resident {
                    store.insert_existing(memory_snapshot);
                }
                Ok(())
            },
        )?;

        for relationship in store.relationships_for(&id) {
            let rel_id = relationship.id;
            let remove_from = inner.backend.clone();
            let restore_to = inner.backend.clone();
            txn.run_step(
                &format!("relationship-delete:{}", rel_id),
                move || {
                    store.remove_relationship_silent(&rel_id);
                    if let Some(backend) = &remove_from {
                        backend.delete_relationship(&rel_id)?;
                    }
                    Ok(())
                },
                move || {
                    store.insert_existing_relationship(relationship.clone());
                    if let Some(backend) = &restore_to {
                        backend.put_relationship(&relationship)?;
                    }
                    Ok(())
                },
            )?;
        }

        let cache_snapshot = snapshot.clone();
        txn.run_step(
            "cache-delete",
            || {
                cache.remove_entity(&id);
                Ok(())
            },
            move || {
                cache.cache_entity(&cache_snapshot);
                Ok(())
            },
        )?;

        if on_disk {
            if let Some(backend) = &inner.backend {
                let delete_from = backend.clone();
                let restore_to = backend.clone();
                let disk_snapshot = snapshot.clone();
                txn.run_step(
                    "persist-delete",
                    move || delete_from.delete_entity(&id),
                    move || restore_to.put_entity(&disk_snapshot),
                )?;
            }
        }

        txn.commit()?;
        inner.cache.invalidate_queries_for_type(&snapshot.entity_type);
        inner.bus.publish(StoreEvent::EntityDeleted {
            id,
            entity: snapshot,
        });
        debug!(id = %id, "deleted entity");
        Ok(())
    }

    // ========================================================================
    // Entity reads
    // ========================================================================

    /// Fetch an entity: cache → memory → persistent tier
    ///
    /// A hit at any tier populates the tiers above it, and a
    /// persistent-tier hit is re-inserted into the memory tier so
    /// subsequent reads avoid I/O.
    pub fn get_entity(&self, id: &EntityId) -> StorageResult<BaseEntity> {
        let inner = &*self.inner;

        if let Some(entity) = inner.cache.get_entity(id) {
            trace!(id = %id, "cache hit");
            return Ok(entity);
        }

        match inner.store.get(id) {
            Ok(entity) => {
                inner.cache.cache_entity(&entity);
                return Ok(entity);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        match &inner.backend {
            Some(backend) => {
                let entity = backend.get_entity(id)?;
                trace!(id = %id, "promoted entity from persistent tier");
                inner.store.insert_existing(entity.clone());
                inner.cache.cache_entity(&entity);
                Ok(entity)
            }
            None => Err(RecondbError::NotFound(*id)),
        }
    }

    /// Query entities
    ///
    /// Results are cached keyed by the exact options used; an identical
    /// query returns identical ordering and content until an intervening
    /// write invalidates it. The persistent tier is consulted only when
    /// the memory tier yields nothing, and its records backfill both
    /// upper tiers.
    pub fn query_entities(&self, options: &QueryOptions) -> StorageResult<Vec<BaseEntity>> {
        let inner = &*self.inner;

        if !options.force_refresh {
            if let Some(results) = inner.cache.get_query(options) {
                trace!(key = %options.cache_key(), "query cache hit");
                return Ok(results);
            }
        }

        let mut results = inner.store.query(options);

        if results.is_empty() {
            if let Some(backend) = &inner.backend {
                results = backend.query_entities(options)?;
                for entity in &results {
                    inner.store.insert_existing(entity.clone());
                    inner.cache.cache_entity(entity);
                }
                if !results.is_empty() {
                    debug!(count = results.len(), "backfilled query from persistent tier");
                }
            }
        }

        inner.cache.cache_query(options, &results);
        Ok(results)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship between two stored entities
    ///
    /// Both endpoints must resolve in the memory tier or the persistent
    /// tier; a dangling edge is rejected as a validation error.
    pub fn create_relationship(&self, new: NewRelationship) -> StorageResult<Relationship> {
        let inner = &*self.inner;
        let store = &inner.store;
        new.validate()?;

        for (role, endpoint) in [("source", new.source_id), ("target", new.target_id)] {
            if !self.entity_exists(&endpoint)? {
                return Err(RecondbError::validation(format!(
                    "{} entity {} does not resolve to a stored entity",
                    role, endpoint
                )));
            }
        }

        let mut txn = Transaction::new();
        let relationship = store.create_relationship(new)?;
        let rel_id = relationship.id;
        txn.record("memory-write", move || {
            store.remove_relationship_silent(&rel_id);
            Ok(())
        })?;

        if let Some(backend) = &inner.backend {
            let write_to = backend.clone();
            let undo_on = backend.clone();
            let persisted = relationship.clone();
            txn.run_step(
                "persist-write",
                move || write_to.put_relationship(&persisted),
                move || undo_on.delete_relationship(&rel_id),
            )?;
        }

        txn.commit()?;
        debug!(id = %relationship.id, rel_type = %relationship.rel_type, "created relationship");
        Ok(relationship)
    }

    /// All relationships touching an entity
    pub fn get_relationships(&self, entity_id: &EntityId) -> StorageResult<Vec<Relationship>> {
        let inner = &*self.inner;
        let mut found = inner.store.relationships_for(entity_id);

        if found.is_empty() {
            if let Some(backend) = &inner.backend {
                found = backend.relationships_for(entity_id)?;
                for relationship in &found {
                    inner.store.insert_existing_relationship(relationship.clone());
                }
            }
        }
        Ok(found)
    }

    fn entity_exists(&self, id: &EntityId) -> StorageResult<bool> {
        let inner = &*self.inner;
        if inner.store.contains(id) {
            return Ok(true);
        }
        match &inner.backend {
            Some(backend) => backend.contains_entity(id),
            None => Ok(false),
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Full-text search, resolving hits back to entity snapshots
    ///
    /// The index is eventually consistent with the memory tier: a write
    /// is searchable once its event is processed. Use
    /// [`StoreHandle::wait_for_index_sync`] in tests instead of timing
    /// assumptions.
    pub fn search(&self, request: &SearchRequest) -> StorageResult<Vec<SearchResult>> {
        let inner = &*self.inner;

        // A fuzzy request without an explicit budget takes the
        // configured one.
        let mut request = request.clone();
        if request.fuzzy && request.fuzziness.is_none() {
            request.fuzziness = Some(inner.config.fuzzy_distance);
        }
        let hits = recon_search::search(&inner.index, &request);

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match inner.store.get(&hit.id) {
                Ok(entity) => results.push(SearchResult {
                    entity,
                    score: hit.score,
                    highlights: hit.highlights,
                }),
                // The index can briefly trail a delete.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Rebuild the search index synchronously from the memory tier
    pub fn reindex(&self) {
        let inner = &*self.inner;
        inner.index.clear();
        let entities = inner.store.all_entities();
        for entity in &entities {
            inner.index.index_entity(entity);
        }
        info!(documents = entities.len(), "reindexed");
    }

    /// Block until the index worker has processed every published event
    ///
    /// Returns false on timeout.
    pub fn wait_for_index_sync(&self, timeout: Duration) -> bool {
        let inner = &*self.inner;
        let target = inner.bus.last_sequence();
        inner.worker.lock().wait_for(target, timeout)
    }

    // ========================================================================
    // Migration
    // ========================================================================

    /// Execute a migration plan
    ///
    /// Only one migration may run at a time. After a completed run that
    /// touched entities, the cache is cleared and the search index is
    /// rebuilt, since migration writes bypass per-write invalidation.
    pub fn execute_migration(&self, plan: &MigrationPlan) -> StorageResult<MigrationResult> {
        let inner = &*self.inner;
        let transforms = inner.transforms.lock();
        let bus = &inner.bus;
        let emit = |event: StoreEvent| {
            bus.publish(event);
        };

        let ctx = MigrationContext {
            store: &inner.store,
            backend: inner.backend.as_deref(),
            registry: &*transforms,
            emit: &emit,
        };
        let result = inner.migrations.execute(plan, &ctx)?;
        drop(transforms);

        if result.status == MigrationStatus::Completed && result.processed > 0 {
            inner.cache.clear();
            self.reindex();
        }
        Ok(result)
    }

    /// Register a named transform for `TransformField` operations
    pub fn register_transform(&self, name: impl Into<String>, transform: recon_migrate::TransformFn) {
        self.inner.transforms.lock().register(name, transform);
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Subscribe to store events
    pub fn subscribe(&self) -> Receiver<SequencedEvent> {
        self.inner.bus.subscribe()
    }

    /// Per-tier counters
    pub fn stats(&self) -> StoreHandleStats {
        let inner = &*self.inner;
        let store = inner.store.stats();
        StoreHandleStats {
            entities: store.entities,
            relationships: store.relationships,
            cache: inner.cache.stats(),
            index: inner.index.stats(),
            persisted_entities: inner
                .backend
                .as_ref()
                .and_then(|backend| backend.entity_count().ok()),
        }
    }

    /// Close the event bus and join the index worker
    ///
    /// Dropping the last handle does the same; this is for callers that
    /// want a deterministic stop point.
    pub fn shutdown(&self) {
        self.inner.bus.close();
        self.inner.worker.lock().join();
    }
}
