//! In-memory entity and relationship maps

use chrono::Utc;
use parking_lot::RwLock;
use recon_core::{
    BaseEntity, EntityId, EntityPatch, NewEntity, NewRelationship, QueryOptions, RecondbError,
    Relationship, RelationshipId, Result,
};
use std::collections::HashMap;
use tracing::debug;

/// Counters for the in-memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of entities held
    pub entities: usize,
    /// Number of relationships held
    pub relationships: usize,
}

/// Authoritative in-memory store for entities and relationships
///
/// Identity generation and structural validation live here. The store
/// emits no events itself; the orchestrator publishes lifecycle events
/// after its transaction commits, so subscribers never observe a write
/// that was later rolled back.
///
/// # Concurrency
///
/// Individual operations are internally consistent under concurrent
/// callers (each takes the lock once), but there is no cross-operation
/// serialization: two concurrent updates to the same id are
/// last-write-wins.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: RwLock<HashMap<EntityId, BaseEntity>>,
    relationships: RwLock<HashMap<RelationshipId, Relationship>>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Entity CRUD
    // ========================================================================

    /// Create an entity, assigning id and timestamps
    ///
    /// # Errors
    ///
    /// `RecondbError::Validation` when required attributes are missing.
    pub fn create(&self, new: NewEntity) -> Result<BaseEntity> {
        new.validate()?;
        let entity = new.into_entity(EntityId::new(), Utc::now());
        debug!(id = %entity.id, entity_type = %entity.entity_type, "created entity");
        self.entities.write().insert(entity.id, entity.clone());
        Ok(entity)
    }

    /// Fetch an entity by id
    pub fn get(&self, id: &EntityId) -> Result<BaseEntity> {
        self.entities
            .read()
            .get(id)
            .cloned()
            .ok_or(RecondbError::NotFound(*id))
    }

    /// True when the id is present in this tier
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.read().contains_key(id)
    }

    /// Merge a patch into an entity, bumping `updated_at`
    pub fn update(&self, id: &EntityId, patch: &EntityPatch) -> Result<BaseEntity> {
        let mut entities = self.entities.write();
        let entity = entities.get_mut(id).ok_or(RecondbError::NotFound(*id))?;
        entity.apply_patch(patch);
        debug!(id = %id, "updated entity");
        Ok(entity.clone())
    }

    /// Remove an entity, returning the removed snapshot
    pub fn delete(&self, id: &EntityId) -> Result<BaseEntity> {
        let removed = self
            .entities
            .write()
            .remove(id)
            .ok_or(RecondbError::NotFound(*id))?;
        debug!(id = %id, "deleted entity");
        Ok(removed)
    }

    /// Query entities with client-side filtering over the full set
    pub fn query(&self, options: &QueryOptions) -> Vec<BaseEntity> {
        let candidates: Vec<BaseEntity> = self.entities.read().values().cloned().collect();
        options.apply(candidates)
    }

    /// Snapshot of every entity, for reindexing and migration scans
    pub fn all_entities(&self) -> Vec<BaseEntity> {
        self.entities.read().values().cloned().collect()
    }

    // ========================================================================
    // Unvalidated plumbing (promotion and rollback paths)
    // ========================================================================

    /// Insert a fully formed entity, replacing any existing copy
    ///
    /// Used by the orchestrator's promotion path (persistent-tier hits are
    /// re-inserted here) and by transaction compensations. No validation,
    /// no id assignment, no timestamp rewrite.
    pub fn insert_existing(&self, entity: BaseEntity) {
        self.entities.write().insert(entity.id, entity);
    }

    /// Remove an entity without treating absence as an error
    ///
    /// Rollback payloads delete blindly; an id that never landed is fine.
    pub fn remove_silent(&self, id: &EntityId) {
        self.entities.write().remove(id);
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship, assigning id and timestamp
    ///
    /// Scalar ranges and the label are validated here; endpoint
    /// resolution is the orchestrator's job since only it can consult the
    /// persistent tier for not-yet-promoted ids.
    pub fn create_relationship(&self, new: NewRelationship) -> Result<Relationship> {
        new.validate()?;
        let relationship = new.into_relationship(RelationshipId::new(), Utc::now());
        debug!(
            id = %relationship.id,
            rel_type = %relationship.rel_type,
            "created relationship"
        );
        self.relationships
            .write()
            .insert(relationship.id, relationship.clone());
        Ok(relationship)
    }

    /// Fetch a relationship by id
    pub fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        self.relationships
            .read()
            .get(id)
            .cloned()
            .ok_or(RecondbError::RelationshipNotFound(*id))
    }

    /// All relationships touching the given entity, sorted by id
    pub fn relationships_for(&self, entity_id: &EntityId) -> Vec<Relationship> {
        let mut found: Vec<Relationship> = self
            .relationships
            .read()
            .values()
            .filter(|r| r.touches(entity_id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        found
    }

    /// Remove a relationship, returning the removed snapshot
    pub fn delete_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        self.relationships
            .write()
            .remove(id)
            .ok_or(RecondbError::RelationshipNotFound(*id))
    }

    /// Insert a fully formed relationship, replacing any existing copy
    pub fn insert_existing_relationship(&self, relationship: Relationship) {
        self.relationships
            .write()
            .insert(relationship.id, relationship);
    }

    /// Remove a relationship without treating absence as an error
    pub fn remove_relationship_silent(&self, id: &RelationshipId) {
        self.relationships.write().remove(id);
    }

    // ========================================================================
    // Stats
    // ========================================================================

    /// Counters for this tier
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entities: self.entities.read().len(),
            relationships: self.relationships.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_assigns_identity() {
        let store = EntityStore::new();
        let a = store.create(NewEntity::new("node")).unwrap();
        let b = store.create(NewEntity::new("node")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn test_create_rejects_missing_type() {
        let store = EntityStore::new();
        let err = store.create(NewEntity::new("")).unwrap_err();
        assert!(matches!(err, RecondbError::Validation(_)));
        assert_eq!(store.stats().entities, 0);
    }

    #[test]
    fn test_get_roundtrip() {
        let store = EntityStore::new();
        let created = store
            .create(NewEntity::new("report").with_field("title", "summary"))
            .unwrap();
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(created, fetched);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = EntityStore::new();
        let err = store.get(&EntityId::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_merges_and_bumps() {
        let store = EntityStore::new();
        let created = store
            .create(NewEntity::new("node").with_field("status", "active"))
            .unwrap();

        let patch = EntityPatch::new().set_field("status", "dormant");
        let updated = store.update(&created.id, &patch).unwrap();

        assert_eq!(updated.metadata["status"], json!("dormant"));
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = EntityStore::new();
        let err = store
            .update(&EntityId::new(), &EntityPatch::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_returns_snapshot() {
        let store = EntityStore::new();
        let created = store.create(NewEntity::new("node")).unwrap();
        let removed = store.delete(&created.id).unwrap();
        assert_eq!(created, removed);
        assert!(store.get(&created.id).is_err());
    }

    #[test]
    fn test_query_filters_client_side() {
        let store = EntityStore::new();
        store.create(NewEntity::new("node").with_tag("alpha")).unwrap();
        store.create(NewEntity::new("node").with_tag("bravo")).unwrap();
        store.create(NewEntity::new("event").with_tag("alpha")).unwrap();

        let nodes = store.query(&QueryOptions::new().with_type("node"));
        assert_eq!(nodes.len(), 2);

        let alpha = store.query(&QueryOptions::new().with_tag("alpha"));
        assert_eq!(alpha.len(), 2);

        let both = store.query(
            &QueryOptions::new().with_type("node").with_tag("alpha"),
        );
        assert_eq!(both.len(), 1);
    }

    #[test]
    fn test_insert_existing_replaces() {
        let store = EntityStore::new();
        let created = store.create(NewEntity::new("node")).unwrap();
        let mut replacement = created.clone();
        replacement
            .metadata
            .insert("restored".into(), json!(true));
        store.insert_existing(replacement.clone());
        assert_eq!(store.get(&created.id).unwrap(), replacement);
    }

    #[test]
    fn test_remove_silent_tolerates_absent() {
        let store = EntityStore::new();
        store.remove_silent(&EntityId::new());
    }

    #[test]
    fn test_relationship_lifecycle() {
        let store = EntityStore::new();
        let a = store.create(NewEntity::new("node")).unwrap();
        let b = store.create(NewEntity::new("node")).unwrap();

        let rel = store
            .create_relationship(NewRelationship::new("knows", a.id, b.id).with_scores(80, 60))
            .unwrap();

        assert_eq!(store.get_relationship(&rel.id).unwrap(), rel);
        assert_eq!(store.relationships_for(&a.id).len(), 1);
        assert_eq!(store.relationships_for(&b.id).len(), 1);

        store.delete_relationship(&rel.id).unwrap();
        assert!(store.relationships_for(&a.id).is_empty());
    }

    #[test]
    fn test_relationship_validation() {
        let store = EntityStore::new();
        let a = EntityId::new();
        let b = EntityId::new();
        let err = store
            .create_relationship(NewRelationship::new("knows", a, b).with_scores(120, 50))
            .unwrap_err();
        assert!(matches!(err, RecondbError::Validation(_)));
    }

    #[test]
    fn test_stats() {
        let store = EntityStore::new();
        let a = store.create(NewEntity::new("node")).unwrap();
        let b = store.create(NewEntity::new("node")).unwrap();
        store
            .create_relationship(NewRelationship::new("knows", a.id, b.id))
            .unwrap();
        let stats = store.stats();
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.relationships, 1);
    }
}
