//! In-memory backend double
//!
//! Same contract as the file backend without the disk. Used by tests and
//! by stores configured for ephemeral persistence.

use parking_lot::RwLock;
use recon_core::{
    BaseEntity, EntityId, PersistentBackend, QueryOptions, RecondbError, Relationship,
    RelationshipId, Result,
};
use std::collections::HashMap;

/// Map-backed persistent-tier double
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entities: RwLock<HashMap<EntityId, BaseEntity>>,
    relationships: RwLock<HashMap<RelationshipId, Relationship>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn put_entity(&self, entity: &BaseEntity) -> Result<()> {
        self.entities.write().insert(entity.id, entity.clone());
        Ok(())
    }

    fn get_entity(&self, id: &EntityId) -> Result<BaseEntity> {
        self.entities
            .read()
            .get(id)
            .cloned()
            .ok_or(RecondbError::NotFound(*id))
    }

    fn delete_entity(&self, id: &EntityId) -> Result<()> {
        self.entities.write().remove(id);
        Ok(())
    }

    fn contains_entity(&self, id: &EntityId) -> Result<bool> {
        Ok(self.entities.read().contains_key(id))
    }

    fn query_entities(&self, options: &QueryOptions) -> Result<Vec<BaseEntity>> {
        let candidates: Vec<BaseEntity> = self.entities.read().values().cloned().collect();
        Ok(options.apply(candidates))
    }

    fn entity_count(&self) -> Result<usize> {
        Ok(self.entities.read().len())
    }

    fn put_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.relationships
            .write()
            .insert(relationship.id, relationship.clone());
        Ok(())
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        self.relationships
            .read()
            .get(id)
            .cloned()
            .ok_or(RecondbError::RelationshipNotFound(*id))
    }

    fn delete_relationship(&self, id: &RelationshipId) -> Result<()> {
        self.relationships.write().remove(id);
        Ok(())
    }

    fn relationships_for(&self, id: &EntityId) -> Result<Vec<Relationship>> {
        let mut found: Vec<Relationship> = self
            .relationships
            .read()
            .values()
            .filter(|r| r.touches(id))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    fn list_relationships(&self) -> Result<Vec<Relationship>> {
        let mut found: Vec<Relationship> = self.relationships.read().values().cloned().collect();
        found.sort_by_key(|r| r.id);
        Ok(found)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::NewEntity;

    #[test]
    fn test_roundtrip() {
        let backend = MemoryBackend::new();
        let entity = NewEntity::new("node").into_entity(EntityId::new(), Utc::now());
        backend.put_entity(&entity).unwrap();
        assert_eq!(backend.get_entity(&entity.id).unwrap(), entity);
        assert_eq!(backend.entity_count().unwrap(), 1);

        backend.delete_entity(&entity.id).unwrap();
        assert!(backend.get_entity(&entity.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_applies_options() {
        let backend = MemoryBackend::new();
        for entity_type in ["node", "node", "event"] {
            let entity = NewEntity::new(entity_type).into_entity(EntityId::new(), Utc::now());
            backend.put_entity(&entity).unwrap();
        }
        let nodes = backend
            .query_entities(&QueryOptions::new().with_type("node"))
            .unwrap();
        assert_eq!(nodes.len(), 2);
    }
}
