//! Adapter trait for the persistent tier
//!
//! The durable tier sits behind this seam so implementations can be
//! swapped: a file-backed store in production, an in-memory double in
//! tests, a failure-injecting wrapper for atomicity tests.

use crate::error::Result;
use crate::query::QueryOptions;
use crate::types::{BaseEntity, EntityId, Relationship, RelationshipId};

/// Durable key/value-per-record backing store
///
/// # Contract
///
/// - A record write is a single logical put: implementations must never
///   leave a partially written record visible, even across a crash.
/// - Any I/O failure surfaces as `RecondbError::Storage` with the
///   underlying cause in the message.
/// - `query_entities` pushes the type filter down to whatever secondary
///   index the implementation keeps and post-filters everything else
///   client-side. Only the type filter is indexed; secondary indices are
///   expensive and type is the highest-cardinality filter.
/// - Reads of absent ids return `RecondbError::NotFound` /
///   `RecondbError::RelationshipNotFound`, which callers treat as a miss
///   signal, not a hard failure.
pub trait PersistentBackend: Send + Sync {
    /// Implementation name, for logs and stats
    fn name(&self) -> &'static str;

    /// Write or overwrite one entity record
    fn put_entity(&self, entity: &BaseEntity) -> Result<()>;

    /// Read one entity record
    fn get_entity(&self, id: &EntityId) -> Result<BaseEntity>;

    /// Remove one entity record
    ///
    /// Removing an absent id is not an error; compensations delete
    /// blindly during rollback.
    fn delete_entity(&self, id: &EntityId) -> Result<()>;

    /// True when the entity record exists
    fn contains_entity(&self, id: &EntityId) -> Result<bool>;

    /// Query entity records
    ///
    /// The type filter resolves through the backend's type index; tag,
    /// date, and field filters apply client-side after the indexed scan.
    fn query_entities(&self, options: &QueryOptions) -> Result<Vec<BaseEntity>>;

    /// Number of entity records
    fn entity_count(&self) -> Result<usize>;

    /// Write or overwrite one relationship record
    fn put_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Read one relationship record
    fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship>;

    /// Remove one relationship record; absent ids are not an error
    fn delete_relationship(&self, id: &RelationshipId) -> Result<()>;

    /// All relationships touching the given entity
    fn relationships_for(&self, id: &EntityId) -> Result<Vec<Relationship>>;

    /// Every stored relationship, for hydrating the memory tier on open
    fn list_relationships(&self) -> Result<Vec<Relationship>>;

    /// Flush any buffered state to durable storage
    fn flush(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecondbError;
    use crate::types::NewEntity;
    use chrono::Utc;

    /// Minimal backend double proving the trait is object-safe and that
    /// error-path plumbing composes.
    struct BrokenBackend;

    impl PersistentBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn put_entity(&self, _: &BaseEntity) -> Result<()> {
            Err(RecondbError::storage("disk write failed"))
        }
        fn get_entity(&self, id: &EntityId) -> Result<BaseEntity> {
            Err(RecondbError::NotFound(*id))
        }
        fn delete_entity(&self, _: &EntityId) -> Result<()> {
            Err(RecondbError::storage("disk write failed"))
        }
        fn contains_entity(&self, _: &EntityId) -> Result<bool> {
            Err(RecondbError::storage("disk read failed"))
        }
        fn query_entities(&self, _: &QueryOptions) -> Result<Vec<BaseEntity>> {
            Err(RecondbError::storage("disk read failed"))
        }
        fn entity_count(&self) -> Result<usize> {
            Ok(0)
        }
        fn put_relationship(&self, _: &Relationship) -> Result<()> {
            Err(RecondbError::storage("disk write failed"))
        }
        fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
            Err(RecondbError::RelationshipNotFound(*id))
        }
        fn delete_relationship(&self, _: &RelationshipId) -> Result<()> {
            Err(RecondbError::storage("disk write failed"))
        }
        fn relationships_for(&self, _: &EntityId) -> Result<Vec<Relationship>> {
            Ok(vec![])
        }
        fn list_relationships(&self) -> Result<Vec<Relationship>> {
            Ok(vec![])
        }
        fn flush(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_trait_object_safety() {
        let backend: Box<dyn PersistentBackend> = Box::new(BrokenBackend);
        assert_eq!(backend.name(), "broken");
        let entity = NewEntity::new("node").into_entity(EntityId::new(), Utc::now());
        assert!(backend.put_entity(&entity).is_err());
        assert!(backend.get_entity(&entity.id).unwrap_err().is_not_found());
    }
}
