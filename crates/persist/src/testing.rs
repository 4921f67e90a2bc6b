//! Failure injection for atomicity and rollback tests
//!
//! `FailingBackend` wraps any backend and fails exactly one write: the
//! (n+1)th, counted across entity and relationship puts and deletes.
//! Later writes succeed again, which models a transient I/O fault and
//! lets compensating rollback writes land. Reads always pass through.

use recon_core::{
    BaseEntity, EntityId, PersistentBackend, QueryOptions, RecondbError, Relationship,
    RelationshipId, Result,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend wrapper that fails a single chosen write
pub struct FailingBackend {
    inner: Arc<dyn PersistentBackend>,
    /// Writes remaining before the injected failure; negative = disarmed
    remaining: AtomicI64,
    writes: AtomicUsize,
}

impl FailingBackend {
    /// Wrap a backend with the failure disarmed
    pub fn new(inner: Arc<dyn PersistentBackend>) -> Self {
        Self {
            inner,
            remaining: AtomicI64::new(-1),
            writes: AtomicUsize::new(0),
        }
    }

    /// Arm the injection: the next write after `n` successful ones fails
    ///
    /// `fail_after_writes(0)` fails the very next write.
    pub fn fail_after_writes(&self, n: i64) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    /// Total writes attempted through this wrapper
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, label: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        // fetch_sub returns the previous value; 0 means this write is the
        // armed one. Values below zero stay disarmed.
        if self.remaining.load(Ordering::SeqCst) >= 0
            && self.remaining.fetch_sub(1, Ordering::SeqCst) == 0
        {
            return Err(RecondbError::storage(format!(
                "injected failure during {}",
                label
            )));
        }
        Ok(())
    }
}

impl PersistentBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn put_entity(&self, entity: &BaseEntity) -> Result<()> {
        self.check_write("put_entity")?;
        self.inner.put_entity(entity)
    }

    fn get_entity(&self, id: &EntityId) -> Result<BaseEntity> {
        self.inner.get_entity(id)
    }

    fn delete_entity(&self, id: &EntityId) -> Result<()> {
        self.check_write("delete_entity")?;
        self.inner.delete_entity(id)
    }

    fn contains_entity(&self, id: &EntityId) -> Result<bool> {
        self.inner.contains_entity(id)
    }

    fn query_entities(&self, options: &QueryOptions) -> Result<Vec<BaseEntity>> {
        self.inner.query_entities(options)
    }

    fn entity_count(&self) -> Result<usize> {
        self.inner.entity_count()
    }

    fn put_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.check_write("put_relationship")?;
        self.inner.put_relationship(relationship)
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Relationship> {
        self.inner.get_relationship(id)
    }

    fn delete_relationship(&self, id: &RelationshipId) -> Result<()> {
        self.check_write("delete_relationship")?;
        self.inner.delete_relationship(id)
    }

    fn relationships_for(&self, id: &EntityId) -> Result<Vec<Relationship>> {
        self.inner.relationships_for(id)
    }

    fn list_relationships(&self) -> Result<Vec<Relationship>> {
        self.inner.list_relationships()
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}
