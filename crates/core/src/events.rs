//! Lifecycle and migration events
//!
//! Every successful mutation publishes one event after its transaction
//! commits. The search index is one subscriber; external observers may be
//! others. Event delivery is decoupled from the write path, so consumers
//! observe a bounded staleness window rather than transactional updates.

use crate::types::{BaseEntity, EntityId, EntityPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One migration-log line: a single operation applied to a single entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationLogEntry {
    /// Plan that produced this entry
    pub plan_id: String,
    /// Entity the operation was applied to
    pub entity_id: EntityId,
    /// Operation label (e.g. "add_field(status)")
    pub operation: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Error detail when `success` is false
    pub error: Option<String>,
    /// When the operation was applied
    pub applied_at: DateTime<Utc>,
}

/// Events published by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreEvent {
    /// An entity was created
    EntityCreated {
        /// Full snapshot of the new entity
        entity: BaseEntity,
    },
    /// An entity was updated
    EntityUpdated {
        /// Full post-update snapshot
        entity: BaseEntity,
        /// The patch that was applied
        delta: EntityPatch,
    },
    /// An entity was deleted
    EntityDeleted {
        /// Id of the removed entity
        id: EntityId,
        /// Final snapshot before removal
        entity: BaseEntity,
    },
    /// A migration run began
    MigrationStarted {
        /// Plan id
        plan_id: String,
        /// Target schema version
        version: String,
    },
    /// A migration run finished successfully
    MigrationCompleted {
        /// Plan id
        plan_id: String,
        /// Entities processed
        processed: usize,
        /// Entities that failed their transform
        failed: usize,
    },
    /// A migration run failed and was rolled back
    MigrationFailed {
        /// Plan id
        plan_id: String,
        /// Failure detail
        error: String,
    },
    /// One migration operation was applied to one entity
    MigrationLog {
        /// The log line
        entry: MigrationLogEntry,
    },
}

impl StoreEvent {
    /// Wire name of the event, matching the public event vocabulary
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::EntityCreated { .. } => "entity:created",
            StoreEvent::EntityUpdated { .. } => "entity:updated",
            StoreEvent::EntityDeleted { .. } => "entity:deleted",
            StoreEvent::MigrationStarted { .. } => "migration:start",
            StoreEvent::MigrationCompleted { .. } => "migration:complete",
            StoreEvent::MigrationFailed { .. } => "migration:failed",
            StoreEvent::MigrationLog { .. } => "migration:log",
        }
    }

    /// Id of the entity this event concerns, when it concerns one
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            StoreEvent::EntityCreated { entity } => Some(entity.id),
            StoreEvent::EntityUpdated { entity, .. } => Some(entity.id),
            StoreEvent::EntityDeleted { id, .. } => Some(*id),
            _ => None,
        }
    }
}
