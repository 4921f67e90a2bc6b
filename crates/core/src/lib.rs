//! Core types and traits for recondb
//!
//! This crate defines the foundational types used throughout the system:
//! - EntityId / RelationshipId: Unique record identifiers
//! - BaseEntity: The record shape every tier stores
//! - Relationship: Typed edges between entities
//! - QueryOptions: The shared query/cache-key vocabulary
//! - StoreEvent: Lifecycle and migration events
//! - Transaction: Ordered steps with compensating rollback
//! - RecondbError: Error type hierarchy
//! - PersistentBackend: The durable-tier adapter seam

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod events;
pub mod query;
pub mod traits;
pub mod transaction;
pub mod types;

// Re-export commonly used types and traits
pub use error::{RecondbError, Result, StorageResult};
pub use events::{MigrationLogEntry, StoreEvent};
pub use query::{QueryOptions, SortField, SortOrder};
pub use traits::PersistentBackend;
pub use transaction::{Transaction, TransactionStatus};
pub use types::{
    BaseEntity, Direction, EntityId, EntityPatch, NewEntity, NewRelationship, Relationship,
    RelationshipId,
};
