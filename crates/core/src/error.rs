//! Error types for recondb
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{EntityId, RelationshipId};
use std::io;
use thiserror::Error;

/// Result type alias for recondb operations
pub type Result<T> = std::result::Result<T, RecondbError>;

/// Result type returned across the public storage API boundary
///
/// Nothing escapes the public API as a panic; every call returns a value
/// the caller must inspect.
pub type StorageResult<T> = Result<T>;

/// Error types for the store
#[derive(Debug, Error)]
pub enum RecondbError {
    /// Malformed or missing required entity fields; rejected before any
    /// tier is touched
    #[error("validation failed: {0}")]
    Validation(String),

    /// Entity id absent at the tier queried
    ///
    /// The orchestrator treats this as a miss signal and falls through to
    /// the next tier; only on the final tier does it become the
    /// caller-visible result.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Relationship id absent
    #[error("relationship not found: {0}")]
    RelationshipNotFound(RelationshipId),

    /// I/O failure at the persistent tier
    #[error("storage error: {0}")]
    Storage(String),

    /// A step inside a transaction failed; prior steps were rolled back
    #[error("transaction step '{step}' failed: {message}")]
    Transaction {
        /// Label of the failing step
        step: String,
        /// Underlying failure
        message: String,
    },

    /// Another migration holds the global migration mutex
    #[error("a migration is already in progress")]
    MigrationInProgress,

    /// One operation on one entity failed during migration
    ///
    /// Recorded in the migration log; does not halt the batch.
    #[error("migration operation '{operation}' failed for entity {entity}: {message}")]
    MigrationOperation {
        /// Entity being migrated
        entity: EntityId,
        /// Operation label
        operation: String,
        /// Underlying failure
        message: String,
    },

    /// Malformed query or search request
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl RecondbError {
    /// Construct a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        RecondbError::Validation(message.into())
    }

    /// Construct a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        RecondbError::Storage(message.into())
    }

    /// True when this error is a tier-miss signal
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RecondbError::NotFound(_) | RecondbError::RelationshipNotFound(_)
        )
    }
}

impl From<io::Error> for RecondbError {
    fn from(e: io::Error) -> Self {
        RecondbError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RecondbError {
    fn from(e: serde_json::Error) -> Self {
        RecondbError::Storage(format!("serialization: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_validation() {
        let err = RecondbError::validation("entity_type must not be empty");
        assert!(err.to_string().contains("validation failed"));
        assert!(err.to_string().contains("entity_type"));
    }

    #[test]
    fn test_display_not_found() {
        let id = EntityId::new();
        let err = RecondbError::NotFound(id);
        assert!(err.to_string().contains("entity not found"));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_display_transaction() {
        let err = RecondbError::Transaction {
            step: "persist".to_string(),
            message: "disk write failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("persist"));
        assert!(msg.contains("disk write failed"));
    }

    #[test]
    fn test_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: RecondbError = io_err.into();
        assert!(matches!(err, RecondbError::Storage(_)));
    }

    #[test]
    fn test_from_serde() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{broken");
        let err: RecondbError = parse.unwrap_err().into();
        assert!(matches!(err, RecondbError::Storage(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(RecondbError::NotFound(EntityId::new()).is_not_found());
        assert!(RecondbError::RelationshipNotFound(RelationshipId::new()).is_not_found());
        assert!(!RecondbError::storage("boom").is_not_found());
    }
}
