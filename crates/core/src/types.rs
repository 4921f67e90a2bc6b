//! Record types for the store
//!
//! This module defines the foundational record shapes:
//! - EntityId / RelationshipId: UUID newtypes
//! - BaseEntity: the record every tier stores
//! - NewEntity / EntityPatch: partial inputs for create and update
//! - Relationship / NewRelationship: typed edges between entities

use crate::error::{RecondbError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity
///
/// An EntityId is a wrapper around a UUID v4. Ids are globally unique
/// across all entity types; the store never reuses an id after deletion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new random EntityId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an EntityId from a string representation
    ///
    /// Accepts standard UUID format (with or without hyphens).
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a relationship
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RelationshipId(Uuid);

impl RelationshipId {
    /// Create a new random RelationshipId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a RelationshipId from a string representation
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The record shape shared by every tier
///
/// The in-memory tier owns the authoritative copy; the cache and the
/// search index only ever hold derived copies.
///
/// # Invariants
///
/// - `id` is globally unique across all entity types
/// - `updated_at` is monotonically non-decreasing and is rewritten on
///   every mutation, including migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEntity {
    /// Unique identifier
    pub id: EntityId,
    /// Type discriminator (e.g. "node", "event", "report")
    pub entity_type: String,
    /// Creation timestamp, assigned by the store
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp, rewritten on every mutation
    pub updated_at: DateTime<Utc>,
    /// Originator of the record
    pub created_by: String,
    /// Tags, used for filtering and for search boosting
    pub tags: BTreeSet<String>,
    /// Open key/value payload
    pub metadata: Map<String, Value>,
}

impl BaseEntity {
    /// Rewrite `updated_at`, keeping it monotonically non-decreasing
    ///
    /// If the wall clock moved backwards, the previous timestamp is kept.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Merge a patch into this entity and bump `updated_at`
    pub fn apply_patch(&mut self, patch: &EntityPatch) {
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(created_by) = &patch.created_by {
            self.created_by = created_by.clone();
        }
        for (key, value) in &patch.metadata {
            if value.is_null() {
                self.metadata.remove(key);
            } else {
                self.metadata.insert(key.clone(), value.clone());
            }
        }
        self.touch();
    }
}

/// Input for creating an entity
///
/// The store assigns the id and timestamps; everything else comes from
/// the caller. `entity_type` is required and must be non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntity {
    /// Type discriminator for the new entity
    pub entity_type: String,
    /// Originator; defaults to "system" when absent
    pub created_by: Option<String>,
    /// Initial tags
    pub tags: BTreeSet<String>,
    /// Initial payload
    pub metadata: Map<String, Value>,
}

impl NewEntity {
    /// Start a new entity of the given type
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    /// Builder: add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder: set a metadata field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder: set the originator
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Check the required attributes
    ///
    /// # Errors
    ///
    /// Returns `RecondbError::Validation` when `entity_type` is empty or
    /// whitespace-only.
    pub fn validate(&self) -> Result<()> {
        if self.entity_type.trim().is_empty() {
            return Err(RecondbError::validation("entity_type must not be empty"));
        }
        Ok(())
    }

    /// Consume the input and produce a full entity
    ///
    /// Does not validate; call [`NewEntity::validate`] first.
    pub fn into_entity(self, id: EntityId, now: DateTime<Utc>) -> BaseEntity {
        BaseEntity {
            id,
            entity_type: self.entity_type,
            created_at: now,
            updated_at: now,
            created_by: self.created_by.unwrap_or_else(|| "system".to_string()),
            tags: self.tags,
            metadata: self.metadata,
        }
    }
}

/// Partial update for an entity
///
/// Field semantics:
/// - `tags`: `Some` replaces the whole tag set, `None` leaves it alone
/// - `metadata`: merged key by key; a JSON `null` value removes the key
/// - `created_by`: `Some` overrides the originator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    /// Replacement tag set, when present
    pub tags: Option<BTreeSet<String>>,
    /// Metadata merges; a null value removes the key
    pub metadata: Map<String, Value>,
    /// Originator override, when present
    pub created_by: Option<String>,
}

impl EntityPatch {
    /// Start an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a metadata field
    pub fn set_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder: remove a metadata field
    pub fn remove_field(mut self, key: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), Value::Null);
        self
    }

    /// Builder: replace the tag set
    pub fn replace_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = Some(tags.into_iter().collect());
        self
    }

    /// True when the patch would not change anything
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.metadata.is_empty() && self.created_by.is_none()
    }
}

/// Edge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source → target only
    Unidirectional,
    /// Both directions
    Bidirectional,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Unidirectional
    }
}

/// A typed edge between two entities
///
/// A relationship whose endpoints do not resolve to stored entities is a
/// data-integrity error at creation time, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier
    pub id: RelationshipId,
    /// Edge label (e.g. "communicates_with", "member_of")
    pub rel_type: String,
    /// Source endpoint
    pub source_id: EntityId,
    /// Target endpoint
    pub target_id: EntityId,
    /// Edge direction
    pub direction: Direction,
    /// Connection strength, 0–100
    pub strength: u8,
    /// Assessment confidence, 0–100
    pub confidence: u8,
    /// Tags
    pub tags: BTreeSet<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// True when the relationship touches the given entity
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source_id == id || &self.target_id == id
    }
}

/// Input for creating a relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    /// Edge label
    pub rel_type: String,
    /// Source endpoint; must resolve to a stored entity
    pub source_id: EntityId,
    /// Target endpoint; must resolve to a stored entity
    pub target_id: EntityId,
    /// Edge direction
    pub direction: Direction,
    /// Connection strength, 0–100
    pub strength: u8,
    /// Assessment confidence, 0–100
    pub confidence: u8,
    /// Tags
    pub tags: BTreeSet<String>,
}

impl NewRelationship {
    /// Start a new relationship between two entities
    pub fn new(rel_type: impl Into<String>, source_id: EntityId, target_id: EntityId) -> Self {
        Self {
            rel_type: rel_type.into(),
            source_id,
            target_id,
            direction: Direction::default(),
            strength: 50,
            confidence: 50,
            tags: BTreeSet::new(),
        }
    }

    /// Builder: set the direction
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Builder: set strength and confidence
    pub fn with_scores(mut self, strength: u8, confidence: u8) -> Self {
        self.strength = strength;
        self.confidence = confidence;
        self
    }

    /// Check the required attributes and scalar ranges
    ///
    /// # Errors
    ///
    /// Returns `RecondbError::Validation` when the label is empty or a
    /// scalar exceeds 100. Endpoint resolution is checked by the
    /// orchestrator, which can consult the persistent tier.
    pub fn validate(&self) -> Result<()> {
        if self.rel_type.trim().is_empty() {
            return Err(RecondbError::validation("rel_type must not be empty"));
        }
        if self.strength > 100 {
            return Err(RecondbError::validation(format!(
                "strength must be 0-100, got {}",
                self.strength
            )));
        }
        if self.confidence > 100 {
            return Err(RecondbError::validation(format!(
                "confidence must be 0-100, got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Consume the input and produce a full relationship
    pub fn into_relationship(self, id: RelationshipId, now: DateTime<Utc>) -> Relationship {
        Relationship {
            id,
            rel_type: self.rel_type,
            source_id: self.source_id,
            target_id: self.target_id,
            direction: self.direction,
            strength: self.strength,
            confidence: self.confidence,
            tags: self.tags,
            created_at: now,
        }
    }
}
