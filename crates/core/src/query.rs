//! Query options shared by every tier
//!
//! The same `QueryOptions` value drives the in-memory tier, the persistent
//! tier, and cache-key derivation, so identical options must produce
//! identical cache keys. `cache_key()` canonicalizes set-valued filters to
//! guarantee that.

use crate::types::BaseEntity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field a query result is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Creation timestamp (default)
    CreatedAt,
    /// Last-mutation timestamp
    UpdatedAt,
    /// Type discriminator, lexicographic
    EntityType,
}

impl Default for SortField {
    fn default() -> Self {
        SortField::CreatedAt
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first (default)
    Ascending,
    /// Largest first
    Descending,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Ascending
    }
}

/// Filters, pagination, and sort order for entity queries
///
/// Filter semantics:
/// - `types`: OR within the set; empty means all types
/// - `tags`: OR within the set; empty means no tag constraint
/// - `created_after` / `created_before`: inclusive bounds on `created_at`
/// - `fields`: equality on metadata keys, AND across entries
///
/// `force_refresh` bypasses the cache on the read path; it is a routing
/// directive, not a selector, so it does not participate in the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Type filter (OR semantics, empty = all)
    pub types: Vec<String>,
    /// Tag filter (OR semantics, empty = none)
    pub tags: Vec<String>,
    /// Inclusive lower bound on `created_at`
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub created_before: Option<DateTime<Utc>>,
    /// Metadata equality filters (AND across entries)
    pub fields: BTreeMap<String, Value>,
    /// Maximum number of results after sorting
    pub limit: Option<usize>,
    /// Number of results skipped after sorting
    pub offset: usize,
    /// Sort field
    pub sort_by: SortField,
    /// Sort direction
    pub sort_order: SortOrder,
    /// Bypass the cache on the read path
    pub force_refresh: bool,
}

impl QueryOptions {
    /// Start an empty query (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a type to the type filter
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.types.push(entity_type.into());
        self
    }

    /// Builder: add a tag to the tag filter
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Builder: add a metadata equality filter
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder: set the result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Builder: set the result offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: set sort field and direction
    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }

    /// Builder: bypass the cache
    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// True when the type filter covers the given type
    ///
    /// An empty filter covers every type. Used by the cache layer to
    /// decide which query entries a write invalidates.
    pub fn covers_type(&self, entity_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == entity_type)
    }

    /// True when the entity passes every filter
    pub fn matches(&self, entity: &BaseEntity) -> bool {
        if !self.covers_type(&entity.entity_type) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entity.tags.contains(t)) {
            return false;
        }
        if let Some(after) = self.created_after {
            if entity.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entity.created_at > before {
                return false;
            }
        }
        for (key, expected) in &self.fields {
            if entity.metadata.get(key) != Some(expected) {
                return false;
            }
        }
        true
    }

    /// Filter, sort, and paginate a candidate set
    ///
    /// Sorting always tie-breaks on id so identical options produce
    /// identical orderings regardless of map iteration order.
    pub fn apply(&self, entities: Vec<BaseEntity>) -> Vec<BaseEntity> {
        let mut matched: Vec<BaseEntity> =
            entities.into_iter().filter(|e| self.matches(e)).collect();

        matched.sort_by(|a, b| {
            let ordering = match self.sort_by {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::EntityType => a.entity_type.cmp(&b.entity_type),
            };
            let ordering = ordering.then(a.id.cmp(&b.id));
            match self.sort_order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        let skipped = matched.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => skipped.take(limit).collect(),
            None => skipped.collect(),
        }
    }

    /// Canonical cache key for these options
    ///
    /// Set-valued filters are sorted and deduplicated so that logically
    /// identical options always map to the same key. `force_refresh` is
    /// excluded.
    pub fn cache_key(&self) -> String {
        let mut types = self.types.clone();
        types.sort();
        types.dedup();
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();

        format!(
            "q|types={}|tags={}|after={}|before={}|fields={}|sort={:?}:{:?}|limit={}|offset={}",
            types.join(","),
            tags.join(","),
            self.created_after
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            self.created_before
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            fields.join(";"),
            self.sort_by,
            self.sort_order,
            self.limit.map(|l| l.to_string()).unwrap_or_default(),
            self.offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, NewEntity};
    use serde_json::json;

    fn entity(entity_type: &str, tags: &[&str]) -> BaseEntity {
        let mut new = NewEntity::new(entity_type);
        for tag in tags {
            new = new.with_tag(*tag);
        }
        new.into_entity(EntityId::new(), Utc::now())
    }

    #[test]
    fn test_empty_options_match_everything() {
        let options = QueryOptions::new();
        assert!(options.matches(&entity("node", &[])));
        assert!(options.matches(&entity("report", &["osint"])));
    }

    #[test]
    fn test_type_filter_or_semantics() {
        let options = QueryOptions::new().with_type("node").with_type("event");
        assert!(options.matches(&entity("node", &[])));
        assert!(options.matches(&entity("event", &[])));
        assert!(!options.matches(&entity("report", &[])));
    }

    #[test]
    fn test_tag_filter_or_semantics() {
        let options = QueryOptions::new().with_tag("alpha").with_tag("bravo");
        assert!(options.matches(&entity("node", &["alpha"])));
        assert!(options.matches(&entity("node", &["bravo", "extra"])));
        assert!(!options.matches(&entity("node", &["charlie"])));
    }

    #[test]
    fn test_field_filter_and_semantics() {
        let options = QueryOptions::new()
            .with_field("status", "active")
            .with_field("level", 3);
        let mut matching = entity("node", &[]);
        matching.metadata.insert("status".into(), json!("active"));
        matching.metadata.insert("level".into(), json!(3));
        let mut partial = matching.clone();
        partial.metadata.insert("level".into(), json!(4));

        assert!(options.matches(&matching));
        assert!(!options.matches(&partial));
    }

    #[test]
    fn test_date_range_inclusive() {
        let e = entity("node", &[]);
        let options = QueryOptions {
            created_after: Some(e.created_at),
            created_before: Some(e.created_at),
            ..Default::default()
        };
        assert!(options.matches(&e));
    }

    #[test]
    fn test_cache_key_canonical_across_ordering() {
        let a = QueryOptions::new()
            .with_type("node")
            .with_type("event")
            .with_tag("x")
            .with_tag("y");
        let b = QueryOptions::new()
            .with_type("event")
            .with_type("node")
            .with_tag("y")
            .with_tag("x");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_distinguishes_filters() {
        let a = QueryOptions::new().with_type("node");
        let b = QueryOptions::new().with_type("event");
        assert_ne!(a.cache_key(), b.cache_key());

        let c = QueryOptions::new().with_type("node").with_limit(5);
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_force_refresh_not_in_key() {
        let a = QueryOptions::new().with_type("node");
        let b = QueryOptions::new().with_type("node").force_refresh();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_apply_sorts_and_paginates() {
        let mut entities = Vec::new();
        for i in 0..5 {
            let mut e = entity("node", &[]);
            e.created_at = Utc::now() + chrono::Duration::seconds(i);
            entities.push(e);
        }
        let first = entities[0].clone();

        let options = QueryOptions::new().with_limit(2).with_offset(0);
        let page = options.apply(entities.clone());
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, first.id);

        let descending = QueryOptions::new().sorted_by(SortField::CreatedAt, SortOrder::Descending);
        let all = descending.apply(entities);
        assert_eq!(all.last().unwrap().id, first.id);
    }

    #[test]
    fn test_covers_type() {
        assert!(QueryOptions::new().covers_type("anything"));
        let options = QueryOptions::new().with_type("node");
        assert!(options.covers_type("node"));
        assert!(!options.covers_type("event"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Reordering or duplicating set-valued filters never
            /// changes the cache key.
            #[test]
            fn prop_cache_key_canonical(
                mut types in proptest::collection::vec("[a-z]{1,5}", 0..4),
                mut tags in proptest::collection::vec("[a-z]{1,5}", 0..4),
            ) {
                let a = QueryOptions {
                    types: types.clone(),
                    tags: tags.clone(),
                    ..Default::default()
                };
                types.reverse();
                tags.reverse();
                types.extend(a.types.iter().cloned());
                let b = QueryOptions { types, tags, ..Default::default() };
                prop_assert_eq!(a.cache_key(), b.cache_key());
            }
        }
    }
}
