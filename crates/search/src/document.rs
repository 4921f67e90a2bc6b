//! Per-entity projection stored by the index
//!
//! An `IndexedDocument` is created, replaced, and deleted in lock-step
//! with its entity, asynchronously via lifecycle events. It keeps the
//! raw field text for highlighting alongside the normalized token
//! sequence for scoring and phrase matching.

use crate::schema::{SearchSchema, TAGS_FIELD};
use crate::tokenizer::tokenize;
use recon_core::{BaseEntity, EntityId};
use serde_json::Value;
use std::collections::HashMap;

/// One field's text in both raw and tokenized form
#[derive(Debug, Clone, PartialEq)]
pub struct FieldText {
    /// Original text, for snippet extraction
    pub raw: String,
    /// Normalized, stemmed token sequence, for scoring and phrases
    pub tokens: Vec<String>,
}

/// Searchable projection of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    /// Entity id
    pub id: EntityId,
    /// Entity type, used to resolve the schema
    pub entity_type: String,
    /// field name → text
    pub fields: HashMap<String, FieldText>,
    /// Total tokens across all fields; the denominator for
    /// term-frequency normalization
    pub token_count: usize,
}

/// Flatten a metadata value into searchable text
///
/// Strings pass through; numbers and booleans stringify; arrays of
/// scalars join with spaces. Objects and nulls carry no text.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        Value::Null | Value::Object(_) => None,
    }
}

impl IndexedDocument {
    /// Project an entity through the schema
    ///
    /// Fields the schema does not declare are invisible to search.
    pub fn project(entity: &BaseEntity, schema: &SearchSchema) -> Self {
        let mut fields = HashMap::new();
        let mut token_count = 0;

        for field in schema.fields_for(&entity.entity_type) {
            let Some(raw) = entity.metadata.get(field).and_then(value_text) else {
                continue;
            };
            let tokens = tokenize(&raw);
            if tokens.is_empty() {
                continue;
            }
            token_count += tokens.len();
            fields.insert(field.clone(), FieldText { raw, tokens });
        }

        if !entity.tags.is_empty() {
            let raw = entity.tags.iter().cloned().collect::<Vec<_>>().join(" ");
            let tokens = tokenize(&raw);
            if !tokens.is_empty() {
                token_count += tokens.len();
                fields.insert(TAGS_FIELD.to_string(), FieldText { raw, tokens });
            }
        }

        Self {
            id: entity.id,
            entity_type: entity.entity_type.clone(),
            fields,
            token_count,
        }
    }

    /// True when the projection carries no searchable text
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::NewEntity;
    use serde_json::json;

    #[test]
    fn test_projection_follows_schema() {
        let entity = NewEntity::new("report")
            .with_field("title", "Security report")
            .with_field("secret_field", "should not be indexed")
            .into_entity(EntityId::new(), Utc::now());
        let schema = SearchSchema::empty().with_type("report", ["title"]);

        let doc = IndexedDocument::project(&entity, &schema);
        assert!(doc.fields.contains_key("title"));
        assert!(!doc.fields.contains_key("secret_field"));
        assert_eq!(doc.token_count, 2);
    }

    #[test]
    fn test_tags_always_indexed() {
        let entity = NewEntity::new("node")
            .with_tag("osint")
            .into_entity(EntityId::new(), Utc::now());
        let doc = IndexedDocument::project(&entity, &SearchSchema::empty());
        assert!(doc.fields.contains_key(TAGS_FIELD));
        assert_eq!(doc.fields[TAGS_FIELD].tokens, vec!["osint"]);
    }

    #[test]
    fn test_scalar_and_array_values() {
        let entity = NewEntity::new("node")
            .with_field("name", "relay-7")
            .with_field("aliases", json!(["ghost", "shade"]))
            .with_field("hops", 4)
            .with_field("nested", json!({"inner": "hidden"}))
            .into_entity(EntityId::new(), Utc::now());
        let schema = SearchSchema::empty().with_type("node", ["name", "aliases", "hops", "nested"]);

        let doc = IndexedDocument::project(&entity, &schema);
        assert_eq!(doc.fields["aliases"].tokens, vec!["ghost", "shade"]);
        assert_eq!(doc.fields["hops"].raw, "4");
        assert!(!doc.fields.contains_key("nested"));
    }

    #[test]
    fn test_empty_projection() {
        let entity = NewEntity::new("node").into_entity(EntityId::new(), Utc::now());
        let doc = IndexedDocument::project(&entity, &SearchSchema::default());
        assert!(doc.is_empty());
        assert_eq!(doc.token_count, 0);
    }
}
