//! Explicit searchable-field schema
//!
//! Which metadata fields of which entity type are text-indexable is
//! declared here rather than discovered by introspecting record keys at
//! runtime. Types without a declaration fall back to the schema's
//! default field list. Tag text is always indexed under the reserved
//! [`TAGS_FIELD`] name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved field name under which entity tags are indexed
pub const TAGS_FIELD: &str = "tags";

/// Per-entity-type searchable-field declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSchema {
    /// entity type → indexable metadata fields
    fields_by_type: HashMap<String, Vec<String>>,
    /// Fallback fields for undeclared types
    default_fields: Vec<String>,
}

impl Default for SearchSchema {
    /// Field names the intelligence payloads actually carry
    fn default() -> Self {
        Self {
            fields_by_type: HashMap::new(),
            default_fields: [
                "name",
                "title",
                "description",
                "summary",
                "content",
                "notes",
                "location",
                "source",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl SearchSchema {
    /// Schema with no declarations and no default fields
    pub fn empty() -> Self {
        Self {
            fields_by_type: HashMap::new(),
            default_fields: Vec::new(),
        }
    }

    /// Builder: declare the indexable fields of a type
    pub fn with_type<I, S>(mut self, entity_type: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_by_type.insert(
            entity_type.into(),
            fields.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Builder: replace the fallback field list
    pub fn with_default_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Indexable fields for a type, falling back to the default list
    pub fn fields_for(&self, entity_type: &str) -> &[String] {
        self.fields_by_type
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fallback() {
        let schema = SearchSchema::default();
        assert!(schema.fields_for("anything").contains(&"name".to_string()));
    }

    #[test]
    fn test_declared_type_overrides_default() {
        let schema = SearchSchema::default().with_type("report", ["title", "body"]);
        assert_eq!(schema.fields_for("report"), ["title", "body"]);
        assert!(schema.fields_for("node").contains(&"name".to_string()));
    }

    #[test]
    fn test_empty_schema() {
        let schema = SearchSchema::empty();
        assert!(schema.fields_for("report").is_empty());
    }
}
