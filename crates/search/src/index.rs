//! Inverted index with a version watermark
//!
//! Term → (entity → per-field term frequency) postings plus the stored
//! document projections. Consistency with the entity store is eventual:
//! updates arrive via lifecycle events, and the version watermark lets
//! callers wait for the index to catch up instead of racing on event
//! timing.

use crate::document::IndexedDocument;
use crate::schema::SearchSchema;
use dashmap::DashMap;
use recon_core::{BaseEntity, EntityId};
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-document hit statistics for one term: field → term frequency
pub type FieldHits = FxHashMap<String, u32>;

/// Counters for the search tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Documents currently indexed
    pub documents: usize,
    /// Distinct terms in the postings map
    pub terms: usize,
}

/// Reactive inverted index over entity projections
pub struct SearchIndex {
    schema: SearchSchema,
    /// term → (entity → field hits)
    postings: DashMap<String, FxHashMap<EntityId, FieldHits>>,
    /// entity → stored projection
    documents: DashMap<EntityId, IndexedDocument>,
    /// Bumped on every mutation; lets callers observe catch-up
    version: AtomicU64,
}

impl SearchIndex {
    /// Create an empty index with the given schema
    pub fn new(schema: SearchSchema) -> Self {
        Self {
            schema,
            postings: DashMap::new(),
            documents: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    /// The schema documents are projected through
    pub fn schema(&self) -> &SearchSchema {
        &self.schema
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Index (or reindex) an entity
    ///
    /// An already-indexed entity is removed first, so updates follow the
    /// remove-then-reindex contract and term frequencies never
    /// double-count.
    pub fn index_entity(&self, entity: &BaseEntity) {
        if self.documents.contains_key(&entity.id) {
            self.remove_entity(&entity.id);
        }

        let doc = IndexedDocument::project(entity, &self.schema);
        if doc.is_empty() {
            // Nothing searchable; still counts as a processed mutation.
            self.version.fetch_add(1, Ordering::Release);
            return;
        }

        for (field, text) in &doc.fields {
            let mut frequencies: FxHashMap<&str, u32> = FxHashMap::default();
            for token in &text.tokens {
                *frequencies.entry(token.as_str()).or_insert(0) += 1;
            }
            for (term, tf) in frequencies {
                self.postings
                    .entry(term.to_string())
                    .or_default()
                    .entry(doc.id)
                    .or_default()
                    .insert(field.clone(), tf);
            }
        }

        debug!(id = %doc.id, tokens = doc.token_count, "indexed entity");
        self.documents.insert(doc.id, doc);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Remove an entity from the index
    pub fn remove_entity(&self, id: &EntityId) {
        let Some((_, doc)) = self.documents.remove(id) else {
            self.version.fetch_add(1, Ordering::Release);
            return;
        };

        let terms: HashSet<&String> = doc
            .fields
            .values()
            .flat_map(|text| text.tokens.iter())
            .collect();

        for term in terms {
            let emptied = match self.postings.get_mut(term) {
                Some(mut entry) => {
                    entry.remove(id);
                    entry.is_empty()
                }
                None => false,
            };
            if emptied {
                self.postings.remove(term);
            }
        }

        debug!(id = %id, "removed entity from index");
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Drop all postings and documents
    pub fn clear(&self) {
        self.postings.clear();
        self.documents.clear();
        self.version.fetch_add(1, Ordering::Release);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Postings for an exact term
    pub fn postings_for(&self, term: &str) -> Option<FxHashMap<EntityId, FieldHits>> {
        self.postings.get(term).map(|entry| entry.clone())
    }

    /// Every distinct term, for fuzzy candidate enumeration
    pub fn terms(&self) -> Vec<String> {
        self.postings.iter().map(|e| e.key().clone()).collect()
    }

    /// Stored projection for an entity
    pub fn document(&self, id: &EntityId) -> Option<IndexedDocument> {
        self.documents.get(id).map(|d| d.clone())
    }

    /// Counters for this tier
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents.len(),
            terms: self.postings.len(),
        }
    }

    // ========================================================================
    // Version watermark
    // ========================================================================

    /// Current watermark
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Wait until the watermark reaches `version`, or time out
    ///
    /// Returns true when the version was reached.
    pub fn wait_for_version(&self, version: u64, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.version.load(Ordering::Acquire) >= version {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::NewEntity;

    fn entity(text: &str) -> BaseEntity {
        NewEntity::new("report")
            .with_field("title", text)
            .into_entity(EntityId::new(), Utc::now())
    }

    fn index() -> SearchIndex {
        SearchIndex::new(SearchSchema::default())
    }

    #[test]
    fn test_index_and_lookup() {
        let index = index();
        let e = entity("security report");
        index.index_entity(&e);

        let postings = index.postings_for("security").unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[&e.id]["title"], 1);
        assert_eq!(index.stats().documents, 1);
    }

    #[test]
    fn test_term_frequency_counted_per_field() {
        let index = index();
        let e = entity("breach breach breach containment");
        index.index_entity(&e);
        let postings = index.postings_for("breach").unwrap();
        assert_eq!(postings[&e.id]["title"], 3);
    }

    #[test]
    fn test_reindex_replaces_old_terms() {
        let index = index();
        let mut e = entity("security report");
        index.index_entity(&e);

        e.metadata
            .insert("title".into(), serde_json::json!("network survey"));
        index.index_entity(&e);

        assert!(index.postings_for("security").is_none());
        assert!(index.postings_for("network").is_some());
        assert_eq!(index.stats().documents, 1);
    }

    #[test]
    fn test_remove_entity_drops_postings() {
        let index = index();
        let e = entity("security report");
        index.index_entity(&e);
        index.remove_entity(&e.id);

        assert!(index.postings_for("security").is_none());
        assert_eq!(index.stats().documents, 0);
        assert_eq!(index.stats().terms, 0);
    }

    #[test]
    fn test_shared_terms_survive_partial_removal() {
        let index = index();
        let a = entity("security report");
        let b = entity("security analysis");
        index.index_entity(&a);
        index.index_entity(&b);

        index.remove_entity(&a.id);
        let postings = index.postings_for("security").unwrap();
        assert_eq!(postings.len(), 1);
        assert!(postings.contains_key(&b.id));
    }

    #[test]
    fn test_version_increments() {
        let index = index();
        let v0 = index.version();
        index.index_entity(&entity("alpha message"));
        assert!(index.version() > v0);
    }

    #[test]
    fn test_wait_for_version() {
        let index = std::sync::Arc::new(index());
        let clone = index.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            clone.index_entity(&entity("late arrival"));
        });

        assert!(index.wait_for_version(1, Duration::from_secs(1)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_version_timeout() {
        let index = index();
        assert!(!index.wait_for_version(100, Duration::from_millis(10)));
    }

    #[test]
    fn test_clear() {
        let index = index();
        index.index_entity(&entity("security report"));
        index.clear();
        assert_eq!(index.stats().documents, 0);
        assert!(index.postings_for("security").is_none());
    }
}
