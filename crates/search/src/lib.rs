//! Full-text search over entity fields
//!
//! An inverted-index engine kept current by subscription to store
//! lifecycle events:
//!
//! - `tokenizer`: lower-casing, punctuation stripping, stop words, and a
//!   light suffix stemmer
//! - `schema`: explicit per-entity-type searchable-field lists
//! - `document`: the per-entity projection the index stores
//! - `index`: term → (entity → per-field term frequency) postings with a
//!   version watermark
//! - `query`: phrase / exclusion / requirement parsing
//! - `fuzzy`: Levenshtein distance with a similarity discount
//! - `searcher`: scoring, exclusion, and highlight extraction
//!
//! The index owns only a derived projection and is rebuildable from the
//! entity store at any time.

pub mod document;
pub mod fuzzy;
pub mod index;
pub mod query;
pub mod schema;
pub mod searcher;
pub mod tokenizer;

pub use document::{FieldText, IndexedDocument};
pub use index::{IndexStats, SearchIndex};
pub use query::ParsedQuery;
pub use schema::{SearchSchema, TAGS_FIELD};
pub use searcher::{search, SearchHit, SearchRequest};
