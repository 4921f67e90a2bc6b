//! Storage orchestration
//!
//! The facade every caller uses. A `StoreHandle` routes reads across
//! cache → memory → persistent tier, fans writes out transactionally
//! with compensating rollback, publishes lifecycle events after commit,
//! and keeps the search index current through a background worker.
//!
//! There is no process-wide state: a handle is an explicit value
//! constructed once at startup and passed to collaborators, and tests
//! open as many isolated stores as they like.

mod config;
mod events;
mod handle;
mod indexer;

pub use config::{PersistenceMode, StoreConfig, CONFIG_FILE_NAME};
pub use events::{EventBus, SequencedEvent};
pub use handle::{SearchResult, StoreHandle, StoreHandleStats, WriteOptions};
pub use indexer::IndexWorker;
