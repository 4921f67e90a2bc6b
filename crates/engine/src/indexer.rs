//! Background search-index maintenance
//!
//! The worker thread drains the event bus and applies entity lifecycle
//! events to the search index: created → index, updated → remove then
//! reindex, deleted → remove. Migration events advance the watermark
//! without touching the index.
//!
//! This is the eventual-consistency seam: a write returns before the
//! worker processes its event, so a reader can briefly miss a
//! just-committed entity in search results. `wait_for` makes that
//! window observable instead of a timing race.

use crate::events::SequencedEvent;
use recon_core::StoreEvent;
use recon_search::SearchIndex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Handle to the index maintenance thread
pub struct IndexWorker {
    handle: Option<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
}

impl IndexWorker {
    /// Spawn the worker on a bus subscription
    ///
    /// The worker runs until every bus sender is dropped or the bus is
    /// closed.
    pub fn spawn(index: Arc<SearchIndex>, receiver: Receiver<SequencedEvent>) -> Self {
        let processed = Arc::new(AtomicU64::new(0));
        let watermark = processed.clone();

        let handle = thread::spawn(move || {
            debug!("index worker started");
            while let Ok(SequencedEvent { sequence, event }) = receiver.recv() {
                match event {
                    StoreEvent::EntityCreated { entity }
                    | StoreEvent::EntityUpdated { entity, .. } => {
                        index.index_entity(&entity);
                    }
                    StoreEvent::EntityDeleted { id, .. } => {
                        index.remove_entity(&id);
                    }
                    // Migration events carry no per-entity payloads; the
                    // engine reindexes after a completed run instead.
                    StoreEvent::MigrationStarted { .. }
                    | StoreEvent::MigrationCompleted { .. }
                    | StoreEvent::MigrationFailed { .. }
                    | StoreEvent::MigrationLog { .. } => {}
                }
                watermark.store(sequence, Ordering::Release);
            }
            debug!("index worker exiting");
        });

        Self {
            handle: Some(handle),
            processed,
        }
    }

    /// Sequence number of the last event applied
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Wait until the worker has processed up to `sequence`
    ///
    /// Returns true when the watermark was reached within the timeout.
    pub fn wait_for(&self, sequence: u64, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.processed.load(Ordering::Acquire) >= sequence {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::yield_now();
        }
    }

    /// Join the worker thread; call after closing the bus
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IndexWorker {
    fn drop(&mut self) {
        // Joining requires the bus side to be closed first; if it is
        // not, leave the thread to exit with the process.
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}
