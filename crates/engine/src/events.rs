//! Sequence-stamped event fan-out
//!
//! Every mutation publishes one event after its transaction commits.
//! Publishing stamps a monotonically increasing sequence number, which
//! is what index-sync waiting compares against: the bus knows the last
//! sequence published, the index worker records the last sequence it
//! processed.

use parking_lot::Mutex;
use recon_core::StoreEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::trace;

/// An event plus its position in the publish order
#[derive(Debug, Clone)]
pub struct SequencedEvent {
    /// Position in the publish order, starting at 1
    pub sequence: u64,
    /// The event itself
    pub event: StoreEvent,
}

/// Fan-out bus for store events
///
/// Subscribers receive every event published after they subscribe, in
/// publish order. A dropped receiver is detected on the next publish
/// and unsubscribed silently.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SequencedEvent>>>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe; the returned receiver sees all subsequent events
    pub fn subscribe(&self) -> Receiver<SequencedEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Publish an event to every live subscriber
    ///
    /// Returns the sequence number stamped on the event.
    pub fn publish(&self, event: StoreEvent) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(sequence, name = event.name(), "publishing event");

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| {
            sender
                .send(SequencedEvent {
                    sequence,
                    event: event.clone(),
                })
                .is_ok()
        });
        sequence
    }

    /// Sequence number of the most recently published event
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscription, ending subscriber loops
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }
}
