//! Progress bus implementation using tokio broadcast channels

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{EventEnvelope, ScanEvent};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1000;

/// Publish/subscribe channel for run progress events.
///
/// A single broadcast channel carries events for all runs; envelopes are
/// keyed by run id and subscribers filter. Per-run sequence numbers are
/// assigned here so that the emit order of the orchestrator is the order
/// observers see.
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<EventEnvelope>,
    seqs: Arc<Mutex<HashMap<Uuid, u64>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            seqs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish an event for a run to all subscribers.
    ///
    /// Returns the number of subscribers that received the event; 0 means
    /// the event was dropped, which is fine — the run store is the source
    /// of truth, the bus only serves live tails.
    pub fn publish(&self, run_id: Uuid, event: ScanEvent) -> usize {
        // Sequence assignment and send happen under one lock so delivery
        // order always matches sequence order, even for concurrent
        // publishers within a run.
        let mut seqs = self.seqs.lock().unwrap_or_else(|p| p.into_inner());
        let counter = seqs.entry(run_id).or_insert(0);
        *counter += 1;

        let envelope = EventEnvelope::new(run_id, *counter, event);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to all runs' events. Events published before subscribing
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Highest sequence published for a run so far (0 if none).
    pub fn last_seq(&self, run_id: Uuid) -> u64 {
        self.seqs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&run_id)
            .copied()
            .unwrap_or(0)
    }

    /// Drop the sequence counter for a run (administrative delete).
    pub fn forget_run(&self, run_id: Uuid) {
        self.seqs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&run_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
