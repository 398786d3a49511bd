//! Session event types and EventBus
//!
//! The core never drives a UI directly: it raises a small fixed set of named
//! events that collaborators (tree widget, tables, charts, progress shell)
//! subscribe to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events raised by the scanlens core
///
/// Events are broadcast via [`EventBus`] and are serializable so a shell can
/// forward them across process boundaries if it wants to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A scan import started
    IngestStarted {
        /// Version string of the producing scanner, as passed by the caller
        producer_version: String,
        /// When ingest started
        timestamp: DateTime<Utc>,
    },

    /// A scan import committed its final batch
    IngestFinished {
        /// Number of file records ingested
        file_count: u64,
        /// Number of directory records ingested
        directory_count: u64,
        /// When ingest finished
        timestamp: DateTime<Utc>,
    },

    /// A record failed validation during ingest
    ///
    /// Ingest aborts after raising this; the event carries the per-path
    /// detail so the shell can show a targeted message.
    RecordRejected {
        /// Path of the rejected record, when the record carried one
        path: Option<String>,
        /// Human-readable rejection reason
        reason: String,
        /// When the record was rejected
        timestamp: DateTime<Utc>,
    },

    /// The path tree was rebuilt from the record store
    TreeRebuilt {
        /// Total nodes in the new tree, synthetic root included
        node_count: usize,
        /// When the rebuild completed
        timestamp: DateTime<Utc>,
    },

    /// Aggregate statistics were recomputed over the current tree
    AggregatesRecomputed {
        /// Unpruned file leaves counted at the root
        root_file_count: u64,
        /// When the recompute completed
        timestamp: DateTime<Utc>,
    },

    /// A component overlay entry was created, replaced, or removed
    OverlayChanged {
        /// Path whose overlay entry changed
        path: String,
        /// When the overlay changed
        timestamp: DateTime<Utc>,
    },
}

/// Central event distribution bus for session events
///
/// Uses tokio::broadcast internally, providing non-blocking publish, multiple
/// concurrent subscribers, and automatic cleanup when subscribers drop.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// The core uses this for all its events: a headless caller that never
    /// subscribes is a supported configuration.
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
