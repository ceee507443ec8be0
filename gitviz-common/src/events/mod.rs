//! Event types and broadcast bus for import progress
//!
//! Events are emitted by the bulk import orchestrator and fanned out to SSE
//! clients. Emission is lossy: with no subscriber the event is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events published while a bulk import runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GitvizEvent {
    /// Job-level status or progress change
    BulkImportProgress {
        job_id: Uuid,
        status: String,
        progress: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// One repository task reached a terminal state
    RepositorySettled {
        job_id: Uuid,
        owner: String,
        repository: String,
        status: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Job finished (completed or failed)
    BulkImportFinished {
        job_id: Uuid,
        status: String,
        completed: usize,
        skipped: usize,
        failed: usize,
        projects_created: usize,
        timestamp: DateTime<Utc>,
    },
}

impl GitvizEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            GitvizEvent::BulkImportProgress { .. } => "BulkImportProgress",
            GitvizEvent::RepositorySettled { .. } => "RepositorySettled",
            GitvizEvent::BulkImportFinished { .. } => "BulkImportFinished",
        }
    }

    /// Job the event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            GitvizEvent::BulkImportProgress { job_id, .. }
            | GitvizEvent::RepositorySettled { job_id, .. }
            | GitvizEvent::BulkImportFinished { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast bus shared by producers and SSE handlers
///
/// # Examples
///
/// ```
/// use gitviz_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GitvizEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GitvizEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GitvizEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No SSE subscribers for import event");
        }
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
