//! Events surfaced to the embedding UI
//!
//! Fire-and-forget notifications from the schedulers. The sink is a
//! trait at the seam so the shell can bridge to whatever event bus it
//! runs on; a `tokio` unbounded channel works out of the box.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, EndpointKey};

/// Per-collection sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    /// A sync replaced the collection; resets to `Idle` after the
    /// configured display window.
    Updated,
}

/// One completed (or failed) polled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub method: String,
    pub path: String,
    /// Fully resolved URL at dispatch time
    pub url: String,
    /// Parameter values snapshotted at dispatch time
    pub params: Vec<(String, String)>,
    /// Body text snapshotted at dispatch time, if any
    pub body: Option<String>,
    /// Rendered response, or the formatted transport error
    pub response: String,
    pub at: DateTime<Utc>,
}

/// Notifications emitted by the schedulers.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// A sync produced a fresh collection; the caller replaces its copy.
    CollectionUpdated(Collection),
    SyncStatusChanged {
        url: String,
        status: SyncStatus,
        at: DateTime<Utc>,
    },
    PollResult {
        key: EndpointKey,
        entry: HistoryEntry,
    },
}

/// Fire-and-forget event receiver. No acknowledgement; a full or
/// closed sink must not stall a scheduler.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CoreEvent);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<CoreEvent> {
    fn emit(&self, event: CoreEvent) {
        // Receiver gone means the UI is shutting down; drop silently.
        let _ = self.send(event);
    }
}
