//! # Event Bus System
//!
//! Event-driven notifications for the catalog scan engine using
//! `tokio::sync::broadcast`. Downstream consumers (the photo catalog UI, the
//! upload queue) subscribe here instead of being called back directly, which
//! keeps the engine free of consumer locks during emission.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, ScanEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Scan(ScanEvent::Started { full: true })).ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Scan(ScanEvent::Started { .. })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal;
//!   it keeps receiving new ones.
//! - **`RecvError::Closed`**: all senders dropped; treat as shutdown.
//!
//! Events are cloned per subscriber; payloads stay lightweight except for the
//! optional progress thumbnail, which consumers opted into by subscribing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scan lifecycle and progress events
    Scan(ScanEvent),
    /// Deletion queue events
    Deletion(DeletionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.description(),
            CoreEvent::Deletion(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Scan(ScanEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Scan(ScanEvent::Ended { .. }) => EventSeverity::Info,
            CoreEvent::Deletion(DeletionEvent::Retrying { .. }) => EventSeverity::Warning,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Scan Events
// ============================================================================

/// Events emitted by a scan session. `Started` and `Ended` fire exactly once
/// per run; exactly one `Progress` fires per fingerprinted asset. Ordering of
/// `Progress` across concurrently scanned assets is unspecified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScanEvent {
    /// A scan run began.
    Started {
        /// Whether this is a full (deletion-detecting) scan.
        full: bool,
    },
    /// A group's enumeration began.
    GroupBegan {
        /// Persistent group id.
        group_id: String,
        /// Current asset count observed for the group.
        asset_count: u64,
    },
    /// One asset was fingerprinted and its identity resolved.
    Progress {
        /// The asset's current library location.
        location: String,
        /// Encoded identity key (location + content fingerprint).
        identity_key: String,
        /// Run-scoped sequence number, starting at 1.
        sequence: u64,
        /// Square thumbnail pixels, when the consumer can use them directly.
        thumbnail: Option<Vec<u8>>,
    },
    /// The run finished and (unless cancelled) reconciled.
    Ended {
        /// Whether this was a full scan.
        full: bool,
        /// Whether the run was cancelled before reconciliation.
        cancelled: bool,
        /// Locations previously seen but absent from this run.
        /// Present only for completed full scans.
        not_found: Option<Vec<String>>,
        /// Identity keys verified during this run.
        verified: Vec<String>,
        /// Persistent ids of every group encountered this run.
        group_ids: Vec<String>,
        /// Number of assets fingerprinted this run.
        assets_scanned: u64,
    },
}

impl ScanEvent {
    fn description(&self) -> &str {
        match self {
            ScanEvent::Started { .. } => "Scan started",
            ScanEvent::GroupBegan { .. } => "Group enumeration started",
            ScanEvent::Progress { .. } => "Asset scanned",
            ScanEvent::Ended { .. } => "Scan ended",
        }
    }
}

// ============================================================================
// Deletion Events
// ============================================================================

/// Events emitted by the deletion queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DeletionEvent {
    /// A deletion marker was persisted.
    Queued {
        /// Library location of the asset.
        location: String,
    },
    /// The library reported busy; the entry retries after backoff.
    Retrying {
        /// Library location of the asset.
        location: String,
    },
    /// The entry left the queue (deleted, vanished, or not ours to delete).
    Completed {
        /// Library location of the asset.
        location: String,
    },
}

impl DeletionEvent {
    fn description(&self) -> &str {
        match self {
            DeletionEvent::Queued { .. } => "Deletion queued",
            DeletionEvent::Retrying { .. } => "Deletion retrying after backoff",
            DeletionEvent::Completed { .. } => "Deletion entry completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends
/// - Lagging detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none; emitters treat both as non-fatal.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
