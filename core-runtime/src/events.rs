//! # Event Bus System
//!
//! Provides progress notification for restore runs using `tokio::sync::broadcast`.
//! The engine emits typed events as each stage completes, and callers subscribe
//! to drive progress output or collect metrics without polling.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, RestoreEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Restore(RestoreEvent::StageCompleted {
//!         run_id: "run-1".to_string(),
//!         entries: 3,
//!         creates: 1,
//!         updates: 2,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Staging completed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Restore pipeline events
    Restore(RestoreEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Restore(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Restore(RestoreEvent::LicenseBlocked { .. }) => EventSeverity::Warning,
            CoreEvent::Restore(RestoreEvent::SyncCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Restore(RestoreEvent::ReconcileCompleted { unreconciled, .. })
                if *unreconciled > 0 =>
            {
                EventSeverity::Warning
            }
            CoreEvent::Restore(RestoreEvent::FolderCreated { .. })
            | CoreEvent::Restore(RestoreEvent::WorkflowAssigned { .. }) => EventSeverity::Debug,
            CoreEvent::Restore(_) => EventSeverity::Info,
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
// Restore Events
// ============================================================================

/// Events emitted by the restore pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RestoreEvent {
    /// Staging wrote the manifest and sanitized copies.
    StageCompleted {
        run_id: String,
        /// Manifest entries produced.
        entries: u64,
        /// Entries importing as new workflows.
        creates: u64,
        /// Entries updating an existing workflow.
        updates: u64,
    },
    /// Post-import reconciliation finished.
    ReconcileCompleted {
        run_id: String,
        reconciled: u64,
        unreconciled: u64,
    },
    /// A folder was created on the remote instance.
    FolderCreated {
        run_id: String,
        folder_id: String,
        project_id: String,
        /// Slash-joined display path of the folder.
        display_path: String,
    },
    /// A workflow was moved into its target folder.
    WorkflowAssigned {
        run_id: String,
        workflow_id: String,
        folder_id: Option<String>,
    },
    /// The instance rejected folder operations for licensing reasons.
    LicenseBlocked { run_id: String, message: String },
    /// Folder synchronization finished.
    SyncCompleted {
        run_id: String,
        assigned: u64,
        unchanged: u64,
        failed: u64,
        license_blocked: u64,
    },
}

impl RestoreEvent {
    fn description(&self) -> &str {
        match self {
            RestoreEvent::StageCompleted { .. } => "Staging completed",
            RestoreEvent::ReconcileCompleted { .. } => "Reconciliation completed",
            RestoreEvent::FolderCreated { .. } => "Folder created",
            RestoreEvent::WorkflowAssigned { .. } => "Workflow assigned",
            RestoreEvent::LicenseBlocked { .. } => "Folder operations blocked by license",
            RestoreEvent::SyncCompleted { .. } => "Folder sync completed",
        }
    }

    /// Identifier of the run that emitted the event.
    pub fn run_id(&self) -> &str {
        match self {
            RestoreEvent::StageCompleted { run_id, .. }
            | RestoreEvent::ReconcileCompleted { run_id, .. }
            | RestoreEvent::FolderCreated { run_id, .. }
            | RestoreEvent::WorkflowAssigned { run_id, .. }
            | RestoreEvent::LicenseBlocked { run_id, .. }
            | RestoreEvent::SyncCompleted { run_id, .. } => run_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
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
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned(workflow_id: &str) -> CoreEvent {
        CoreEvent::Restore(RestoreEvent::WorkflowAssigned {
            run_id: "run-1".to_string(),
            workflow_id: workflow_id.to_string(),
            folder_id: Some("f1".to_string()),
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(assigned("wf1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = assigned("wf1");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).filter(|event| {
            matches!(event, CoreEvent::Restore(RestoreEvent::LicenseBlocked { .. }))
        });

        bus.emit(assigned("wf1")).ok();
        let blocked = CoreEvent::Restore(RestoreEvent::LicenseBlocked {
            run_id: "run-1".to_string(),
            message: "Plan lacks folders".to_string(),
        });
        bus.emit(blocked.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), blocked);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(assigned(&format!("wf{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed_sync = CoreEvent::Restore(RestoreEvent::SyncCompleted {
            run_id: "run-1".to_string(),
            assigned: 3,
            unchanged: 0,
            failed: 1,
            license_blocked: 0,
        });
        assert_eq!(failed_sync.severity(), EventSeverity::Warning);

        let clean_sync = CoreEvent::Restore(RestoreEvent::SyncCompleted {
            run_id: "run-1".to_string(),
            assigned: 3,
            unchanged: 1,
            failed: 0,
            license_blocked: 0,
        });
        assert_eq!(clean_sync.severity(), EventSeverity::Info);
        assert_eq!(assigned("wf1").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Restore(RestoreEvent::FolderCreated {
            run_id: "run-9".to_string(),
            folder_id: "f1".to_string(),
            project_id: "p1".to_string(),
            display_path: "Sales/Leads".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Restore\""));
        assert!(json.contains("\"event\":\"FolderCreated\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(assigned("wf2")).ok();
        let received = stream.try_recv().unwrap().unwrap();
        match received {
            CoreEvent::Restore(event) => assert_eq!(event.run_id(), "run-1"),
        }
    }
}
