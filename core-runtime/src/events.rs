//! # Event Bus System
//!
//! Decoupled notifications from the storage core to host UI layers over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: typed enums per domain, wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Sync processor ├─────────>│ EventBus  ├────────────>│ Subscriber │
//! └────────────────┘          └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, FileSyncEvent};
//!
//! let event_bus = EventBus::new(16);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::FileSync(FileSyncEvent::ConflictDetected {
//!         file_uid: "/vaults/work.kdbx".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! Emitting with no subscribers fails with `SendError`; publishers ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError};

pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall further behind receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Per-file synchronization events
    FileSync(FileSyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::FileSync(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::FileSync(FileSyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::FileSync(FileSyncEvent::ConflictDetected { .. }) => EventSeverity::Warning,
            CoreEvent::FileSync(FileSyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::FileSync(FileSyncEvent::Started { .. }) => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted while a single file is synchronized with its remote copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FileSyncEvent {
    /// A sync operation claimed the file.
    Started {
        file_uid: String,
        /// Storage backend, e.g. `webdav` or `git`.
        fs_type: String,
    },
    /// The sync operation finished and the cache matches the server.
    Completed {
        file_uid: String,
        /// Name of the status that was acted on, e.g. `RemoteChanges`.
        status: String,
        /// Revision stored in the cache after the transfer.
        revision: Option<String>,
    },
    /// The sync operation failed; the cache was left untouched.
    Failed {
        file_uid: String,
        /// Human-readable error message.
        message: String,
        /// Operation error kind name, e.g. `NetworkIo`.
        kind: String,
    },
    /// Local and remote copies diverged and need a user decision.
    ConflictDetected { file_uid: String },
}

impl FileSyncEvent {
    fn description(&self) -> &str {
        match self {
            FileSyncEvent::Started { .. } => "File sync started",
            FileSyncEvent::Completed { .. } => "File sync completed",
            FileSyncEvent::Failed { .. } => "File sync failed",
            FileSyncEvent::ConflictDetected { .. } => "File sync conflict detected",
        }
    }

    pub fn file_uid(&self) -> &str {
        match self {
            FileSyncEvent::Started { file_uid, .. }
            | FileSyncEvent::Completed { file_uid, .. }
            | FileSyncEvent::Failed { file_uid, .. }
            | FileSyncEvent::ConflictDetected { file_uid } => file_uid,
        }
    }
}

/// Central event bus.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

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

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream, FileSyncEvent};
///
/// let event_bus = EventBus::new(16);
/// let conflicts = EventStream::new(event_bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::FileSync(FileSyncEvent::ConflictDetected { .. }))
/// });
/// ```
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
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
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
