//! # Event Bus System
//!
//! In-process publish/subscribe for the offline media core, built on
//! `tokio::sync::broadcast`. Downloads, playback and storage maintenance all
//! report state changes here; UI layers and notification renderers subscribe
//! instead of polling.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐   emit    ┌───────────┐
//! │ DownloadCoordinator├──────────>│           │
//! └────────────────────┘           │           │   subscribe   ┌────────────┐
//! ┌────────────────────┐   emit    │ EventBus  ├──────────────>│ UI / Host  │
//! │PlaybackOrchestrator├──────────>│ (broadcast│               └────────────┘
//! └────────────────────┘           │  channel) │   subscribe   ┌────────────┐
//! ┌────────────────────┐   emit    │           ├──────────────>│Notification│
//! │  RetentionPolicy   ├──────────>│           │               └────────────┘
//! └────────────────────┘           └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Playback(PlaybackEvent::StatusChanged { is_playing: true }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Playback status changed");
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Download Events
//! - `Started`, `Progress`, `Completed`, `Failed`, `Cancelled`
//!
//! ### Playback Events
//! - `StatusChanged`: playing/paused flag flipped
//! - `TrackChanged`: a different track became active
//! - `Progress`: periodic position report while playing
//! - `Error`: the backend failed to prepare or play a track
//!
//! ### Storage Events
//! - `ResourceRecorded`, `ResourceRemoved`, `Cleared`, `StaleEvicted`
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use bridge_traits::transfer::TransferHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Download lifecycle events
    Download(DownloadEvent),
    /// Playback events
    Playback(PlaybackEvent),
    /// Offline storage maintenance events
    Storage(StorageEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Storage(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::Started { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::TrackChanged { .. }) => EventSeverity::Info,
            CoreEvent::Storage(StorageEvent::Cleared { .. })
            | CoreEvent::Storage(StorageEvent::StaleEvicted { .. }) => EventSeverity::Info,
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
// Download Events
// ============================================================================

/// Events emitted by the download coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A transfer was handed to the transport.
    Started {
        handle: TransferHandle,
        url: String,
        title: String,
    },
    /// Periodic progress for an active transfer.
    Progress {
        handle: TransferHandle,
        url: String,
        /// Completion percentage (0-100); 0 while the size is unknown.
        percent: u8,
    },
    /// The resource is available offline.
    Completed {
        /// Absent when the resource was already available and nothing was queued.
        handle: Option<TransferHandle>,
        url: String,
        local_path: String,
        already_available: bool,
    },
    /// The transport reported a failure.
    Failed {
        handle: TransferHandle,
        url: String,
        /// Opaque reason string from the transport.
        reason: String,
    },
    /// The transfer was cancelled by a caller.
    Cancelled { handle: TransferHandle, url: String },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Completed {
                already_available: true,
                ..
            } => "Resource already available offline",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
        }
    }

    /// URL of the resource the event refers to.
    pub fn url(&self) -> &str {
        match self {
            DownloadEvent::Started { url, .. }
            | DownloadEvent::Progress { url, .. }
            | DownloadEvent::Completed { url, .. }
            | DownloadEvent::Failed { url, .. }
            | DownloadEvent::Cancelled { url, .. } => url,
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to audio playback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Playing/paused flag changed (or was re-announced on request).
    StatusChanged { is_playing: bool },
    /// A different track became active.
    TrackChanged {
        url: String,
        title: String,
        /// Position of the track in the session's list.
        index: usize,
    },
    /// Periodic position report while playing.
    Progress {
        /// Position (milliseconds).
        position_ms: u64,
        /// Track duration (milliseconds); 0 when unknown.
        duration_ms: u64,
    },
    /// The backend failed to prepare or play a track.
    Error {
        url: Option<String>,
        /// Human-readable error message.
        message: String,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StatusChanged { .. } => "Playback status changed",
            PlaybackEvent::TrackChanged { .. } => "Track changed",
            PlaybackEvent::Progress { .. } => "Playback progress",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Storage Events
// ============================================================================

/// Events related to the offline registry and retention sweeps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StorageEvent {
    /// A resource was recorded as available offline.
    ResourceRecorded {
        url: String,
        /// Resource type label (e.g. "audio").
        resource_type: String,
    },
    /// A resource mapping was removed from the registry.
    ResourceRemoved { url: String },
    /// Bulk clear finished.
    Cleared {
        removed: u64,
        include_priority: bool,
    },
    /// Age-based eviction finished.
    StaleEvicted { removed: u64, older_than_days: u32 },
}

impl StorageEvent {
    fn description(&self) -> &str {
        match self {
            StorageEvent::ResourceRecorded { .. } => "Resource recorded offline",
            StorageEvent::ResourceRemoved { .. } => "Resource removed from offline registry",
            StorageEvent::Cleared { .. } => "Offline storage cleared",
            StorageEvent::StaleEvicted { .. } => "Stale offline resources evicted",
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
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future events.
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let downloads = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Download(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
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

// ============================================================================
// Tests
// ============================================================================
