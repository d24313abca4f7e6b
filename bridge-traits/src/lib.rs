//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline/playback core and
//! platform-specific implementations. Each trait represents a capability that
//! the core requires but that must be implemented differently per platform.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`Transport`](transfer::Transport) - Background file transfers with terminal signals
//! - [`NetworkMonitor`](network::NetworkMonitor) - WiFi/mobile/offline detection
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Offline storage probing and cleanup
//!
//! ### Media
//! - [`MediaPlayer`](playback::MediaPlayer) - Single-stream audio playback
//! - [`MediaSessionMirror`](playback::MediaSessionMirror) - Notification / lock screen state
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Transport, network, filesystem |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! The media player has no desktop implementation; hosts always inject one.
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! let player = config.media_player
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "MediaPlayer".to_string(),
//!         message: "Inject the host media player adapter.".to_string(),
//!     })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks. Implementations must ensure thread safety.

pub mod error;
pub mod network;
pub mod playback;
pub mod storage;
pub mod time;
pub mod transfer;

pub use error::BridgeError;

// Re-export commonly used types
pub use network::{NetworkConstraint, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use playback::{
    MediaPlayer, MediaSessionMirror, MediaSource, PlaybackMetadata, PlaybackSessionId,
    PlaybackState, PlayerSignal, PlayerSignalStream,
};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
pub use transfer::{
    RetryPolicy, TerminalSignalStream, TransferHandle, TransferRequest, TransferSnapshot,
    TransferStatus, Transport,
};
