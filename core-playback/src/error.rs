//! # Playback Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The track list passed to `play` cannot form a session.
    #[error("Invalid track list: {0}")]
    InvalidTrackList(String),

    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoActiveTrack,

    /// The orchestrator has been torn down and released its player.
    #[error("Playback orchestrator has been torn down")]
    TornDown,

    /// The media backend rejected an operation.
    #[error("Playback backend error: {0}")]
    Backend(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl PlaybackError {
    /// Returns `true` if the error came from the player rather than from the caller.
    pub fn is_backend(&self) -> bool {
        matches!(self, PlaybackError::Backend(_) | PlaybackError::Bridge(_))
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
