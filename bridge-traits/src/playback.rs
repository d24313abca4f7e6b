//! Playback bridge traits and supporting media types.
//!
//! These abstractions let the playback orchestrator drive a platform media
//! player (ExoPlayer/MediaPlayer on Android, AVPlayer on iOS, a desktop audio
//! engine) while keeping track-selection policy in the core. A player handles
//! one stream at a time; preparation is asynchronous and reported through
//! [`PlayerSignal`]s.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// Where the player should read a track from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Local file accessible to the host runtime.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream to be fetched by the host.
    RemoteStream { url: String },
}

impl MediaSource {
    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, MediaSource::RemoteStream { .. })
    }

    /// URI form suitable for media session metadata.
    pub fn uri(&self) -> String {
        match self {
            MediaSource::LocalFile { path } => format!("file://{}", path.display()),
            MediaSource::RemoteStream { url } => url.clone(),
        }
    }
}

/// Unique identifier for playback sessions managed by a host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackSessionId(Uuid);

impl PlaybackSessionId {
    /// Generate a new session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct an identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaybackSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Playback lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Preparing,
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Metadata pushed to the platform media session / notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackMetadata {
    /// Display title for the track.
    pub title: Option<String>,
    /// Display artist string.
    pub artist: Option<String>,
    /// Media URI of the active source.
    pub uri: Option<String>,
    /// Track length, when the backend knows it.
    pub duration: Option<Duration>,
}

/// Asynchronous notifications raised by a [`MediaPlayer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerSignal {
    /// The session finished buffering and can be started.
    Prepared { session: PlaybackSessionId },
    /// The session played to its natural end.
    Completed { session: PlaybackSessionId },
    /// The session failed to prepare or aborted mid-stream.
    Error {
        session: PlaybackSessionId,
        message: String,
    },
}

impl PlayerSignal {
    pub fn session(&self) -> PlaybackSessionId {
        match self {
            PlayerSignal::Prepared { session }
            | PlayerSignal::Completed { session }
            | PlayerSignal::Error { session, .. } => *session,
        }
    }
}

/// Stream of player signals
#[async_trait]
pub trait PlayerSignalStream: Send {
    /// Get the next signal
    ///
    /// Returns `None` when the player has shut down.
    async fn next(&mut self) -> Option<PlayerSignal>;
}

/// Single-stream media player capability.
///
/// `prepare` must return promptly with a session id; readiness or failure
/// arrives later as a [`PlayerSignal`] carrying that id. Control calls for a
/// session that was already released should be treated as no-ops.
///
/// # Example
///
/// ```ignore
/// let session = player.prepare(MediaSource::RemoteStream { url }).await?;
/// while let Some(signal) = signals.next().await {
///     if signal == (PlayerSignal::Prepared { session }) {
///         player.start(session).await?;
///     }
/// }
/// ```
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    /// Begin loading a source. Any previously prepared session is replaced.
    async fn prepare(&self, source: MediaSource) -> Result<PlaybackSessionId>;

    /// Begin or resume playback for the provided session.
    async fn start(&self, session: PlaybackSessionId) -> Result<()>;

    /// Pause playback without releasing the session.
    async fn pause(&self, session: PlaybackSessionId) -> Result<()>;

    /// Seek to an absolute position within the stream.
    async fn seek(&self, session: PlaybackSessionId, position: Duration) -> Result<()>;

    /// Query the current playback position.
    async fn position(&self, session: PlaybackSessionId) -> Result<Duration>;

    /// Track length, `None` while unknown (live streams, still buffering).
    async fn duration(&self, session: PlaybackSessionId) -> Result<Option<Duration>>;

    /// Release resources associated with a playback session.
    async fn release(&self, session: PlaybackSessionId) -> Result<()>;

    /// Subscribe to readiness/completion/error signals.
    fn subscribe_signals(&self) -> Result<Box<dyn PlayerSignalStream>>;
}

/// Platform media session (lock screen, notification, headset controls).
#[async_trait]
pub trait MediaSessionMirror: Send + Sync {
    async fn update_metadata(&self, metadata: PlaybackMetadata) -> Result<()>;

    async fn update_state(&self, state: PlaybackState, position: Duration) -> Result<()>;
}
