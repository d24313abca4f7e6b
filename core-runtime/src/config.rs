//! # Core Configuration Module
//!
//! Provides configuration management for the offline media core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all host capabilities and tunables. It enforces
//! fail-fast validation so a missing capability is reported at startup rather
//! than at the first download or play request.
//!
//! ## Required Dependencies
//!
//! - `MediaPlayer` - Audio playback backend (always host-provided)
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `FileSystemAccess` - Offline storage probing (desktop default: tokio fs)
//! - `NetworkMonitor` - WiFi detection (desktop default: sysfs monitor)
//! - `Transport` - Background transfers (desktop default: reqwest transport)
//! - `Clock` - Time source (default: system clock)
//! - `MediaSessionMirror` - Notification / lock screen updates (optional)
//! - `LoggerSink` - Host log forwarding (optional)
//!
//! When the `desktop-shims` feature is disabled, a missing file system,
//! network monitor or transport is reported as `Error::CapabilityMissing`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/offline.db")
//!     .storage_root("/data")
//!     .media_player(Arc::new(HostPlayer::new()))
//!     .folder_download_limit(3)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    Clock, FileSystemAccess, LoggerSink, MediaPlayer, MediaSessionMirror, NetworkMonitor,
    SystemClock, Transport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of requests issued per folder download.
pub const DEFAULT_FOLDER_DOWNLOAD_LIMIT: usize = 3;

/// Default playback progress reporting interval.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of random draws used to avoid repeating the current track.
pub const DEFAULT_SHUFFLE_MAX_DRAWS: u32 = 10;

/// Default window for a double press of the play/pause button.
pub const DEFAULT_DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);

/// Core configuration for the offline media core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Directory under which `Offline/<type>` folders live. When absent, the
    /// file system's data directory is used.
    pub storage_root: Option<PathBuf>,

    pub file_system: Arc<dyn FileSystemAccess>,
    pub network_monitor: Arc<dyn NetworkMonitor>,
    pub transport: Arc<dyn Transport>,
    pub media_player: Arc<dyn MediaPlayer>,
    pub media_session: Option<Arc<dyn MediaSessionMirror>>,
    pub clock: Arc<dyn Clock>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Event bus buffer size
    pub event_buffer_size: usize,

    /// Maximum requests issued by one folder download call
    pub folder_download_limit: usize,

    /// Interval for playback and download progress reports
    pub progress_interval: Duration,

    /// Random draws before accepting a repeat of the current track
    pub shuffle_max_draws: u32,

    /// Two play/pause presses within this window skip to the next track
    pub double_tap_window: Duration,

    /// Features flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("storage_root", &self.storage_root)
            .field("file_system", &"FileSystemAccess { ... }")
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field("transport", &"Transport { ... }")
            .field("media_player", &"MediaPlayer { ... }")
            .field(
                "media_session",
                &self
                    .media_session
                    .as_ref()
                    .map(|_| "MediaSessionMirror { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("folder_download_limit", &self.folder_download_limit)
            .field("progress_interval", &self.progress_interval)
            .field("shuffle_max_draws", &self.shuffle_max_draws)
            .field("double_tap_window", &self.double_tap_window)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Play a registry-backed local file instead of streaming when available
    pub prefer_local_playback: bool,

    /// Resubmit restored downloads the transport no longer knows about
    pub resume_restored_transfers: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            prefer_local_playback: true,
            resume_restored_transfers: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Storage root, when given, is not empty
    /// - Tunables are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if matches!(&self.storage_root, Some(root) if root.as_os_str().is_empty()) {
            return Err(Error::Config("Storage root cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.folder_download_limit == 0 {
            return Err(Error::Config(
                "Folder download limit must be greater than 0".to_string(),
            ));
        }

        if self.progress_interval.is_zero() {
            return Err(Error::Config(
                "Progress interval must be greater than 0".to_string(),
            ));
        }

        if self.shuffle_max_draws == 0 {
            return Err(Error::Config(
                "Shuffle draw limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn media_player_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaPlayer".to_string(),
        message: "A MediaPlayer implementation is required for playback. \
                 Inject the host audio backend (ExoPlayer/MediaPlayer on Android, \
                 AVPlayer on iOS, a native engine on desktop)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{capability} implementation is required. \
             Desktop: enable the 'desktop-shims' feature to use the default adapter. \
             Mobile: inject the platform-native adapter."
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    Ok(Arc::new(TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    use bridge_desktop::DesktopNetworkMonitor;

    Ok(Arc::new(DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(capability_missing("NetworkMonitor"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_transport(monitor: Arc<dyn NetworkMonitor>) -> Result<Arc<dyn Transport>> {
    use bridge_desktop::ReqwestTransport;

    let transport = ReqwestTransport::new()
        .map_err(|e| Error::Internal(format!("Failed to create default transport: {}", e)))?
        .with_network_monitor(monitor, Duration::from_secs(5));
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_transport(_monitor: Arc<dyn NetworkMonitor>) -> Result<Arc<dyn Transport>> {
    Err(capability_missing("Transport"))
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    storage_root: Option<PathBuf>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    transport: Option<Arc<dyn Transport>>,
    media_player: Option<Arc<dyn MediaPlayer>>,
    media_session: Option<Arc<dyn MediaSessionMirror>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_buffer_size: Option<usize>,
    folder_download_limit: Option<usize>,
    progress_interval: Option<Duration>,
    shuffle_max_draws: Option<u32>,
    double_tap_window: Option<Duration>,
    features: Option<FeatureFlags>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the directory that holds the `Offline` tree.
    pub fn storage_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_root = Some(path.into());
        self
    }

    /// Sets the file system access implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the network monitor implementation.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the transfer transport implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the media player implementation (required).
    pub fn media_player(mut self, player: Arc<dyn MediaPlayer>) -> Self {
        self.media_player = Some(player);
        self
    }

    /// Sets the platform media session mirror.
    pub fn media_session(mut self, mirror: Arc<dyn MediaSessionMirror>) -> Self {
        self.media_session = Some(mirror);
        self
    }

    /// Sets the clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets a host logger sink.
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Default: 3
    pub fn folder_download_limit(mut self, limit: usize) -> Self {
        self.folder_download_limit = Some(limit);
        self
    }

    /// Default: 1 second
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    /// Default: 10
    pub fn shuffle_max_draws(mut self, draws: u32) -> Self {
        self.shuffle_max_draws = Some(draws);
        self
    }

    /// Default: 300 ms
    pub fn double_tap_window(mut self, window: Duration) -> Self {
        self.double_tap_window = Some(window);
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = Some(features);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - The database path or media player is missing
    /// - A capability without a platform default is missing
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let media_player = self.media_player.ok_or_else(media_player_missing_error)?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => provide_default_transport(Arc::clone(&network_monitor))?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let config = CoreConfig {
            database_path,
            storage_root: self.storage_root,
            file_system,
            network_monitor,
            transport,
            media_player,
            media_session: self.media_session,
            clock,
            logger_sink: self.logger_sink,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            folder_download_limit: self
                .folder_download_limit
                .unwrap_or(DEFAULT_FOLDER_DOWNLOAD_LIMIT),
            progress_interval: self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            shuffle_max_draws: self.shuffle_max_draws.unwrap_or(DEFAULT_SHUFFLE_MAX_DRAWS),
            double_tap_window: self.double_tap_window.unwrap_or(DEFAULT_DOUBLE_TAP_WINDOW),
            features: self.features.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
