//! Core service façade and bootstrap.
//!
//! This crate turns a [`CoreConfig`] into running components: it opens the
//! offline store, builds the registry, the download coordinator and the
//! playback orchestrator, and keeps three background loops alive:
//!
//! - transport terminal signals → [`DownloadCoordinator::on_transfer_terminal`]
//! - player signals → [`PlaybackOrchestrator::on_player_signal`]
//! - a periodic [`DownloadCoordinator::poll_progress`]
//!
//! Desktop apps typically enable the `desktop-shims` feature so that a missing
//! file system, network monitor or transport falls back to `bridge-desktop`.

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::{PlayerSignalStream, TerminalSignalStream};
use core_offline::db::{create_pool, DatabaseConfig};
use core_offline::repositories::{SqliteDownloadRequestRepository, SqliteResourceRepository};
use core_offline::{DownloadCoordinator, ResourceRegistry, RetentionPolicy};
use core_playback::{OrchestratorConfig, PlaybackOrchestrator};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LoggingConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: CoreConfig,
    event_bus: EventBus,
    registry: Arc<ResourceRegistry>,
    coordinator: Arc<DownloadCoordinator>,
    retention: Arc<RetentionPolicy>,
    orchestrator: Arc<PlaybackOrchestrator>,
    shutdown: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for CoreService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("offline_root", &self.registry.offline_root())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CoreService {
    /// Initialise logging, then [`bootstrap`](Self::bootstrap).
    ///
    /// The config's `logger_sink` is forwarded to when `logging` has none.
    pub async fn bootstrap_with_logging(config: CoreConfig, logging: LoggingConfig) -> Result<Self> {
        let logging = match (&logging.logger_sink, &config.logger_sink) {
            (None, Some(sink)) => logging.with_logger_sink(Arc::clone(sink)),
            _ => logging,
        };
        init_logging(logging)?;

        Self::bootstrap(config).await
    }

    /// Build every component and start the background loops.
    ///
    /// Persisted downloads from a previous run are loaded and reconciled
    /// against the transport before this returns.
    ///
    /// # Errors
    /// - invalid configuration
    /// - the database cannot be opened or migrated
    /// - no storage root is configured and the file system has no data directory
    /// - the transport or player cannot deliver signals
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;

        let storage_root = match &config.storage_root {
            Some(root) => root.clone(),
            None => config.file_system.get_data_directory().await.map_err(|e| {
                CoreError::InitializationFailed(format!("No storage root available: {e}"))
            })?,
        };

        let registry = Arc::new(ResourceRegistry::new(
            Arc::new(SqliteResourceRepository::new(pool.clone())),
            Arc::clone(&config.file_system),
            Arc::clone(&config.clock),
            &storage_root,
            event_bus.clone(),
        ));

        let coordinator = DownloadCoordinator::new(
            Arc::clone(&registry),
            Arc::new(SqliteDownloadRequestRepository::new(pool)),
            Arc::clone(&config.transport),
            Arc::clone(&config.network_monitor),
            Arc::clone(&config.clock),
            event_bus.clone(),
        )
        .await?
        .with_folder_download_limit(config.folder_download_limit)
        .with_resume_restored(config.features.resume_restored_transfers);
        let coordinator = Arc::new(coordinator);

        let retention = Arc::new(RetentionPolicy::new(
            Arc::clone(&registry),
            Arc::clone(&config.clock),
            event_bus.clone(),
        ));

        let playback_config = OrchestratorConfig {
            progress_interval: config.progress_interval,
            shuffle_max_draws: config.shuffle_max_draws,
            double_tap_window: config.double_tap_window,
            prefer_local_playback: config.features.prefer_local_playback,
        };
        playback_config
            .validate()
            .map_err(CoreError::InitializationFailed)?;

        let mut orchestrator = PlaybackOrchestrator::new(
            Arc::clone(&config.media_player),
            event_bus.clone(),
            playback_config,
        )
        .with_local_resolver(Arc::clone(&registry) as _);
        if let Some(mirror) = &config.media_session {
            orchestrator = orchestrator.with_media_session(Arc::clone(mirror));
        }
        let orchestrator = Arc::new(orchestrator);

        // Subscribe before reconciling so resubmitted transfers cannot finish unseen.
        let terminal = config.transport.subscribe_terminal().map_err(|e| {
            CoreError::InitializationFailed(format!("Transport terminal signals unavailable: {e}"))
        })?;
        let player_signals = config.media_player.subscribe_signals().map_err(|e| {
            CoreError::InitializationFailed(format!("Player signals unavailable: {e}"))
        })?;

        let settled = coordinator.reconcile_restored().await?;
        if settled > 0 {
            info!(settled, "Reconciled restored downloads");
        }

        let shutdown = CancellationToken::new();
        let tasks = vec![
            spawn_terminal_loop(Arc::clone(&coordinator), terminal, shutdown.clone()),
            spawn_player_loop(Arc::clone(&orchestrator), player_signals, shutdown.clone()),
            spawn_progress_loop(
                Arc::clone(&coordinator),
                config.progress_interval,
                shutdown.clone(),
            ),
        ];

        info!(offline_root = %registry.offline_root().display(), "Core service started");

        Ok(Self {
            config,
            event_bus,
            registry,
            coordinator,
            retention,
            orchestrator,
            shutdown,
            tasks: parking_lot::Mutex::new(tasks),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// New subscription to every core event.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn downloads(&self) -> &Arc<DownloadCoordinator> {
        &self.coordinator
    }

    pub fn retention(&self) -> &Arc<RetentionPolicy> {
        &self.retention
    }

    pub fn playback(&self) -> &Arc<PlaybackOrchestrator> {
        &self.orchestrator
    }

    /// Human-readable connectivity, e.g. "Connected via WiFi".
    pub async fn network_description(&self) -> &'static str {
        match self.config.network_monitor.get_network_info().await {
            Ok(info) => info.description(),
            Err(e) => {
                debug!(error = %e, "Network info unavailable");
                bridge_traits::NetworkInfo::disconnected().description()
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop the background loops and tear down playback.
    ///
    /// In-flight downloads stay with the transport and are reconciled on the
    /// next bootstrap. Calling this again has no effect.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        self.orchestrator.teardown().await;

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        info!("Core service shut down");
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ============================================================================
// Background loops
// ============================================================================

fn spawn_terminal_loop(
    coordinator: Arc<DownloadCoordinator>,
    mut signals: Box<dyn TerminalSignalStream>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                handle = signals.next() => {
                    let Some(handle) = handle else {
                        debug!("Transport terminal stream closed");
                        break;
                    };
                    if let Err(e) = coordinator.on_transfer_terminal(handle).await {
                        warn!(%handle, error = %e, "Failed to reconcile finished transfer");
                    }
                }
            }
        }
    })
}

fn spawn_player_loop(
    orchestrator: Arc<PlaybackOrchestrator>,
    mut signals: Box<dyn PlayerSignalStream>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                signal = signals.next() => {
                    let Some(signal) = signal else {
                        debug!("Player signal stream closed");
                        break;
                    };
                    orchestrator.on_player_signal(signal).await;
                }
            }
        }
    })
}

fn spawn_progress_loop(
    coordinator: Arc<DownloadCoordinator>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    coordinator.poll_progress().await;
                }
            }
        }
    })
}
