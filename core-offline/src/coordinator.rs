//! # Download Coordinator
//!
//! Owns the offline download queue: submits transfers to the host
//! [`Transport`], persists every in-flight request, and reconciles terminal
//! transfers into the [`ResourceRegistry`].
//!
//! ## Overview
//!
//! - `request_download` validates input, short-circuits resources that are
//!   already available, enforces the WiFi-only precondition, then submits the
//!   transfer and persists its record before returning.
//! - `on_transfer_terminal` is driven by the transport's terminal signal. It
//!   may run after a process restart, so it falls back to the persisted record
//!   when the handle is not in memory.
//! - `cancel_download` aborts the transfer and deletes the partial file.
//!
//! ## Concurrency
//!
//! All access to the in-memory request map goes through one async mutex.
//! Reconciliation and cancellation both start by *claiming* the record: it is
//! removed from the map and its persisted row deleted while the lock is held.
//! Whichever path claims first wins; the other finds nothing and returns.
//! Submission also holds the lock until the record is stored, so a terminal
//! signal for a fresh handle cannot overtake its own bookkeeping.
//!
//! The coordinator does not deduplicate requests. Callers check
//! [`DownloadCoordinator::is_downloading`] first.

use crate::error::{OfflineError, Result};
use crate::models::{destination_filename, DownloadRequest, DownloadStatus, ResourceType};
use crate::registry::ResourceRegistry;
use crate::repositories::DownloadRequestRepository;
use bridge_traits::{
    Clock, NetworkConstraint, NetworkMonitor, TransferHandle, TransferRequest, TransferStatus,
    Transport,
};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Default number of requests issued by one folder download.
pub const DEFAULT_FOLDER_DOWNLOAD_LIMIT: usize = 3;

/// Number of recently cancelled handles remembered for [`DownloadCoordinator::status`].
pub const CANCELLED_HISTORY_LIMIT: usize = 128;

struct CoordinatorState {
    active: HashMap<TransferHandle, DownloadRequest>,
    /// Oldest first
    cancelled: VecDeque<TransferHandle>,
}

impl CoordinatorState {
    fn remember_cancelled(&mut self, handle: TransferHandle) {
        if self.cancelled.len() == CANCELLED_HISTORY_LIMIT {
            self.cancelled.pop_front();
        }
        self.cancelled.push_back(handle);
    }
}

pub struct DownloadCoordinator {
    registry: Arc<ResourceRegistry>,
    repository: Arc<dyn DownloadRequestRepository>,
    transport: Arc<dyn Transport>,
    network_monitor: Arc<dyn NetworkMonitor>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    folder_download_limit: usize,
    resume_restored: bool,
    state: Mutex<CoordinatorState>,
}

impl DownloadCoordinator {
    /// Create a coordinator and load every persisted request into memory.
    pub async fn new(
        registry: Arc<ResourceRegistry>,
        repository: Arc<dyn DownloadRequestRepository>,
        transport: Arc<dyn Transport>,
        network_monitor: Arc<dyn NetworkMonitor>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let restored = repository.list().await?;
        if !restored.is_empty() {
            info!(count = restored.len(), "Restored in-flight downloads");
        }

        let state = CoordinatorState {
            active: restored.into_iter().map(|r| (r.handle, r)).collect(),
            cancelled: VecDeque::with_capacity(CANCELLED_HISTORY_LIMIT),
        };

        Ok(Self {
            registry,
            repository,
            transport,
            network_monitor,
            clock,
            event_bus,
            folder_download_limit: DEFAULT_FOLDER_DOWNLOAD_LIMIT,
            resume_restored: true,
            state: Mutex::new(state),
        })
    }

    pub fn with_folder_download_limit(mut self, limit: usize) -> Self {
        self.folder_download_limit = limit.max(1);
        self
    }

    /// Whether `reconcile_restored` resubmits transfers the transport no longer knows.
    pub fn with_resume_restored(mut self, resume: bool) -> Self {
        self.resume_restored = resume;
        self
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Queue a download of `url` into the directory for `resource_type`.
    ///
    /// # Returns
    /// - `Ok(Some(handle))` when a transfer was submitted
    /// - `Ok(None)` when the resource is already available; a `Completed`
    ///   event with `already_available = true` is emitted instead
    ///
    /// # Errors
    /// - `InvalidInput` for an empty url
    /// - `NetworkUnavailable` when `wifi_only` is set and WiFi is not connected
    /// - `TransferFailed` when the transport rejects the submission
    /// - a storage error when the request cannot be persisted
    #[instrument(skip(self, title), fields(resource_type = %resource_type))]
    pub async fn request_download(
        &self,
        url: &str,
        title: &str,
        resource_type: ResourceType,
        wifi_only: bool,
    ) -> Result<Option<TransferHandle>> {
        if url.is_empty() {
            return Err(OfflineError::invalid_input("url", "url cannot be empty"));
        }

        if self.registry.is_available(url).await {
            debug!("Resource already available offline");
            let local_path = self
                .registry
                .lookup(url)
                .await
                .map(|r| r.local_path.display().to_string())
                .unwrap_or_default();

            self.event_bus
                .emit(CoreEvent::Download(DownloadEvent::Completed {
                    handle: None,
                    url: url.to_string(),
                    local_path,
                    already_available: true,
                }))
                .ok();
            return Ok(None);
        }

        if wifi_only && !self.network_monitor.is_wifi().await {
            warn!("WiFi required but not connected");
            return Err(OfflineError::NetworkUnavailable(
                "WiFi connection required".to_string(),
            ));
        }

        let filename =
            destination_filename(url, resource_type, self.clock.unix_timestamp_millis());
        let destination = self.registry.directory_for(resource_type).await?.join(filename);

        let transfer = TransferRequest::new(url, destination.clone())
            .with_constraint(NetworkConstraint::from_wifi_only(wifi_only))
            .with_title(title);

        let request = {
            let mut state = self.state.lock().await;

            let handle = self
                .transport
                .submit(transfer)
                .await
                .map_err(|e| OfflineError::TransferFailed(e.to_string()))?;

            let request = DownloadRequest {
                handle,
                url: url.to_string(),
                title: title.to_string(),
                resource_type,
                destination,
                started_at: self.clock.now(),
                wifi_only,
            };

            if let Err(e) = self.repository.insert(&request).await {
                error!(%handle, error = %e, "Failed to persist download request");
                if let Err(cancel_err) = self.transport.cancel(handle).await {
                    warn!(%handle, error = %cancel_err, "Failed to cancel unpersisted transfer");
                }
                return Err(e);
            }

            state.active.insert(handle, request.clone());
            request
        };

        info!(
            handle = %request.handle,
            destination = %request.destination.display(),
            "Download started"
        );
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Started {
                handle: request.handle,
                url: request.url,
                title: request.title,
            }))
            .ok();

        Ok(Some(request.handle))
    }

    /// Download up to the folder limit of `urls` as photos.
    ///
    /// Requests that fail or are already available are skipped and do not
    /// count towards the limit. The remainder is not queued; callers invoke
    /// this again as earlier transfers complete.
    #[instrument(skip(self, urls), fields(total = urls.len()))]
    pub async fn request_folder_download(
        &self,
        folder_name: &str,
        urls: &[String],
        wifi_only: bool,
    ) -> Vec<TransferHandle> {
        let mut handles = Vec::new();

        for url in urls {
            let title = format!("{} - Image {}", folder_name, handles.len() + 1);

            match self
                .request_download(url, &title, ResourceType::Photo, wifi_only)
                .await
            {
                Ok(Some(handle)) => handles.push(handle),
                Ok(None) => {}
                Err(e) => warn!(%url, error = %e, "Skipping folder item"),
            }

            if handles.len() >= self.folder_download_limit {
                break;
            }
        }

        handles
    }

    /// Download every `(url, title)` pair of an audio category.
    #[instrument(skip(self, files), fields(total = files.len()))]
    pub async fn download_audio_category(
        &self,
        category: &str,
        files: &[(String, String)],
        wifi_only: bool,
    ) -> Vec<TransferHandle> {
        let mut handles = Vec::new();

        for (url, title) in files {
            let title = format!("{category} - {title}");

            match self
                .request_download(url, &title, ResourceType::Audio, wifi_only)
                .await
            {
                Ok(Some(handle)) => handles.push(handle),
                Ok(None) => {}
                Err(e) => warn!(%url, error = %e, "Skipping audio item"),
            }
        }

        handles
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Reconcile a transfer the transport reports as finished.
    ///
    /// Unknown or already claimed handles are ignored. On success the resource
    /// is recorded in the registry; on failure a `Failed` event carries the
    /// transport's reason. The persisted request is removed either way.
    #[instrument(skip(self))]
    pub async fn on_transfer_terminal(&self, handle: TransferHandle) -> Result<()> {
        let Some(request) = self.claim(handle, false).await? else {
            debug!("No download request for handle");
            return Ok(());
        };

        let status = match self.transport.query(handle).await {
            Ok(snapshot) => snapshot.status,
            Err(e) => TransferStatus::Failed {
                reason: e.to_string(),
            },
        };

        match status {
            TransferStatus::Successful => {
                self.registry
                    .record(&request.url, &request.destination, request.resource_type)
                    .await
                    .map_err(|e| {
                        error!(url = %request.url, error = %e, "Downloaded file could not be recorded");
                        e
                    })?;

                info!(url = %request.url, "Download completed");
                self.event_bus
                    .emit(CoreEvent::Download(DownloadEvent::Completed {
                        handle: Some(handle),
                        url: request.url,
                        local_path: request.destination.display().to_string(),
                        already_available: false,
                    }))
                    .ok();
            }
            other => {
                let reason = match other {
                    TransferStatus::Failed { reason } => reason,
                    _ => "Download failed".to_string(),
                };

                warn!(url = %request.url, %reason, "Download failed");
                self.event_bus
                    .emit(CoreEvent::Download(DownloadEvent::Failed {
                        handle,
                        url: request.url,
                        reason,
                    }))
                    .ok();
            }
        }

        Ok(())
    }

    /// Abort a transfer and delete its partial file.
    ///
    /// Unknown handles, including ones already reconciled, are a no-op.
    #[instrument(skip(self))]
    pub async fn cancel_download(&self, handle: TransferHandle) -> Result<()> {
        let Some(request) = self.claim(handle, true).await? else {
            debug!("Cancel for unknown handle ignored");
            return Ok(());
        };

        if let Err(e) = self.transport.cancel(handle).await {
            warn!(error = %e, "Transport cancel failed");
        }

        match self
            .registry
            .file_system()
            .delete_file(&request.destination)
            .await
        {
            Ok(()) => debug!(path = %request.destination.display(), "Deleted partial file"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(error = %e, "Failed to delete partial file"),
        }

        info!(url = %request.url, "Download cancelled");
        self.event_bus
            .emit(CoreEvent::Download(DownloadEvent::Cancelled {
                handle,
                url: request.url,
            }))
            .ok();

        Ok(())
    }

    pub async fn cancel_all_downloads(&self) -> Result<()> {
        let handles: Vec<TransferHandle> = self.state.lock().await.active.keys().copied().collect();

        for handle in handles {
            self.cancel_download(handle).await?;
        }

        Ok(())
    }

    /// Query every restored request and settle what the transport reports.
    ///
    /// Terminal transfers are reconciled now. Transfers the transport does not
    /// know are resubmitted to the same destination (when enabled) and their
    /// records moved to the new handle. A request that cannot be settled is
    /// logged and skipped.
    ///
    /// # Returns
    /// Number of requests reconciled or resubmitted.
    #[instrument(skip(self))]
    pub async fn reconcile_restored(&self) -> Result<usize> {
        let restored: Vec<DownloadRequest> =
            self.state.lock().await.active.values().cloned().collect();
        let mut settled = 0;

        for request in restored {
            let snapshot = match self.transport.query(request.handle).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(handle = %request.handle, error = %e, "Cannot query restored transfer");
                    continue;
                }
            };

            let handle = request.handle;
            if snapshot.status.is_terminal() {
                match self.on_transfer_terminal(handle).await {
                    Ok(()) => settled += 1,
                    Err(e) => warn!(%handle, error = %e, "Cannot reconcile restored transfer"),
                }
            } else if snapshot.status == TransferStatus::Unknown && self.resume_restored {
                match self.resubmit(request).await {
                    Ok(true) => settled += 1,
                    Ok(false) => {}
                    Err(e) => warn!(%handle, error = %e, "Cannot resubmit restored transfer"),
                }
            }
        }

        Ok(settled)
    }

    async fn resubmit(&self, request: DownloadRequest) -> Result<bool> {
        let mut state = self.state.lock().await;

        // Claimed while we were querying
        if !state.active.contains_key(&request.handle) {
            return Ok(false);
        }

        let transfer = TransferRequest::new(&request.url, request.destination.clone())
            .with_constraint(NetworkConstraint::from_wifi_only(request.wifi_only))
            .with_title(&request.title)
            .with_resume();

        let new_handle = self
            .transport
            .submit(transfer)
            .await
            .map_err(|e| OfflineError::TransferFailed(e.to_string()))?;

        self.repository.rekey(request.handle, new_handle).await?;

        state.active.remove(&request.handle);
        info!(old = %request.handle, new = %new_handle, url = %request.url, "Resubmitted restored download");
        state.active.insert(
            new_handle,
            DownloadRequest {
                handle: new_handle,
                ..request
            },
        );

        Ok(true)
    }

    /// Remove the record for `handle` from memory and storage.
    async fn claim(&self, handle: TransferHandle, cancelling: bool) -> Result<Option<DownloadRequest>> {
        let mut state = self.state.lock().await;

        let request = match state.active.remove(&handle) {
            Some(request) => Some(request),
            None => self.repository.find(handle).await?,
        };

        if request.is_some() {
            if let Err(e) = self.repository.delete(handle).await {
                warn!(%handle, error = %e, "Failed to delete persisted download request");
            }
            if cancelling {
                state.remember_cancelled(handle);
            }
        }

        Ok(request)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// True iff an in-flight request exists for `url`.
    pub async fn is_downloading(&self, url: &str) -> bool {
        self.state
            .lock()
            .await
            .active
            .values()
            .any(|request| request.url == url)
    }

    /// In-flight requests, oldest first.
    pub async fn active_downloads(&self) -> Vec<DownloadRequest> {
        let mut requests: Vec<DownloadRequest> =
            self.state.lock().await.active.values().cloned().collect();
        requests.sort_by_key(|r| (r.started_at, r.handle));
        requests
    }

    /// Completion percentage of a tracked transfer; 0 while the size is unknown.
    pub async fn progress(&self, handle: TransferHandle) -> Option<u8> {
        if !self.state.lock().await.active.contains_key(&handle) {
            return None;
        }

        match self.transport.query(handle).await {
            Ok(snapshot) => Some(snapshot.percent()),
            Err(e) => {
                debug!(%handle, error = %e, "Progress query failed");
                None
            }
        }
    }

    pub async fn status(&self, handle: TransferHandle) -> DownloadStatus {
        if self.state.lock().await.cancelled.contains(&handle) {
            return DownloadStatus::Cancelled;
        }

        match self.transport.query(handle).await {
            Ok(snapshot) => DownloadStatus::from(&snapshot.status),
            Err(_) => DownloadStatus::Unknown,
        }
    }

    /// Emit a `Progress` event for every running transfer.
    ///
    /// # Returns
    /// Number of events emitted.
    pub async fn poll_progress(&self) -> usize {
        let active: Vec<(TransferHandle, String)> = self
            .state
            .lock()
            .await
            .active
            .values()
            .map(|r| (r.handle, r.url.clone()))
            .collect();

        let mut emitted = 0;
        for (handle, url) in active {
            let Ok(snapshot) = self.transport.query(handle).await else {
                continue;
            };

            if snapshot.status.is_terminal() || snapshot.status == TransferStatus::Unknown {
                continue;
            }

            self.event_bus
                .emit(CoreEvent::Download(DownloadEvent::Progress {
                    handle,
                    url,
                    percent: snapshot.percent(),
                }))
                .ok();
            emitted += 1;
        }

        emitted
    }
}
