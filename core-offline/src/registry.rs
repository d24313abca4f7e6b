//! # Resource Registry
//!
//! Durable mapping from content URL to the local file that backs it, and the
//! source of truth for "is this available offline".
//!
//! ## Overview
//!
//! The registry never trusts its own rows: every availability check probes the
//! file system again, because files can disappear out-of-band. When a stored
//! path is gone, the legacy naming scheme (`Offline/<folder>/<url tail>`) is
//! tried before the resource is reported missing.
//!
//! Files live under `<storage_root>/Offline/{photos,comics,audios,json}`.
//! Directories are created on first access.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = ResourceRegistry::new(repo, fs, clock, "/data", event_bus);
//!
//! registry.record(url, &path, ResourceType::Audio).await?;
//! assert!(registry.is_available(url).await);
//! ```

use crate::error::{OfflineError, Result};
use crate::models::{legacy_filename, OfflineCategory, ResourceType, TrackedResource};
use crate::repositories::ResourceRepository;
use bridge_traits::{Clock, FileSystemAccess};
use core_runtime::events::{CoreEvent, EventBus, StorageEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Name of the directory that holds every offline type folder.
pub const OFFLINE_DIR_NAME: &str = "Offline";

pub struct ResourceRegistry {
    repository: Arc<dyn ResourceRepository>,
    file_system: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    offline_root: PathBuf,
    event_bus: EventBus,
}

impl ResourceRegistry {
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        file_system: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        storage_root: impl AsRef<Path>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            file_system,
            clock,
            offline_root: storage_root.as_ref().join(OFFLINE_DIR_NAME),
            event_bus,
        }
    }

    pub fn offline_root(&self) -> &Path {
        &self.offline_root
    }

    pub(crate) fn file_system(&self) -> &Arc<dyn FileSystemAccess> {
        &self.file_system
    }

    // ========================================================================
    // Availability
    // ========================================================================

    /// True iff a mapping exists and its file exists with non-zero length.
    ///
    /// Never fails; an unreadable mapping or file counts as unavailable.
    #[instrument(skip(self))]
    pub async fn is_available(&self, url: &str) -> bool {
        let Some(resource) = self.find_mapping(url).await else {
            return false;
        };

        match self.resolve_existing(&resource).await {
            Some(path) => self.file_len(&path).await.is_some_and(|len| len > 0),
            None => false,
        }
    }

    /// Mapping for `url` with its path resolved against the file system.
    ///
    /// If the stored path is missing but the legacy location exists, the
    /// returned entry points at the legacy file. If neither exists the stored
    /// path is returned unchanged.
    pub async fn lookup(&self, url: &str) -> Option<TrackedResource> {
        let mut resource = self.find_mapping(url).await?;

        if let Some(path) = self.resolve_existing(&resource).await {
            resource.local_path = path;
        }

        Some(resource)
    }

    /// Existing local file backing `url`, if any.
    pub async fn local_file(&self, url: &str) -> Option<PathBuf> {
        let resource = self.find_mapping(url).await?;
        self.resolve_existing(&resource).await
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert or overwrite the mapping for `url`.
    ///
    /// The file itself is not touched; a previously mapped file stays on disk.
    #[instrument(skip(self, local_path), fields(path = %local_path.display()))]
    pub async fn record(
        &self,
        url: &str,
        local_path: &Path,
        resource_type: ResourceType,
    ) -> Result<()> {
        if url.is_empty() {
            return Err(OfflineError::invalid_input("url", "url cannot be empty"));
        }

        let resource = TrackedResource {
            url: url.to_string(),
            local_path: local_path.to_path_buf(),
            resource_type,
            is_priority: false,
            recorded_at: self.clock.now(),
        };

        self.repository.upsert(&resource).await.map_err(storage_error)?;

        info!(%resource_type, "Recorded offline resource");
        self.event_bus
            .emit(CoreEvent::Storage(StorageEvent::ResourceRecorded {
                url: url.to_string(),
                resource_type: resource_type.to_string(),
            }))
            .ok();

        Ok(())
    }

    /// Delete the mapping and clear the priority pin. The file is left alone.
    ///
    /// # Returns
    /// `true` if a mapping existed.
    #[instrument(skip(self))]
    pub async fn remove(&self, url: &str) -> Result<bool> {
        let removed = self.repository.delete(url).await.map_err(storage_error)?;

        if removed {
            debug!("Removed offline resource mapping");
            self.event_bus
                .emit(CoreEvent::Storage(StorageEvent::ResourceRemoved {
                    url: url.to_string(),
                }))
                .ok();
        }

        Ok(removed)
    }

    /// Exempt `url` from eviction. Works whether or not `url` is present.
    #[instrument(skip(self))]
    pub async fn mark_priority(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(OfflineError::invalid_input("url", "url cannot be empty"));
        }

        self.repository
            .mark_priority(url, self.clock.now())
            .await
            .map_err(storage_error)
    }

    pub async fn is_priority(&self, url: &str) -> bool {
        self.repository.is_priority(url).await.unwrap_or_else(|e| {
            warn!(%url, error = %e, "Priority lookup failed");
            false
        })
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Every stored mapping, unverified.
    pub async fn entries(&self) -> Result<Vec<TrackedResource>> {
        self.repository.list().await
    }

    /// URLs of the given type that are currently available.
    #[instrument(skip(self))]
    pub async fn list_by_type(&self, resource_type: ResourceType) -> Vec<String> {
        let entries = match self.repository.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list offline resources");
                return Vec::new();
            }
        };

        let mut urls = Vec::new();
        for resource in entries
            .into_iter()
            .filter(|r| r.resource_type == resource_type)
        {
            if self.is_available(&resource.url).await {
                urls.push(resource.url);
            }
        }

        debug!(count = urls.len(), "Listed offline resources");
        urls
    }

    /// One summary per type, in `ResourceType::ALL` order.
    pub async fn categories(&self) -> Result<Vec<OfflineCategory>> {
        let mut categories = Vec::with_capacity(ResourceType::ALL.len());

        for resource_type in ResourceType::ALL {
            categories.push(OfflineCategory {
                name: resource_type.display_name().to_string(),
                item_count: self.list_by_type(resource_type).await.len(),
                total_size: self.size_for(resource_type).await?,
                resource_type,
            });
        }

        Ok(categories)
    }

    // ========================================================================
    // Directories and sizes
    // ========================================================================

    /// Directory for `resource_type`, created if absent.
    pub async fn directory_for(&self, resource_type: ResourceType) -> Result<PathBuf> {
        let dir = self.offline_root.join(resource_type.folder_name());

        if !self.file_system.exists(&dir).await.unwrap_or(false) {
            self.file_system
                .create_dir_all(&dir)
                .await
                .map_err(storage_error)?;
            debug!(path = %dir.display(), "Created offline directory");
        }

        Ok(dir)
    }

    /// Bytes stored under every type directory.
    pub async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for resource_type in ResourceType::ALL {
            total += self.size_for(resource_type).await?;
        }
        Ok(total)
    }

    /// Bytes stored under the directory for `resource_type`, recursively.
    pub async fn size_for(&self, resource_type: ResourceType) -> Result<u64> {
        let dir = self.directory_for(resource_type).await?;
        self.file_system
            .directory_size(&dir)
            .await
            .map_err(storage_error)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn find_mapping(&self, url: &str) -> Option<TrackedResource> {
        if url.is_empty() {
            return None;
        }

        match self.repository.find(url).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%url, error = %e, "Registry lookup failed");
                None
            }
        }
    }

    /// Stored path if it exists, else the legacy location if that exists.
    pub(crate) async fn resolve_existing(&self, resource: &TrackedResource) -> Option<PathBuf> {
        if self.path_exists(&resource.local_path).await {
            return Some(resource.local_path.clone());
        }

        debug!(
            path = %resource.local_path.display(),
            "Stored path missing, trying legacy location"
        );

        let legacy = self
            .offline_root
            .join(ResourceType::detect(&resource.url).folder_name())
            .join(legacy_filename(&resource.url));

        self.path_exists(&legacy).await.then_some(legacy)
    }

    async fn path_exists(&self, path: &Path) -> bool {
        self.file_system.exists(path).await.unwrap_or(false)
    }

    async fn file_len(&self, path: &Path) -> Option<u64> {
        match self.file_system.metadata(path).await {
            Ok(meta) if !meta.is_directory => Some(meta.size),
            _ => None,
        }
    }
}

fn storage_error(e: impl std::fmt::Display) -> OfflineError {
    OfflineError::Storage(e.to_string())
}
