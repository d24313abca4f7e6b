//! # Retention Policy
//!
//! Bulk and age-based eviction over resources tracked by the
//! [`ResourceRegistry`], respecting priority pins.
//!
//! Every eviction deletes the file first and only then removes the registry
//! entry. A crash in between leaves a dangling entry, which the registry's
//! availability check already treats as missing. If a file cannot be deleted,
//! its entry is kept and the sweep moves on.

use crate::error::Result;
use crate::models::TrackedResource;
use crate::registry::ResourceRegistry;
use bridge_traits::Clock;
use chrono::Duration;
use core_runtime::events::{CoreEvent, EventBus, StorageEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct RetentionPolicy {
    registry: Arc<ResourceRegistry>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl RetentionPolicy {
    pub fn new(registry: Arc<ResourceRegistry>, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self {
            registry,
            clock,
            event_bus,
        }
    }

    /// Evict every tracked resource. Priority resources are kept unless
    /// `include_priority` is set.
    ///
    /// # Returns
    /// Number of registry entries removed.
    #[instrument(skip(self))]
    pub async fn clear_all(&self, include_priority: bool) -> Result<u64> {
        let mut removed = 0;

        for resource in self.registry.entries().await? {
            if !include_priority && resource.is_priority {
                continue;
            }

            if self.evict(&resource).await? {
                removed += 1;
            }
        }

        info!(removed, include_priority, "Cleared offline storage");
        self.event_bus
            .emit(CoreEvent::Storage(StorageEvent::Cleared {
                removed,
                include_priority,
            }))
            .ok();

        Ok(removed)
    }

    /// Evict non-priority resources whose file was last modified before
    /// `now - days * 24h`.
    ///
    /// Entries whose file is already gone or has no modification time are
    /// left for the registry's own existence checks.
    #[instrument(skip(self))]
    pub async fn clear_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = (self.clock.now() - Duration::days(i64::from(days))).timestamp();
        let fs = self.registry.file_system();
        let mut removed = 0;

        for resource in self.registry.entries().await? {
            if resource.is_priority {
                continue;
            }

            let Some(path) = self.registry.resolve_existing(&resource).await else {
                continue;
            };

            let modified_at = match fs.metadata(&path).await {
                Ok(meta) => meta.modified_at,
                Err(e) => {
                    warn!(url = %resource.url, error = %e, "Cannot read file age");
                    None
                }
            };

            if matches!(modified_at, Some(mtime) if mtime < cutoff) && self.evict(&resource).await? {
                removed += 1;
            }
        }

        info!(removed, older_than_days = days, "Evicted stale offline resources");
        self.event_bus
            .emit(CoreEvent::Storage(StorageEvent::StaleEvicted {
                removed,
                older_than_days: days,
            }))
            .ok();

        Ok(removed)
    }

    /// Delete the backing file, then the registry entry.
    ///
    /// Returns `Ok(false)` when the file could not be deleted.
    async fn evict(&self, resource: &TrackedResource) -> Result<bool> {
        if let Some(path) = self.registry.resolve_existing(resource).await {
            if let Err(e) = self.registry.file_system().delete_file(&path).await {
                if !e.is_not_found() {
                    warn!(url = %resource.url, error = %e, "Failed to delete offline file");
                    return Ok(false);
                }
            }
            debug!(path = %path.display(), "Deleted offline file");
        }

        self.registry.remove(&resource.url).await
    }
}
