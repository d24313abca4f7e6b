//! # Offline Resource Lifecycle
//!
//! Download, registry and retention management for content cached offline.
//!
//! ## Overview
//!
//! - [`ResourceRegistry`] maps content URLs to local files and answers "is
//!   this available offline", re-checking the file system on every call.
//! - [`DownloadCoordinator`] submits transfers to the host transport, persists
//!   in-flight requests so they survive a restart, and reconciles terminal
//!   transfers into the registry.
//! - [`RetentionPolicy`] evicts tracked files in bulk or by age, never touching
//!   priority resources unless asked to.
//!
//! State is stored in SQLite through the repositories in [`repositories`];
//! see [`db`] for pool setup and migrations.

pub mod coordinator;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;
pub mod repositories;
pub mod retention;

pub use coordinator::{DownloadCoordinator, CANCELLED_HISTORY_LIMIT};
pub use error::{OfflineError, Result};
pub use models::{
    format_file_size, DownloadRequest, DownloadStatus, OfflineCategory, ResourceType,
    TrackedResource,
};
pub use registry::ResourceRegistry;
pub use retention::RetentionPolicy;
