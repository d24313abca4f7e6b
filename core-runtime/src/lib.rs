//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline media core:
//! - Logging and tracing infrastructure
//! - Configuration management and capability injection
//! - Event bus system for download, playback and storage events
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the offline and playback
//! crates depend on. It establishes the logging conventions, the fail-fast
//! configuration builder and the broadcast event bus used throughout the
//! system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use events::{CoreEvent, DownloadEvent, EventBus, EventStream, PlaybackEvent, StorageEvent};
