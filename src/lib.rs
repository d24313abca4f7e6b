//! Workspace umbrella crate.
//!
//! Host applications can depend on `offline-media-workspace` and get the
//! service façade with the desktop adapters enabled, instead of wiring
//! `core-service`, `core-offline` and `core-playback` individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, CoreService, Result};
