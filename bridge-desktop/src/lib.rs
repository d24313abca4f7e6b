//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides implementations of the bridge traits the offline core
//! can run on without host injection:
//! - `Transport` using `reqwest` with `Range` resume and retry/backoff
//! - `FileSystemAccess` using `tokio::fs`
//! - `NetworkMonitor` using sysfs interface inspection with a reachability fallback
//!
//! A `MediaPlayer` is not provided; audio output stays with the host.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestTransport, TokioFileSystem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let monitor = Arc::new(DesktopNetworkMonitor::new());
//!     let transport = ReqwestTransport::new()?
//!         .with_network_monitor(monitor.clone(), std::time::Duration::from_secs(5));
//!     let fs = TokioFileSystem::new();
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod filesystem;
mod network;
mod transport;

pub use filesystem::TokioFileSystem;
pub use network::DesktopNetworkMonitor;
pub use transport::ReqwestTransport;
