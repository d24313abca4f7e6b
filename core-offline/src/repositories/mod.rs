//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations for the offline store.
//!
//! - `ResourceRepository` - url → local file mapping plus priority pins
//! - `DownloadRequestRepository` - in-flight transfers keyed by transport handle

pub mod download_request;
pub mod resource;

pub use download_request::{DownloadRequestRepository, SqliteDownloadRequestRepository};
pub use resource::{ResourceRepository, SqliteResourceRepository};
