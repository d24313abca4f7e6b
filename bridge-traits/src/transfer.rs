//! Transfer (download transport) abstraction.
//!
//! A transport performs network transfers on its own workers and outlives any
//! single request call: the core submits a transfer, receives an opaque
//! [`TransferHandle`], and later learns about terminal states through a
//! [`TerminalSignalStream`]. Android's DownloadManager and the desktop
//! reqwest transport both fit this shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::{error::Result, network::NetworkConstraint};

/// Opaque transfer identifier issued by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferHandle(pub i64);

impl TransferHandle {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A transfer to be performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    /// Final location of the downloaded file
    pub destination: PathBuf,
    pub constraint: NetworkConstraint,
    /// Display title for host notifications
    pub title: Option<String>,
    /// Continue a partial file already at `destination` instead of replacing it
    pub resume: bool,
}

impl TransferRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            constraint: NetworkConstraint::Any,
            title: None,
            resume: false,
        }
    }

    pub fn with_constraint(mut self, constraint: NetworkConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Mark the request as the continuation of an interrupted transfer.
    pub fn with_resume(mut self) -> Self {
        self.resume = true;
        self
    }
}

/// Transport-side status of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Running,
    /// Waiting for the network constraint or a retry window
    Paused,
    Successful,
    Failed { reason: String },
    /// The transport has no record of the handle
    Unknown,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Successful | TransferStatus::Failed { .. }
        )
    }
}

/// Point-in-time view of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub status: TransferStatus,
    pub bytes_done: u64,
    /// Total size, when the server announced it
    pub bytes_total: Option<u64>,
}

impl TransferSnapshot {
    pub fn unknown() -> Self {
        Self {
            status: TransferStatus::Unknown,
            bytes_done: 0,
            bytes_total: None,
        }
    }

    /// Whole-number completion percentage; 0 while the total is unknown.
    pub fn percent(&self) -> u8 {
        match self.bytes_total {
            Some(total) if total > 0 => {
                let pct = self.bytes_done.saturating_mul(100) / total;
                pct.min(100) as u8
            }
            _ => 0,
        }
    }
}

/// Retry policy for transport requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = if self.use_exponential_backoff {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        } else {
            self.base_delay
        };
        delay.min(self.max_delay)
    }
}

/// Stream of handles that reached a terminal state
#[async_trait]
pub trait TerminalSignalStream: Send {
    /// Get the next terminal handle
    ///
    /// Returns `None` when the transport has shut down.
    async fn next(&mut self) -> Option<TransferHandle>;
}

/// Network transfer capability.
///
/// # Example
///
/// ```ignore
/// let handle = transport
///     .submit(TransferRequest::new(url, dest).with_constraint(NetworkConstraint::WifiOnly))
///     .await?;
/// let snapshot = transport.query(handle).await?;
/// println!("{}%", snapshot.percent());
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue a transfer and return its handle without waiting for it.
    async fn submit(&self, request: TransferRequest) -> Result<TransferHandle>;

    /// Current status. Unknown handles report [`TransferStatus::Unknown`].
    async fn query(&self, handle: TransferHandle) -> Result<TransferSnapshot>;

    /// Abort a transfer. Cancelling an unknown or finished handle is a no-op.
    async fn cancel(&self, handle: TransferHandle) -> Result<()>;

    /// Subscribe to terminal-state notifications.
    fn subscribe_terminal(&self) -> Result<Box<dyn TerminalSignalStream>>;
}
