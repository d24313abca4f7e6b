//! Transfer transport implementation using Reqwest
//!
//! Each submitted transfer runs on its own Tokio task. Transfers write straight
//! to their destination. A fresh request replaces whatever file is already
//! there; retries within a transfer, and requests marked with
//! [`TransferRequest::with_resume`], continue the partial body with an HTTP
//! `Range` request.
//!
//! Finished transfers stay queryable for a retention window and are pruned
//! on the next submission after it expires.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    network::{NetworkConstraint, NetworkMonitor},
    transfer::{
        RetryPolicy, TerminalSignalStream, TransferHandle, TransferRequest, TransferSnapshot,
        TransferStatus, Transport,
    },
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::{header, Client, StatusCode};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const TERMINAL_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_FINISHED_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Outcome of a single attempt that did not finish the transfer.
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Fatal(String),
    Cancelled,
}

struct TransferEntry {
    snapshot: TransferSnapshot,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
}

struct TransportInner {
    client: Client,
    retry_policy: RetryPolicy,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    network_poll_interval: Duration,
    finished_retention: Duration,
    transfers: Mutex<HashMap<TransferHandle, TransferEntry>>,
    terminal_tx: broadcast::Sender<TransferHandle>,
}

/// Reqwest-based transport
///
/// Provides:
/// - Background transfers with pollable progress
/// - `Range` resume of partially written files
/// - Retry with exponential backoff on connection errors, 5xx and 429
/// - WiFi-only transfers held in `Paused` until the monitor reports WiFi
pub struct ReqwestTransport {
    inner: Arc<TransportInner>,
    next_handle: AtomicI64,
}

impl ReqwestTransport {
    /// Create a transport with default client settings and retry policy
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("offline-media-core/0.1.0")
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client init failed: {e}")))?;

        Ok(Self::with_client(client))
    }

    /// Create a transport around an existing client
    pub fn with_client(client: Client) -> Self {
        let (terminal_tx, _) = broadcast::channel(TERMINAL_CHANNEL_CAPACITY);

        // Handles are seeded from the wall clock so a fresh process does not
        // reissue handles still referenced by persisted download records.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(1);

        Self {
            inner: Arc::new(TransportInner {
                client,
                retry_policy: RetryPolicy::default(),
                network_monitor: None,
                network_poll_interval: Duration::from_secs(5),
                finished_retention: DEFAULT_FINISHED_RETENTION,
                transfers: Mutex::new(HashMap::new()),
                terminal_tx,
            }),
            next_handle: AtomicI64::new(seed),
        }
    }

    /// Set the retry policy. Must be called before the transport is shared.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry_policy = policy;
        }
        self
    }

    /// How long a finished transfer stays queryable before it is pruned.
    pub fn with_finished_retention(mut self, retention: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.finished_retention = retention;
        }
        self
    }

    /// Gate constrained transfers on a network monitor.
    pub fn with_network_monitor(
        mut self,
        monitor: Arc<dyn NetworkMonitor>,
        poll_interval: Duration,
    ) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.network_monitor = Some(monitor);
            inner.network_poll_interval = poll_interval;
        }
        self
    }
}

impl TransportInner {
    fn update(&self, handle: TransferHandle, f: impl FnOnce(&mut TransferSnapshot)) {
        if let Some(entry) = self.transfers.lock().get_mut(&handle) {
            f(&mut entry.snapshot);
        }
    }

    fn finish(&self, handle: TransferHandle, status: TransferStatus) {
        let known = {
            let mut transfers = self.transfers.lock();
            match transfers.get_mut(&handle) {
                Some(entry) => {
                    entry.snapshot.status = status;
                    entry.finished_at = Some(Instant::now());
                    true
                }
                None => false,
            }
        };

        // A cancelled transfer has already been dropped from the table.
        if known {
            // No receivers is fine; the status stays queryable.
            let _ = self.terminal_tx.send(handle);
        }
    }

    /// Wait until the request's network constraint holds.
    ///
    /// Returns `false` if the transfer was cancelled while waiting.
    async fn await_network(
        &self,
        handle: TransferHandle,
        constraint: NetworkConstraint,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(monitor) = &self.network_monitor else {
            return true;
        };
        if constraint == NetworkConstraint::Any {
            return true;
        }

        loop {
            if let Ok(info) = monitor.get_network_info().await {
                if constraint.is_satisfied_by(&info) {
                    return true;
                }
            }

            self.update(handle, |s| s.status = TransferStatus::Paused);
            debug!(handle = %handle, "Waiting for unmetered network");

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.network_poll_interval) => {}
            }
        }
    }

    async fn run(self: Arc<Self>, handle: TransferHandle, request: TransferRequest, cancel: CancellationToken) {
        let mut attempt = 0;

        loop {
            if !self.await_network(handle, request.constraint, &cancel).await {
                return;
            }
            self.update(handle, |s| s.status = TransferStatus::Running);

            attempt += 1;
            let resume = request.resume || attempt > 1;
            match self.attempt(handle, &request, resume, &cancel).await {
                Ok(()) => {
                    info!(handle = %handle, url = %request.url, "Transfer completed");
                    self.finish(handle, TransferStatus::Successful);
                    return;
                }
                Err(AttemptError::Cancelled) => {
                    debug!(handle = %handle, "Transfer cancelled");
                    return;
                }
                Err(AttemptError::Retryable(reason)) if attempt < self.retry_policy.max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        handle = %handle,
                        attempt = attempt,
                        error = %reason,
                        delay_ms = delay.as_millis() as u64,
                        "Transfer attempt failed, retrying"
                    );
                    self.update(handle, |s| s.status = TransferStatus::Paused);

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(AttemptError::Retryable(reason)) | Err(AttemptError::Fatal(reason)) => {
                    warn!(handle = %handle, url = %request.url, error = %reason, "Transfer failed");
                    self.finish(handle, TransferStatus::Failed { reason });
                    return;
                }
            }
        }
    }

    async fn attempt(
        &self,
        handle: TransferHandle,
        request: &TransferRequest,
        resume: bool,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), AttemptError> {
        let destination = request.destination.as_path();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AttemptError::Fatal(format!("Cannot create directory: {e}")))?;
        }

        // Anything at a fresh request's destination belongs to some other
        // transfer and is overwritten below.
        let mut existing = if resume {
            existing_len(destination).await
        } else {
            0
        };

        let mut builder = self.client.get(&request.url);
        if existing > 0 {
            builder = builder.header(header::RANGE, format!("bytes={existing}-"));
            debug!(handle = %handle, offset = existing, "Resuming transfer");
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            result = builder.send() => result.map_err(|e| AttemptError::Retryable(e.to_string()))?,
        };

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            // The previous attempt already wrote the whole body.
            self.update(handle, |s| {
                s.bytes_done = existing;
                s.bytes_total = Some(existing);
            });
            return Ok(());
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Retryable(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(format!("HTTP {}", status.as_u16())));
        }

        if status != StatusCode::PARTIAL_CONTENT {
            // Server ignored the range; start over.
            existing = 0;
        }
        let total = response.content_length().map(|len| existing + len);
        self.update(handle, |s| {
            s.bytes_done = existing;
            s.bytes_total = total;
        });

        let mut file = if existing > 0 {
            fs::OpenOptions::new().append(true).open(destination).await
        } else {
            fs::File::create(destination).await
        }
        .map_err(|e| AttemptError::Fatal(format!("Cannot open destination: {e}")))?;

        let mut written = existing;
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| AttemptError::Retryable(e.to_string()))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| AttemptError::Fatal(format!("Write failed: {e}")))?;
            written += chunk.len() as u64;
            self.update(handle, |s| s.bytes_done = written);
        }

        file.flush()
            .await
            .map_err(|e| AttemptError::Fatal(format!("Flush failed: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| AttemptError::Fatal(format!("Sync failed: {e}")))?;

        Ok(())
    }
}

async fn existing_len(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn submit(&self, request: TransferRequest) -> Result<TransferHandle> {
        if request.url.is_empty() {
            return Err(BridgeError::OperationFailed("Empty transfer URL".to_string()));
        }

        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();

        {
            let mut transfers = self.inner.transfers.lock();
            let retention = self.inner.finished_retention;
            let before = transfers.len();
            transfers.retain(|_, entry| {
                entry
                    .finished_at
                    .map_or(true, |finished| finished.elapsed() < retention)
            });
            if transfers.len() < before {
                debug!(pruned = before - transfers.len(), "Pruned finished transfers");
            }

            transfers.insert(
                handle,
                TransferEntry {
                    snapshot: TransferSnapshot {
                        status: TransferStatus::Pending,
                        bytes_done: 0,
                        bytes_total: None,
                    },
                    cancel: cancel.clone(),
                    finished_at: None,
                },
            );
        }

        info!(handle = %handle, destination = ?request.destination, "Transfer queued");
        tokio::spawn(Arc::clone(&self.inner).run(handle, request, cancel));

        Ok(handle)
    }

    async fn query(&self, handle: TransferHandle) -> Result<TransferSnapshot> {
        Ok(self
            .inner
            .transfers
            .lock()
            .get(&handle)
            .map(|entry| entry.snapshot.clone())
            .unwrap_or_else(TransferSnapshot::unknown))
    }

    #[instrument(skip(self))]
    async fn cancel(&self, handle: TransferHandle) -> Result<()> {
        if let Some(entry) = self.inner.transfers.lock().remove(&handle) {
            entry.cancel.cancel();
            debug!(handle = %handle, "Transfer removed");
        }
        Ok(())
    }

    fn subscribe_terminal(&self) -> Result<Box<dyn TerminalSignalStream>> {
        Ok(Box::new(BroadcastTerminalStream {
            receiver: self.inner.terminal_tx.subscribe(),
        }))
    }
}

struct BroadcastTerminalStream {
    receiver: broadcast::Receiver<TransferHandle>,
}

#[async_trait]
impl TerminalSignalStream for BroadcastTerminalStream {
    async fn next(&mut self) -> Option<TransferHandle> {
        loop {
            match self.receiver.recv().await {
                Ok(handle) => return Some(handle),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Terminal signal receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DesktopNetworkMonitor;
    use bridge_traits::network::NetworkType;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            use_exponential_backoff: true,
        }
    }

    async fn next_terminal(stream: &mut Box<dyn TerminalSignalStream>) -> TransferHandle {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("terminal signal timed out")
            .expect("terminal stream closed")
    }

    #[tokio::test]
    async fn test_downloads_to_destination() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/photos/cat.jpg")
            .with_status(200)
            .with_body("cat-bytes")
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("photos").join("cat.jpg");
        let transport = ReqwestTransport::new().unwrap();
        let mut signals = transport.subscribe_terminal().unwrap();

        let handle = transport
            .submit(TransferRequest::new(
                format!("{}/photos/cat.jpg", server.url()),
                destination.clone(),
            ))
            .await
            .unwrap();

        assert_eq!(next_terminal(&mut signals).await, handle);
        let snapshot = transport.query(handle).await.unwrap();
        assert_eq!(snapshot.status, TransferStatus::Successful);
        assert_eq!(snapshot.bytes_done, 9);
        assert_eq!(snapshot.percent(), 100);
        assert_eq!(std::fs::read(&destination).unwrap(), b"cat-bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resumes_with_range_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/audio/song.mp3")
            .match_header("range", "bytes=4-")
            .with_status(206)
            .with_body("5678")
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("song.mp3");
        std::fs::write(&destination, b"1234").unwrap();

        let transport = ReqwestTransport::new().unwrap();
        let mut signals = transport.subscribe_terminal().unwrap();
        let handle = transport
            .submit(
                TransferRequest::new(format!("{}/audio/song.mp3", server.url()), destination.clone())
                    .with_resume(),
            )
            .await
            .unwrap();

        assert_eq!(next_terminal(&mut signals).await, handle);
        let snapshot = transport.query(handle).await.unwrap();
        assert_eq!(snapshot.status, TransferStatus::Successful);
        assert_eq!(snapshot.bytes_total, Some(8));
        assert_eq!(std::fs::read(&destination).unwrap(), b"12345678");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fresh_request_replaces_existing_file() {
        let mut server = Server::new_async().await;
        let ranged = server
            .mock("GET", "/f2/1.jpg")
            .match_header("range", Matcher::Regex("bytes=.*".to_string()))
            .with_status(416)
            .expect(0)
            .create_async()
            .await;
        let full = server
            .mock("GET", "/f2/1.jpg")
            .match_header("range", Matcher::Missing)
            .with_status(200)
            .with_body("NEW")
            .create_async()
            .await;

        // Left behind by another url that maps to the same file name
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("photos").join("1.jpg");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, b"stale-bytes-from-other-url").unwrap();

        let transport = ReqwestTransport::new().unwrap();
        let mut signals = transport.subscribe_terminal().unwrap();
        let handle = transport
            .submit(TransferRequest::new(
                format!("{}/f2/1.jpg", server.url()),
                destination.clone(),
            ))
            .await
            .unwrap();

        assert_eq!(next_terminal(&mut signals).await, handle);
        let snapshot = transport.query(handle).await.unwrap();
        assert_eq!(snapshot.status, TransferStatus::Successful);
        assert_eq!(snapshot.bytes_total, Some(3));
        assert_eq!(std::fs::read(&destination).unwrap(), b"NEW");
        full.assert_async().await;
        ranged.assert_async().await;
    }

    #[tokio::test]
    async fn test_finished_transfers_are_pruned() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/catalog.json")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let transport = ReqwestTransport::new()
            .unwrap()
            .with_finished_retention(Duration::ZERO);
        let mut signals = transport.subscribe_terminal().unwrap();

        let first = transport
            .submit(TransferRequest::new(
                format!("{}/catalog.json", server.url()),
                temp.path().join("first.json"),
            ))
            .await
            .unwrap();
        assert_eq!(next_terminal(&mut signals).await, first);
        assert_eq!(
            transport.query(first).await.unwrap().status,
            TransferStatus::Successful
        );

        let second = transport
            .submit(TransferRequest::new(
                format!("{}/catalog.json", server.url()),
                temp.path().join("second.json"),
            ))
            .await
            .unwrap();
        assert_eq!(next_terminal(&mut signals).await, second);

        assert_eq!(
            transport.query(first).await.unwrap().status,
            TransferStatus::Unknown
        );
        assert_eq!(transport.inner.transfers.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_fails() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky.json")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let transport = ReqwestTransport::new()
            .unwrap()
            .with_retry_policy(fast_retry(3));
        let mut signals = transport.subscribe_terminal().unwrap();

        let handle = transport
            .submit(TransferRequest::new(
                format!("{}/flaky.json", server.url()),
                temp.path().join("flaky.json"),
            ))
            .await
            .unwrap();

        assert_eq!(next_terminal(&mut signals).await, handle);
        let snapshot = transport.query(handle).await.unwrap();
        assert_eq!(
            snapshot.status,
            TransferStatus::Failed {
                reason: "HTTP 503".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.jpg")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let transport = ReqwestTransport::new()
            .unwrap()
            .with_retry_policy(fast_retry(3));
        let mut signals = transport.subscribe_terminal().unwrap();

        let handle = transport
            .submit(TransferRequest::new(
                format!("{}/missing.jpg", server.url()),
                temp.path().join("missing.jpg"),
            ))
            .await
            .unwrap();

        assert_eq!(next_terminal(&mut signals).await, handle);
        assert!(matches!(
            transport.query(handle).await.unwrap().status,
            TransferStatus::Failed { .. }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_wifi_only_transfer_waits_and_cancels() {
        let temp = TempDir::new().unwrap();
        let monitor = Arc::new(
            DesktopNetworkMonitor::new().with_network_type(Some(NetworkType::Cellular)),
        );
        let transport = ReqwestTransport::new()
            .unwrap()
            .with_network_monitor(monitor, Duration::from_millis(10));

        let handle = transport
            .submit(
                TransferRequest::new("http://127.0.0.1:9/never", temp.path().join("never.bin"))
                    .with_constraint(NetworkConstraint::WifiOnly),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            transport.query(handle).await.unwrap().status,
            TransferStatus::Paused
        );

        transport.cancel(handle).await.unwrap();
        assert_eq!(
            transport.query(handle).await.unwrap().status,
            TransferStatus::Unknown
        );
        // Second cancel is a no-op.
        transport.cancel(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let temp = TempDir::new().unwrap();
        let monitor = Arc::new(DesktopNetworkMonitor::new().with_network_type(None));
        let transport = ReqwestTransport::new()
            .unwrap()
            .with_network_monitor(monitor, Duration::from_secs(60));

        let a = transport
            .submit(
                TransferRequest::new("http://127.0.0.1:9/a", temp.path().join("a"))
                    .with_constraint(NetworkConstraint::WifiOnly),
            )
            .await
            .unwrap();
        let b = transport
            .submit(
                TransferRequest::new("http://127.0.0.1:9/b", temp.path().join("b"))
                    .with_constraint(NetworkConstraint::WifiOnly),
            )
            .await
            .unwrap();

        assert_ne!(a, b);
        transport.cancel(a).await.unwrap();
        transport.cancel(b).await.unwrap();
    }
}
