#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    MediaPlayer, MediaSource, NetworkInfo, NetworkMonitor, NetworkType, PlaybackSessionId,
    PlayerSignal, PlayerSignalStream, TerminalSignalStream, TransferHandle, TransferRequest,
    TransferSnapshot, TransferStatus, Transport,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventStream};
use mockall::mock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

// ============================================================================
// Transport with a live terminal channel
// ============================================================================

pub struct SignalingTransport {
    next: AtomicI64,
    transfers: Mutex<HashMap<TransferHandle, (TransferRequest, TransferSnapshot)>>,
    pub submitted: Mutex<Vec<TransferRequest>>,
    terminal_tx: UnboundedSender<TransferHandle>,
    terminal_rx: Mutex<Option<UnboundedReceiver<TransferHandle>>>,
    signals_available: bool,
}

impl SignalingTransport {
    pub fn starting_at(first_handle: i64) -> Self {
        let (terminal_tx, terminal_rx) = unbounded_channel();
        Self {
            next: AtomicI64::new(first_handle),
            transfers: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            terminal_tx,
            terminal_rx: Mutex::new(Some(terminal_rx)),
            signals_available: true,
        }
    }

    pub fn without_signals(mut self) -> Self {
        self.signals_available = false;
        self
    }

    /// Write `body` to the destination, mark the transfer successful and
    /// announce it on the terminal channel.
    pub fn complete(&self, handle: TransferHandle, body: &[u8]) {
        {
            let mut transfers = self.transfers.lock().unwrap();
            let (request, snapshot) = transfers.get_mut(&handle).expect("unknown handle");
            std::fs::write(&request.destination, body).unwrap();
            snapshot.status = TransferStatus::Successful;
            snapshot.bytes_done = body.len() as u64;
            snapshot.bytes_total = Some(body.len() as u64);
        }
        self.terminal_tx.send(handle).unwrap();
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

struct ChannelTerminalStream(UnboundedReceiver<TransferHandle>);

#[async_trait]
impl TerminalSignalStream for ChannelTerminalStream {
    async fn next(&mut self) -> Option<TransferHandle> {
        self.0.recv().await
    }
}

#[async_trait]
impl Transport for SignalingTransport {
    async fn submit(&self, request: TransferRequest) -> BridgeResult<TransferHandle> {
        let handle = TransferHandle(self.next.fetch_add(1, Ordering::SeqCst));
        self.submitted.lock().unwrap().push(request.clone());
        self.transfers.lock().unwrap().insert(
            handle,
            (
                request,
                TransferSnapshot {
                    status: TransferStatus::Pending,
                    bytes_done: 0,
                    bytes_total: None,
                },
            ),
        );
        Ok(handle)
    }

    async fn query(&self, handle: TransferHandle) -> BridgeResult<TransferSnapshot> {
        Ok(self
            .transfers
            .lock()
            .unwrap()
            .get(&handle)
            .map(|(_, snapshot)| snapshot.clone())
            .unwrap_or_else(TransferSnapshot::unknown))
    }

    async fn cancel(&self, handle: TransferHandle) -> BridgeResult<()> {
        self.transfers.lock().unwrap().remove(&handle);
        Ok(())
    }

    fn subscribe_terminal(&self) -> BridgeResult<Box<dyn TerminalSignalStream>> {
        if !self.signals_available {
            return Err(BridgeError::NotAvailable("no terminal signals".to_string()));
        }
        let receiver = self
            .terminal_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("already subscribed".to_string()))?;
        Ok(Box::new(ChannelTerminalStream(receiver)))
    }
}

// ============================================================================
// Player with a live signal channel
// ============================================================================

pub struct SignalingPlayer {
    pub prepared: Mutex<Vec<(PlaybackSessionId, MediaSource)>>,
    signal_tx: UnboundedSender<PlayerSignal>,
    signal_rx: Mutex<Option<UnboundedReceiver<PlayerSignal>>>,
}

impl SignalingPlayer {
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = unbounded_channel();
        Self {
            prepared: Mutex::new(Vec::new()),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
        }
    }

    pub fn last_prepared(&self) -> (PlaybackSessionId, MediaSource) {
        self.prepared.lock().unwrap().last().expect("nothing prepared").clone()
    }

    /// Announce readiness of the most recently prepared session.
    pub fn signal_prepared(&self) {
        let (session, _) = self.last_prepared();
        self.signal_tx.send(PlayerSignal::Prepared { session }).unwrap();
    }
}

struct ChannelSignalStream(UnboundedReceiver<PlayerSignal>);

#[async_trait]
impl PlayerSignalStream for ChannelSignalStream {
    async fn next(&mut self) -> Option<PlayerSignal> {
        self.0.recv().await
    }
}

#[async_trait]
impl MediaPlayer for SignalingPlayer {
    async fn prepare(&self, source: MediaSource) -> BridgeResult<PlaybackSessionId> {
        let session = PlaybackSessionId::new();
        self.prepared.lock().unwrap().push((session, source));
        Ok(session)
    }

    async fn start(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
        Ok(())
    }

    async fn pause(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
        Ok(())
    }

    async fn seek(&self, _session: PlaybackSessionId, _position: Duration) -> BridgeResult<()> {
        Ok(())
    }

    async fn position(&self, _session: PlaybackSessionId) -> BridgeResult<Duration> {
        Ok(Duration::ZERO)
    }

    async fn duration(&self, _session: PlaybackSessionId) -> BridgeResult<Option<Duration>> {
        Ok(None)
    }

    async fn release(&self, _session: PlaybackSessionId) -> BridgeResult<()> {
        Ok(())
    }

    fn subscribe_signals(&self) -> BridgeResult<Box<dyn PlayerSignalStream>> {
        let receiver = self
            .signal_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BridgeError::OperationFailed("already subscribed".to_string()))?;
        Ok(Box::new(ChannelSignalStream(receiver)))
    }
}

// ============================================================================
// Network
// ============================================================================

mock! {
    pub Network {}

    #[async_trait]
    impl NetworkMonitor for Network {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo>;
    }
}

pub fn wifi() -> MockNetwork {
    let mut network = MockNetwork::new();
    network
        .expect_get_network_info()
        .returning(|| Ok(NetworkInfo::connected(NetworkType::WiFi)));
    network
}

// ============================================================================
// Config
// ============================================================================

pub fn config(
    dir: &Path,
    transport: Arc<SignalingTransport>,
    player: Arc<SignalingPlayer>,
    network: MockNetwork,
) -> CoreConfig {
    CoreConfig::builder()
        .database_path(dir.join("offline.db"))
        .storage_root(dir)
        .file_system(Arc::new(TokioFileSystem::new()))
        .network_monitor(Arc::new(network))
        .transport(transport)
        .media_player(player)
        .progress_interval(Duration::from_millis(50))
        .build()
        .unwrap()
}

/// Wait for the first event matching `predicate`.
pub async fn wait_for<F>(events: &mut EventStream, predicate: F) -> CoreEvent
where
    F: Fn(&CoreEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
