#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    Clock, NetworkInfo, NetworkMonitor, NetworkType, SystemClock, TerminalSignalStream,
    TransferHandle, TransferRequest, TransferSnapshot, TransferStatus, Transport,
};
use core_offline::db::create_test_pool;
use core_offline::repositories::{SqliteDownloadRequestRepository, SqliteResourceRepository};
use core_offline::{DownloadCoordinator, ResourceRegistry};
use core_runtime::events::{CoreEvent, EventBus};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

/// Transport whose transfers only move when the test says so.
#[derive(Default)]
pub struct FakeTransport {
    next: AtomicI64,
    transfers: Mutex<HashMap<TransferHandle, (TransferRequest, TransferSnapshot)>>,
    pub submitted: Mutex<Vec<TransferRequest>>,
    pub cancelled: Mutex<Vec<TransferHandle>>,
    rejecting: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(100),
            ..Default::default()
        }
    }

    /// Refuse every later submission.
    pub fn reject_submissions(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn set_progress(&self, handle: TransferHandle, done: u64, total: Option<u64>) {
        if let Some((_, snapshot)) = self.transfers.lock().unwrap().get_mut(&handle) {
            snapshot.status = TransferStatus::Running;
            snapshot.bytes_done = done;
            snapshot.bytes_total = total;
        }
    }

    /// Write `body` to the destination and mark the transfer successful.
    pub fn complete(&self, handle: TransferHandle, body: &[u8]) {
        let mut transfers = self.transfers.lock().unwrap();
        let (request, snapshot) = transfers.get_mut(&handle).expect("unknown handle");
        std::fs::write(&request.destination, body).unwrap();
        snapshot.status = TransferStatus::Successful;
        snapshot.bytes_done = body.len() as u64;
        snapshot.bytes_total = Some(body.len() as u64);
    }

    pub fn fail(&self, handle: TransferHandle, reason: &str) {
        if let Some((_, snapshot)) = self.transfers.lock().unwrap().get_mut(&handle) {
            snapshot.status = TransferStatus::Failed {
                reason: reason.to_string(),
            };
        }
    }

    /// Drop one transfer, as if the host lost track of it.
    pub fn forget(&self, handle: TransferHandle) {
        self.transfers.lock().unwrap().remove(&handle);
    }

    /// Drop all transfer state, as a fresh process would.
    pub fn forget_all(&self) {
        self.transfers.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn submit(&self, request: TransferRequest) -> BridgeResult<TransferHandle> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("queue full".to_string()));
        }
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
        self.cancelled.lock().unwrap().push(handle);
        Ok(())
    }

    fn subscribe_terminal(&self) -> BridgeResult<Box<dyn TerminalSignalStream>> {
        Err(BridgeError::NotAvailable("terminal signals are driven by the test".to_string()))
    }
}

pub struct FixedNetwork(pub NetworkInfo);

impl FixedNetwork {
    pub fn wifi() -> Self {
        Self(NetworkInfo::connected(NetworkType::WiFi))
    }

    pub fn cellular() -> Self {
        Self(NetworkInfo::connected(NetworkType::Cellular))
    }
}

#[async_trait]
impl NetworkMonitor for FixedNetwork {
    async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
        Ok(self.0.clone())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub events: Receiver<CoreEvent>,
    pub transport: Arc<FakeTransport>,
    pub registry: Arc<ResourceRegistry>,
    pub coordinator: DownloadCoordinator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_network(FixedNetwork::wifi()).await
    }

    pub async fn with_network(network: FixedNetwork) -> Self {
        Self::with_clock(network, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(network: FixedNetwork, clock: Arc<dyn Clock>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_test_pool().await.unwrap();
        let bus = EventBus::new(256);
        let events = bus.subscribe();
        let transport = Arc::new(FakeTransport::new());

        let registry = Arc::new(registry_for(&pool, dir.path(), clock.clone(), &bus));
        let coordinator = DownloadCoordinator::new(
            registry.clone(),
            Arc::new(SqliteDownloadRequestRepository::new(pool.clone())),
            transport.clone(),
            Arc::new(network),
            clock,
            bus.clone(),
        )
        .await
        .unwrap();

        Self {
            dir,
            pool,
            bus,
            events,
            transport,
            registry,
            coordinator,
        }
    }

    /// A second coordinator over the same database and transport, as after a restart.
    pub async fn restarted_coordinator(&self) -> DownloadCoordinator {
        DownloadCoordinator::new(
            self.registry.clone(),
            Arc::new(SqliteDownloadRequestRepository::new(self.pool.clone())),
            self.transport.clone(),
            Arc::new(FixedNetwork::wifi()),
            Arc::new(SystemClock),
            self.bus.clone(),
        )
        .await
        .unwrap()
    }

    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn registry_for(
    pool: &SqlitePool,
    root: &Path,
    clock: Arc<dyn Clock>,
    bus: &EventBus,
) -> ResourceRegistry {
    ResourceRegistry::new(
        Arc::new(SqliteResourceRepository::new(pool.clone())),
        Arc::new(TokioFileSystem::with_data_directory(root.to_path_buf())),
        clock,
        root,
        bus.clone(),
    )
}
