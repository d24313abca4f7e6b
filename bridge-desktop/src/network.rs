//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

const SYSFS_NET: &str = "/sys/class/net";

/// Desktop network monitor implementation
///
/// Detection strategy:
/// - Linux: inspects `/sys/class/net/<iface>` for interfaces that are `up`;
///   an interface with a `wireless` (or `phy80211`) entry counts as WiFi,
///   anything else non-loopback as Ethernet.
/// - Elsewhere: a TCP reachability probe; a reachable network is reported as
///   `Other` since the medium can't be told apart without platform APIs.
///
/// Hosts that know better can pin the answer with [`with_network_type`].
///
/// [`with_network_type`]: DesktopNetworkMonitor::with_network_type
pub struct DesktopNetworkMonitor {
    sysfs_root: PathBuf,
    probe_addr: String,
    probe_timeout: Duration,
    fixed: Option<NetworkInfo>,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from(SYSFS_NET),
            probe_addr: "8.8.8.8:53".to_string(),
            probe_timeout: Duration::from_secs(5),
            fixed: None,
        }
    }

    /// Always report the given connection type.
    pub fn with_network_type(mut self, network_type: Option<NetworkType>) -> Self {
        self.fixed = Some(match network_type {
            Some(network_type) => NetworkInfo::connected(network_type),
            None => NetworkInfo::disconnected(),
        });
        self
    }

    /// Read interfaces from a different sysfs tree.
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    async fn interface_is_up(iface: &Path) -> bool {
        match fs::read_to_string(iface.join("operstate")).await {
            Ok(state) => state.trim() == "up",
            Err(_) => false,
        }
    }

    async fn interface_is_wireless(iface: &Path) -> bool {
        fs::try_exists(iface.join("wireless")).await.unwrap_or(false)
            || fs::try_exists(iface.join("phy80211")).await.unwrap_or(false)
    }

    /// Returns `None` when sysfs is unavailable.
    async fn detect_from_sysfs(&self) -> Option<NetworkInfo> {
        let mut read_dir = fs::read_dir(&self.sysfs_root).await.ok()?;
        let mut best: Option<NetworkType> = None;

        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name();
            if name == "lo" {
                continue;
            }
            let iface = entry.path();
            if !Self::interface_is_up(&iface).await {
                continue;
            }
            if Self::interface_is_wireless(&iface).await {
                best = Some(NetworkType::WiFi);
            } else if best.is_none() {
                best = Some(NetworkType::Ethernet);
            }
        }

        Some(match best {
            Some(network_type) => NetworkInfo::connected(network_type),
            None => NetworkInfo::disconnected(),
        })
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        if let Some(info) = &self.fixed {
            return Ok(info.clone());
        }

        if let Some(info) = self.detect_from_sysfs().await {
            debug!(status = ?info.status, network_type = ?info.network_type, "Network info from sysfs");
            return Ok(info);
        }

        let status = self.check_connectivity().await;
        let info = match status {
            NetworkStatus::Connected => NetworkInfo {
                status,
                network_type: Some(NetworkType::Other),
                is_metered: false,
            },
            _ => NetworkInfo::disconnected(),
        };
        debug!(status = ?status, "Network info from reachability probe");

        Ok(info)
    }
}
