//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
}

impl NetworkInfo {
    pub fn connected(network_type: NetworkType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(network_type),
            is_metered: network_type == NetworkType::Cellular,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == NetworkStatus::Connected
    }

    pub fn is_wifi(&self) -> bool {
        self.is_connected() && self.network_type == Some(NetworkType::WiFi)
    }

    /// Human-readable connection summary for status displays.
    pub fn description(&self) -> &'static str {
        if !self.is_connected() {
            return "No network connection";
        }
        match self.network_type {
            Some(NetworkType::WiFi) => "Connected via WiFi",
            Some(NetworkType::Cellular) => "Connected via Mobile Data",
            Some(NetworkType::Ethernet) => "Connected via Ethernet",
            Some(NetworkType::Other) | None => "Connected",
        }
    }
}

/// Network requirement attached to a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkConstraint {
    /// Any connected network may be used
    #[default]
    Any,
    /// Only unmetered WiFi may be used
    WifiOnly,
}

impl NetworkConstraint {
    pub fn from_wifi_only(wifi_only: bool) -> Self {
        if wifi_only {
            Self::WifiOnly
        } else {
            Self::Any
        }
    }

    pub fn is_satisfied_by(&self, info: &NetworkInfo) -> bool {
        match self {
            NetworkConstraint::Any => info.is_connected(),
            NetworkConstraint::WifiOnly => info.is_wifi(),
        }
    }
}

/// Network monitor trait
///
/// Provides network connectivity information to allow the core to:
/// - Refuse WiFi-only downloads while on mobile data
/// - Hold queued transfers until the required network is back
///
/// # Platform Support
///
/// - **Desktop**: sysfs interface inspection plus a reachability probe
/// - **Android**: ConnectivityManager
/// - **iOS**: Network framework
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn may_fetch(monitor: &dyn NetworkMonitor, wifi_only: bool) -> bool {
///     !wifi_only || monitor.is_wifi().await
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        self.get_network_info()
            .await
            .map(|info| info.is_connected())
            .unwrap_or(false)
    }

    /// Check if connected via WiFi
    async fn is_wifi(&self) -> bool {
        self.get_network_info()
            .await
            .map(|info| info.is_wifi())
            .unwrap_or(false)
    }

    /// Check if connection is metered
    async fn is_metered(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                is_metered: true,
                ..
            })
        )
    }
}
