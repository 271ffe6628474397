//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information.

use async_trait::async_trait;

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
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
            is_metered: matches!(network_type, NetworkType::Cellular),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
        }
    }
}

/// Network monitor trait
///
/// Lets remote providers decide between serving the cached copy of a
/// database and contacting the server. An `Indeterminate` status counts as
/// connected: the request itself will surface the failure.
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability probe
/// - **Android**: ConnectivityManager
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        match self.get_network_info().await {
            Ok(info) => !matches!(info.status, NetworkStatus::Disconnected),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(NetworkStatus);

    #[async_trait]
    impl NetworkMonitor for Fixed {
        async fn get_network_info(&self) -> Result<NetworkInfo> {
            Ok(NetworkInfo {
                status: self.0,
                network_type: None,
                is_metered: false,
            })
        }
    }

    #[test]
    fn test_network_info() {
        let info = NetworkInfo::connected(NetworkType::Cellular);

        assert_eq!(info.status, NetworkStatus::Connected);
        assert_eq!(info.network_type, Some(NetworkType::Cellular));
        assert!(info.is_metered);
    }

    #[tokio::test]
    async fn test_indeterminate_counts_as_connected() {
        assert!(Fixed(NetworkStatus::Indeterminate).is_connected().await);
        assert!(Fixed(NetworkStatus::Connected).is_connected().await);
        assert!(!Fixed(NetworkStatus::Disconnected).is_connected().await);
    }
}
