//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::time::Duration;
use tracing::debug;

/// Desktop network monitor implementation
///
/// Probes connectivity by opening a TCP connection to a well-known endpoint.
/// Platform APIs (netlink, SystemConfiguration, Network List Manager) would be
/// more precise but are not needed to pick between cached and remote reads.
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor probing a public DNS resolver
    pub fn new() -> Self {
        Self::with_probe("1.1.1.1:53", Duration::from_secs(3))
    }

    /// Probe a custom `host:port`, e.g. the WebDAV server itself
    pub fn with_probe(probe_addr: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            probe_addr: probe_addr.into(),
            probe_timeout,
        }
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
        let status = self.check_connectivity().await;
        debug!(status = ?status, probe = %self.probe_addr, "Network probe finished");

        Ok(match status {
            NetworkStatus::Connected => NetworkInfo::connected(NetworkType::Other),
            _ => NetworkInfo::disconnected(),
        })
    }
}
