//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `NetworkMonitor` using a TCP reachability probe
//! - `DocumentTree` over a user-picked directory
//! - `SecureStore` using the `keyring` crate, or in memory
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient};
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let network = Arc::new(DesktopNetworkMonitor::new());
//! ```

mod documents;
mod http;
mod memory_store;
mod network;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use documents::DirectoryDocumentTree;
pub use http::ReqwestHttpClient;
pub use memory_store::InMemorySecureStore;
pub use network::DesktopNetworkMonitor;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
