//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the vault storage core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is provided differently per platform (desktop,
//! Android).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP including WebDAV verbs
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection for offline mode
//!
//! ### Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//! - [`DocumentTree`](storage::DocumentTree) - Host-granted document access (SAF)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a capability required by
//! an enabled storage backend is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "WebDAV storage requires an HTTP client".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! must map "access revoked" to `PermissionDenied`, "no such document" to
//! `NotFound` and transport failures to `Network`; the storage providers rely
//! on that distinction to pick the right operation error.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{DocumentMetadata, DocumentTree, SecureStore};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
