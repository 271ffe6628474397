//! # Core Configuration Module
//!
//! Builder-based configuration for the vault storage core.
//!
//! ## Overview
//!
//! `CoreConfig` holds every host bridge and setting the storage backends need.
//! The builder validates that each enabled storage backend has the bridges it
//! depends on and fails fast with [`Error::CapabilityMissing`] otherwise.
//!
//! | Backend           | Flag                      | Required bridge  |
//! |-------------------|---------------------------|------------------|
//! | Internal storage  | always on                 | -                |
//! | External storage  | `enable_external_storage` | -                |
//! | SAF documents     | `enable_saf`              | `DocumentTree`   |
//! | WebDAV            | `enable_webdav`           | `HttpClient`     |
//! | Git               | `enable_git`              | -                |
//!
//! `SecureStore` is always required. With the `desktop-shims` feature the
//! builder falls back to the OS keychain when none is injected.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/vault-core.db")
//!     .cache_dir("/data/cache")
//!     .http_client(Arc::new(ReqwestHttpClient::new()?))
//!     .secure_store(Arc::new(MySecureStore))
//!     .enable_webdav(true)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{DocumentTree, HttpClient, NetworkMonitor, SecureStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database holding the remote file cache
    pub database_path: PathBuf,

    /// Directory holding local copies of remote databases and git clones
    pub cache_dir: PathBuf,

    /// HTTP client, required by WebDAV
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Connectivity monitor; without one the network is assumed reachable
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Credential persistence (required)
    pub secure_store: Arc<dyn SecureStore>,

    /// Host document tree, required by SAF
    pub document_tree: Option<Arc<dyn DocumentTree>>,

    /// Root directory served by the internal storage backend
    pub internal_root: PathBuf,

    /// Root directory served by the external storage backend
    pub external_root: Option<PathBuf>,

    pub features: FeatureFlags,

    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("cache_dir", &self.cache_dir)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("secure_store", &"SecureStore { ... }")
            .field(
                "document_tree",
                &self.document_tree.as_ref().map(|_| "DocumentTree { ... }"),
            )
            .field("internal_root", &self.internal_root)
            .field("external_root", &self.external_root)
            .field("features", &self.features)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Storage backends enabled for this process.
///
/// External storage mirrors the runtime permission state on Android: hosts
/// flip it when the user grants or revokes access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub enable_external_storage: bool,
    pub enable_saf: bool,
    pub enable_webdav: bool,
    pub enable_git: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_external_storage: false,
            enable_saf: false,
            enable_webdav: true,
            enable_git: true,
        }
    }
}

/// Settings shared by the remote sync backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Per-request timeout for remote calls
    pub request_timeout_secs: u64,
    /// Commit author used when pushing a database to a git remote
    pub git_author_name: String,
    pub git_author_email: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            git_author_name: "PassVault".to_string(),
            git_author_email: "passvault@localhost".to_string(),
        }
    }
}

impl SyncSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates paths, settings and backend/bridge consistency.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.sync.request_timeout_secs == 0 {
            return Err(Error::Config(
                "Request timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if self.features.enable_webdav && self.http_client.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "HttpClient".to_string(),
                message: "WebDAV storage is enabled but no HttpClient was provided. \
                          Disable WebDAV or inject an HttpClient implementation."
                    .to_string(),
            });
        }

        if self.features.enable_saf && self.document_tree.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "DocumentTree".to_string(),
                message: "SAF storage is enabled but no DocumentTree was provided. \
                          Disable SAF or inject the host document provider."
                    .to_string(),
            });
        }

        if self.features.enable_external_storage && self.external_root.is_none() {
            return Err(Error::Config(
                "External storage is enabled but no external root directory was set".to_string(),
            ));
        }

        if self.features.enable_git
            && (self.sync.git_author_name.trim().is_empty()
                || self.sync.git_author_email.trim().is_empty())
        {
            return Err(Error::Config(
                "Git storage requires a commit author name and email".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                  Desktop: enable the 'desktop-shims' feature to use the OS keychain. \
                  Android: inject a Keystore-backed store."
            .to_string(),
    })
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    document_tree: Option<Arc<dyn DocumentTree>>,
    internal_root: Option<PathBuf>,
    external_root: Option<PathBuf>,
    features: FeatureFlags,
    sync: SyncSettings,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn document_tree(mut self, tree: Arc<dyn DocumentTree>) -> Self {
        self.document_tree = Some(tree);
        self
    }

    /// Root of the internal storage backend. Defaults to `<cache_dir>/files`.
    pub fn internal_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.internal_root = Some(path.into());
        self
    }

    pub fn external_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.external_root = Some(path.into());
        self
    }

    pub fn enable_external_storage(mut self, enabled: bool) -> Self {
        self.features.enable_external_storage = enabled;
        self
    }

    pub fn enable_saf(mut self, enabled: bool) -> Self {
        self.features.enable_saf = enabled;
        self
    }

    pub fn enable_webdav(mut self, enabled: bool) -> Self {
        self.features.enable_webdav = enabled;
        self
    }

    pub fn enable_git(mut self, enabled: bool) -> Self {
        self.features.enable_git = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when a path is missing or a setting is invalid
    /// - [`Error::CapabilityMissing`] when an enabled backend lacks its bridge
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let internal_root = self
            .internal_root
            .unwrap_or_else(|| cache_dir.join("files"));

        let config = CoreConfig {
            database_path,
            cache_dir,
            http_client: self.http_client,
            network_monitor: self.network_monitor,
            secure_store,
            document_tree: self.document_tree,
            internal_root,
            external_root: self.external_root,
            features: self.features,
            sync: self.sync,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};

    struct StubSecureStore;

    #[async_trait]
    impl SecureStore for StubSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct StubHttpClient;

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(bridge_traits::BridgeError::NotAvailable("stub".to_string()))
        }
    }

    fn base_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/tmp/vault-core.db")
            .cache_dir("/tmp/vault-cache")
            .secure_store(Arc::new(StubSecureStore))
    }

    #[test]
    fn test_builder_with_required_fields() {
        let config = base_builder()
            .http_client(Arc::new(StubHttpClient))
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/vault-core.db"));
        assert_eq!(config.internal_root, PathBuf::from("/tmp/vault-cache/files"));
        assert!(config.features.enable_webdav);
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_database_path() {
        let result = CoreConfig::builder()
            .cache_dir("/tmp/vault-cache")
            .secure_store(Arc::new(StubSecureStore))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_webdav_requires_http_client() {
        let result = base_builder().build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "HttpClient"
        ));

        assert!(base_builder().enable_webdav(false).build().is_ok());
    }

    #[test]
    fn test_saf_requires_document_tree() {
        let result = base_builder().enable_webdav(false).enable_saf(true).build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "DocumentTree"
        ));
    }

    #[test]
    fn test_external_storage_requires_root() {
        let result = base_builder()
            .enable_webdav(false)
            .enable_external_storage(true)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let config = base_builder()
            .enable_webdav(false)
            .enable_external_storage(true)
            .external_root("/mnt/sdcard")
            .build()
            .unwrap();
        assert_eq!(config.external_root, Some(PathBuf::from("/mnt/sdcard")));
    }

    #[test]
    fn test_invalid_sync_settings() {
        let result = base_builder()
            .enable_webdav(false)
            .sync_settings(SyncSettings {
                request_timeout_secs: 0,
                ..SyncSettings::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = base_builder()
            .enable_webdav(false)
            .sync_settings(SyncSettings {
                git_author_name: " ".to_string(),
                ..SyncSettings::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("author")));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = base_builder().enable_webdav(false).build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("SecureStore { ... }"));
    }
}
