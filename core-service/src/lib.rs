//! Core service façade and bootstrap helpers.
//!
//! This crate is the composition root of the vault storage core. It turns a
//! validated [`CoreConfig`] into a running service: the cache database is
//! opened, one sync context is prepared per remote backend and a
//! [`FileSystemResolver`] is populated with a factory for every enabled
//! storage type. Desktop apps typically enable the `desktop-shims` feature
//! (which depends on `bridge-desktop`); the `webdav` and `git` features pull
//! in the remote backends.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/vault-core.db")
//!     .cache_dir("/data/cache")
//!     .http_client(http_client)
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//! let provider = core.resolve_provider(&authority);
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::{Clock, DocumentTree, HttpClient, NetworkMonitor, SecureStore, SystemClock};
use core_auth::{CredentialStore, FSAuthority, FSType};
use core_fs::{
    FileSystemProvider, FileSystemResolver, FileSystemResolverBuilder, FileSystemSyncProcessor,
    RegularFileSystemProvider, SafFileSystemProvider,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use core_sync::{
    create_pool, DatabaseConfig, RemoteFileCache, RemoteFileRepository,
    SqliteRemoteFileRepository, SyncContext,
};
use tokio::sync::broadcast::Receiver;
use tracing::{info, instrument, warn};

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub secure_store: Arc<dyn SecureStore>,
    pub document_tree: Option<Arc<dyn DocumentTree>>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Collect the bridges injected into `config`, with the system clock.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            http_client: config.http_client.clone(),
            network_monitor: config.network_monitor.clone(),
            secure_store: config.secure_store.clone(),
            document_tree: config.document_tree.clone(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for sync timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

struct Inner {
    config: CoreConfig,
    deps: CoreDependencies,
    resolver: Arc<FileSystemResolver>,
    event_bus: EventBus,
    credentials: CredentialStore,
    pool: core_sync::SqlitePool,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<Inner>,
}

impl CoreService {
    /// Bootstrap the core from a validated configuration.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let deps = CoreDependencies::from_config(&config);
        Self::bootstrap_with(config, deps).await
    }

    /// Bootstrap with explicit bridge handles.
    #[instrument(skip_all, fields(database = %config.database_path.display()))]
    pub async fn bootstrap_with(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.cache_dir).await?;
        tokio::fs::create_dir_all(&config.internal_root).await?;
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let repository: Arc<dyn RemoteFileRepository> =
            Arc::new(SqliteRemoteFileRepository::new(pool.clone()));
        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);

        let resolver = build_resolver(&config, &deps, repository, &event_bus)?;
        resolver.set_fs_type_enabled(
            FSType::ExternalStorage,
            config.features.enable_external_storage,
        );

        let credentials = CredentialStore::new(deps.secure_store.clone());

        info!(
            fs_types = ?sorted(resolver.available_fs_types()),
            "Vault storage core ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                deps,
                resolver: Arc::new(resolver),
                event_bus,
                credentials,
                pool,
            }),
        })
    }

    /// Shared resolver; hand it to every component that needs file access.
    pub fn resolver(&self) -> Arc<FileSystemResolver> {
        Arc::clone(&self.inner.resolver)
    }

    pub fn resolve_provider(&self, authority: &FSAuthority) -> Arc<dyn FileSystemProvider> {
        self.inner.resolver.resolve_provider(authority)
    }

    pub fn resolve_sync_processor(
        &self,
        authority: &FSAuthority,
    ) -> Arc<dyn FileSystemSyncProcessor> {
        self.inner.resolver.resolve_sync_processor(authority)
    }

    /// Storage types the host may offer to the user right now.
    pub fn available_fs_types(&self) -> HashSet<FSType> {
        self.inner.resolver.available_fs_types()
    }

    /// Mirror the host's external storage permission.
    ///
    /// Has no effect when no external root was configured.
    pub fn set_external_storage_permission(&self, granted: bool) {
        if !self.inner.resolver.is_registered(FSType::ExternalStorage) {
            warn!("External storage is not configured, ignoring permission change");
            return;
        }
        self.inner
            .resolver
            .set_fs_type_enabled(FSType::ExternalStorage, granted);
    }

    /// Subscribe to sync events published by every remote backend.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    /// Sync events of one file, e.g. for the screen showing that database.
    pub fn subscribe_file_events(&self, file_uid: impl Into<String>) -> EventStream {
        let file_uid = file_uid.into();
        EventStream::new(self.inner.event_bus.subscribe()).filter(move |event| match event {
            CoreEvent::FileSync(sync) => sync.file_uid() == file_uid,
        })
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Named server credentials saved by the host.
    pub fn credential_store(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> &CoreDependencies {
        &self.inner.deps
    }

    /// Close the cache database. Providers resolved earlier stop working.
    pub async fn shutdown(&self) {
        self.inner.pool.close().await;
        info!("Vault storage core shut down");
    }
}

fn build_resolver(
    config: &CoreConfig,
    deps: &CoreDependencies,
    repository: Arc<dyn RemoteFileRepository>,
    event_bus: &EventBus,
) -> Result<FileSystemResolver> {
    let mut builder = FileSystemResolver::builder()
        .register(FSType::InternalStorage, directory_factory(&config.internal_root));

    if let Some(root) = &config.external_root {
        builder = builder.register(FSType::ExternalStorage, directory_factory(root));
    }

    if config.features.enable_saf {
        let tree = deps.document_tree.clone().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "DocumentTree".to_string(),
            message: "SAF storage is enabled without a document tree".to_string(),
        })?;
        builder = builder.register(FSType::Saf, move |authority: &FSAuthority| {
            Arc::new(SafFileSystemProvider::new(authority.clone(), tree.clone()))
                as Arc<dyn FileSystemProvider>
        });
    }

    let context = |fs_type: FSType| {
        let cache = RemoteFileCache::new(fs_type, repository.clone(), &config.cache_dir);
        let context = SyncContext::new(cache, deps.clock.clone()).with_event_bus(event_bus.clone());
        match &deps.network_monitor {
            Some(monitor) => context.with_network_monitor(monitor.clone()),
            None => context,
        }
    };

    if config.features.enable_webdav {
        builder = register_webdav(builder, config, deps, context(FSType::WebDav))?;
    }

    if config.features.enable_git {
        builder = register_git(builder, config, context(FSType::Git));
    }

    Ok(builder.build())
}

fn directory_factory(
    root: &Path,
) -> impl Fn(&FSAuthority) -> Arc<dyn FileSystemProvider> + Send + Sync {
    let root: PathBuf = root.to_path_buf();
    move |authority: &FSAuthority| {
        Arc::new(RegularFileSystemProvider::new(authority.clone(), root.clone()))
            as Arc<dyn FileSystemProvider>
    }
}

#[cfg(feature = "webdav")]
fn register_webdav(
    builder: FileSystemResolverBuilder,
    config: &CoreConfig,
    deps: &CoreDependencies,
    context: SyncContext,
) -> Result<FileSystemResolverBuilder> {
    let http_client = deps.http_client.clone().ok_or_else(|| CoreError::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "WebDAV storage is enabled without an HTTP client".to_string(),
    })?;
    let factory = provider_webdav::WebDavFactory::new(http_client, context)
        .with_timeout(config.sync.request_timeout());
    Ok(builder.register(FSType::WebDav, factory))
}

#[cfg(not(feature = "webdav"))]
fn register_webdav(
    builder: FileSystemResolverBuilder,
    _config: &CoreConfig,
    _deps: &CoreDependencies,
    _context: SyncContext,
) -> Result<FileSystemResolverBuilder> {
    warn!("WebDAV is enabled but this build lacks the 'webdav' feature");
    Ok(builder)
}

#[cfg(feature = "git")]
fn register_git(
    builder: FileSystemResolverBuilder,
    config: &CoreConfig,
    context: SyncContext,
) -> FileSystemResolverBuilder {
    let author = provider_git::GitAuthor {
        name: config.sync.git_author_name.clone(),
        email: config.sync.git_author_email.clone(),
    };
    builder.register(
        FSType::Git,
        provider_git::GitFactory::new(context, &config.cache_dir, author),
    )
}

#[cfg(not(feature = "git"))]
fn register_git(
    builder: FileSystemResolverBuilder,
    _config: &CoreConfig,
    _context: SyncContext,
) -> FileSystemResolverBuilder {
    warn!("Git is enabled but this build lacks the 'git' feature");
    builder
}

fn sorted(types: HashSet<FSType>) -> Vec<&'static str> {
    let mut names: Vec<_> = types.iter().map(FSType::as_str).collect();
    names.sort_unstable();
    names
}
