#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::time::FixedClock;
use core_auth::{FSAuthority, ServerCredentials};
use core_fs::{FileDescriptor, OperationError, OperationResult};
use core_runtime::events::EventBus;
use core_sync::{
    create_test_pool, RemoteApiClientV2, RemoteFile, RemoteFileCache, RemoteFileMetadata,
    RemoteFileSyncProcessor, RemoteFileSystemProvider, SqliteRemoteFileRepository, SyncContext,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const DB_PATH: &str = "/vaults/db.kdbx";

#[derive(Default)]
struct ServerState {
    files: HashMap<String, (Vec<u8>, String)>,
    failure: Option<OperationError>,
    transfer_failure: Option<OperationError>,
    download_delay: Option<Duration>,
    panic_on_download: bool,
    next_revision: u32,
    uploads: usize,
    downloads: usize,
}

/// In-memory server. Clones share state.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        let server = Self::default();
        server.state.lock().unwrap().next_revision = 100;
        server
    }

    pub fn put(&self, path: &str, content: &[u8], revision: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), (content.to_vec(), revision.to_string()));
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|(content, _)| content.clone())
    }

    pub fn revision(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|(_, revision)| revision.clone())
    }

    /// Fail every call with `error` until cleared.
    pub fn fail_with(&self, error: Option<OperationError>) {
        self.state.lock().unwrap().failure = error;
    }

    /// Fail downloads and uploads only; metadata calls keep working.
    pub fn fail_transfers_with(&self, error: Option<OperationError>) {
        self.state.lock().unwrap().transfer_failure = error;
    }

    pub fn delay_downloads(&self, delay: Duration) {
        self.state.lock().unwrap().download_delay = Some(delay);
    }

    pub fn panic_on_download(&self) {
        self.state.lock().unwrap().panic_on_download = true;
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    fn check(&self) -> OperationResult<()> {
        match &self.state.lock().unwrap().failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check_transfer(&self) -> OperationResult<()> {
        self.check()?;
        match &self.state.lock().unwrap().transfer_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn metadata(path: &str, revision: Option<String>, is_directory: bool) -> RemoteFileMetadata {
        RemoteFileMetadata {
            uid: path.to_string(),
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or_default().to_string(),
            revision,
            is_directory,
            modified: Some(1_700_000_000_000),
        }
    }
}

#[async_trait]
impl RemoteApiClientV2 for FakeServer {
    async fn list_dir(&self, path: &str) -> OperationResult<Vec<RemoteFileMetadata>> {
        self.check()?;
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let state = self.state.lock().unwrap();
        let mut entries: Vec<_> = state
            .files
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .map(|(p, (_, rev))| Self::metadata(p, Some(rev.clone()), false))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn get_file_info(&self, path: &str) -> OperationResult<RemoteFileMetadata> {
        self.check()?;
        let state = self.state.lock().unwrap();
        if let Some((_, revision)) = state.files.get(path) {
            return Ok(Self::metadata(path, Some(revision.clone()), false));
        }
        let dir_prefix = format!("{}/", path);
        if state.files.keys().any(|p| p.starts_with(&dir_prefix)) {
            return Ok(Self::metadata(path, None, true));
        }
        Err(OperationError::file_not_found(path))
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> OperationResult<RemoteFileMetadata> {
        self.check_transfer()?;
        let (delay, panics) = {
            let state = self.state.lock().unwrap();
            (state.download_delay, state.panic_on_download)
        };
        if panics {
            panic!("download crashed");
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (content, revision) = {
            let mut state = self.state.lock().unwrap();
            state.downloads += 1;
            state
                .files
                .get(remote_path)
                .cloned()
                .ok_or_else(|| OperationError::file_not_found(remote_path))?
        };
        tokio::fs::write(local_path, content).await?;
        Ok(Self::metadata(remote_path, Some(revision), false))
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> OperationResult<RemoteFileMetadata> {
        self.check_transfer()?;
        let content = tokio::fs::read(local_path).await?;
        let mut state = self.state.lock().unwrap();
        state.next_revision += 1;
        state.uploads += 1;
        let revision = format!("rev{}", state.next_revision);
        state
            .files
            .insert(remote_path.to_string(), (content, revision.clone()));
        Ok(Self::metadata(remote_path, Some(revision), false))
    }

    async fn get_root(&self) -> OperationResult<RemoteFileMetadata> {
        self.check()?;
        Ok(Self::metadata("/", None, true))
    }
}

pub fn authority() -> FSAuthority {
    FSAuthority::webdav(ServerCredentials::basic(
        "https://dav.example.com/",
        "jo",
        "secret",
    ))
}

pub fn db_file() -> FileDescriptor {
    FileDescriptor::from_path(authority(), DB_PATH, false)
}

pub struct Harness {
    pub dir: TempDir,
    pub server: FakeServer,
    pub cache: RemoteFileCache,
    pub provider: RemoteFileSystemProvider,
    pub processor: Arc<RemoteFileSyncProcessor>,
    pub events: EventBus,
    pub context: SyncContext,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_context(|context| context).await
    }

    pub async fn with_context(configure: impl FnOnce(SyncContext) -> SyncContext) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = create_test_pool().await.unwrap();
        let cache = RemoteFileCache::new(
            core_auth::FSType::WebDav,
            Arc::new(SqliteRemoteFileRepository::new(pool)),
            dir.path(),
        );
        let events = EventBus::new(64);
        let context = configure(
            SyncContext::new(cache.clone(), Arc::new(FixedClock::new(1_000)))
                .with_event_bus(events.clone()),
        );

        let server = FakeServer::new();
        let provider = RemoteFileSystemProvider::new(authority(), server.clone(), context.clone());
        let processor = provider.remote_sync_processor();

        Self {
            dir,
            server,
            cache,
            provider,
            processor,
            events,
            context,
        }
    }

    /// Store a cache row and a local copy for [`db_file`].
    pub async fn seed(&self, revision: &str, locally_modified: bool, content: &[u8]) -> RemoteFile {
        let file = db_file();
        let local = self.processor.local_path(&file);
        tokio::fs::create_dir_all(local.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&local, content).await.unwrap();

        let mut row = RemoteFile::new(&file.uid, &file.path, &authority());
        row.revision = Some(revision.to_string());
        row.is_downloaded = true;
        row.is_locally_modified = locally_modified;
        self.cache.put(row).await.unwrap()
    }

    pub async fn row(&self) -> Option<RemoteFile> {
        self.cache.get_by_uid(DB_PATH, &authority()).await.unwrap()
    }

    pub async fn local_content(&self) -> Vec<u8> {
        tokio::fs::read(self.processor.local_path(&db_file()))
            .await
            .unwrap()
    }
}
