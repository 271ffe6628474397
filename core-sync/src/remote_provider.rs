//! Provider for files stored on a remote server.
//!
//! Reads and writes always go through the local cached copy. Opening a file
//! for reading refreshes the copy first when the server has a newer revision;
//! closing a writer records the local change and, unless postponed, uploads
//! it right away. An open writer keeps the file claimed, so no sync can
//! replace the cached copy underneath it. When the server cannot be reached the cached copy is used
//! as is.

use crate::api::{RemoteApiClient, RemoteApiClientAdapter, RemoteApiClientV2, RemoteFsError};
use crate::processor::{remote_descriptor, RemoteFileSyncProcessor, SyncContext};
use crate::status::{ProcessingGuard, ProcessingStatus};
use async_trait::async_trait;
use core_auth::{CredentialsAuthenticator, FSAuthority, FileSystemAuthenticator};
use core_fs::descriptor::{normalize_path, parent_path, ROOT_PATH};
use core_fs::{
    FSOptions, FileDescriptor, FileReader, FileSystemProvider, FileSystemSyncProcessor,
    FileWriter, GuardedWriter, OnConflictStrategy, OperationError, OperationErrorKind,
    OperationResult, SyncStatus, SyncStrategy,
};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::AsyncWrite;
use tracing::{debug, info, instrument, warn};

pub struct RemoteFileSystemProvider {
    client: Arc<dyn RemoteApiClient>,
    authenticator: Arc<CredentialsAuthenticator>,
    processor: Arc<RemoteFileSyncProcessor>,
    context: SyncContext,
}

impl RemoteFileSystemProvider {
    pub fn new<C>(authority: FSAuthority, client: C, context: SyncContext) -> Self
    where
        C: RemoteApiClientV2 + 'static,
    {
        let client: Arc<dyn RemoteApiClient> = Arc::new(RemoteApiClientAdapter::new(client));
        let processor = Arc::new(RemoteFileSyncProcessor::new(
            authority.clone(),
            client.clone(),
            context.clone(),
        ));

        Self {
            client,
            authenticator: Arc::new(CredentialsAuthenticator::new(authority)),
            processor,
            context,
        }
    }

    pub fn remote_sync_processor(&self) -> Arc<RemoteFileSyncProcessor> {
        self.processor.clone()
    }

    fn authority(&self) -> &FSAuthority {
        self.processor.authority()
    }

    async fn is_online(&self) -> bool {
        match &self.context.network_monitor {
            Some(monitor) => monitor.is_connected().await,
            None => true,
        }
    }

    fn ensure_not_processing(&self, file: &FileDescriptor) -> OperationResult<()> {
        if self.processor.status_map().is_processing(&file.uid) {
            return Err(OperationError::file_is_already_in_processing(&file.uid));
        }
        Ok(())
    }

    async fn cached_descriptor(&self, path: &str) -> OperationResult<Option<FileDescriptor>> {
        let row = self
            .context
            .cache
            .get_by_remote_path(&normalize_path(path), self.authority())
            .await?;
        Ok(row.map(|row| {
            FileDescriptor::from_path(self.authority().clone(), &row.remote_path, false)
                .with_uid(&row.uid)
                .with_modified(row.last_modification_timestamp)
        }))
    }

    async fn open_cached(&self, file: &FileDescriptor) -> OperationResult<FileReader> {
        let local = self.processor.local_path(file);
        match tokio::fs::File::open(&local).await {
            Ok(handle) => Ok(Box::new(handle)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(OperationError::file_not_found(
                format!("{} has not been downloaded yet", file.name),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileSystemProvider for RemoteFileSystemProvider {
    async fn list_files(&self, dir: &FileDescriptor) -> OperationResult<Vec<FileDescriptor>> {
        if !dir.is_directory {
            return Err(OperationError::generic_io(format!(
                "Not a directory: {}",
                dir.path
            )));
        }
        let entries = self.client.list_dir(&dir.path).await?;
        Ok(entries
            .iter()
            .map(|metadata| remote_descriptor(self.authority(), metadata))
            .collect())
    }

    async fn get_parent(&self, file: &FileDescriptor) -> OperationResult<FileDescriptor> {
        match parent_path(&file.path) {
            None => Err(OperationError::incorrect_use_case(
                "The root directory has no parent",
            )),
            Some(parent) if parent == ROOT_PATH => self.get_root_file().await,
            Some(parent) => {
                let metadata = self.client.get_file_info(&parent).await?;
                Ok(remote_descriptor(self.authority(), &metadata))
            }
        }
    }

    async fn get_root_file(&self) -> OperationResult<FileDescriptor> {
        let metadata = self.client.get_root().await?;
        let mut root = remote_descriptor(self.authority(), &metadata);
        root.is_root = true;
        root.is_directory = true;
        Ok(root)
    }

    #[instrument(skip(self, file, options), fields(file_uid = %file.uid))]
    async fn open_file_for_read(
        &self,
        file: &FileDescriptor,
        on_conflict: OnConflictStrategy,
        options: &FSOptions,
    ) -> OperationResult<FileReader> {
        self.ensure_not_processing(file)?;

        if options.is_cache_only || !self.is_online().await {
            debug!("Serving cached copy");
            return self.open_cached(file).await;
        }

        let status = self.processor.get_sync_status(file).await;
        match status {
            SyncStatus::RemoteChanges => {
                self.processor
                    .process(file, SyncStrategy::default(), None)
                    .await?;
                self.open_cached(file).await
            }
            SyncStatus::Conflict => match on_conflict {
                OnConflictStrategy::Cancel => Err(OperationError::conflict(format!(
                    "{} was changed locally and on the server",
                    file.name
                ))),
                OnConflictStrategy::Rewrite => self.open_cached(file).await,
            },
            SyncStatus::NoChanges => match self.open_cached(file).await {
                Ok(reader) => Ok(reader),
                Err(e) if e.kind == OperationErrorKind::FileNotFound => {
                    self.processor
                        .process(file, SyncStrategy::default(), None)
                        .await?;
                    self.open_cached(file).await
                }
                Err(e) => Err(e),
            },
            SyncStatus::LocalChanges
            | SyncStatus::LocalChangesNoNetwork
            | SyncStatus::NoNetwork => self.open_cached(file).await,
            SyncStatus::AuthError => Err(OperationError::auth(format!(
                "The server rejected the credentials for {}",
                file.name
            ))),
            SyncStatus::FileNotFound => Err(OperationError::file_not_found(format!(
                "{} no longer exists on the server",
                file.name
            ))),
            SyncStatus::Error => Err(OperationError::generic_io(format!(
                "Unable to check {} on the server",
                file.name
            ))),
        }
    }

    #[instrument(skip(self, file, options), fields(file_uid = %file.uid))]
    async fn open_file_for_write(
        &self,
        file: &FileDescriptor,
        on_conflict: OnConflictStrategy,
        options: &FSOptions,
    ) -> OperationResult<FileWriter> {
        if !options.is_write_enabled {
            return Err(OperationError::file_access("Writing is disabled"));
        }
        let claim = self.processor.claim(file, ProcessingStatus::Syncing)?;

        let online = !options.is_cache_only && self.is_online().await;
        if online
            && on_conflict == OnConflictStrategy::Cancel
            && self.processor.get_sync_status(file).await == SyncStatus::Conflict
        {
            return Err(OperationError::conflict(format!(
                "{} was changed locally and on the server",
                file.name
            )));
        }

        let local = self.processor.local_path(file);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = local.with_extension("kdbx.write");
        let handle = tokio::fs::File::create(&staging).await?;

        let commit = PendingCommit {
            claim,
            processor: self.processor.clone(),
            file: file.clone(),
            staging,
            local,
            upload: online && !options.is_postponed_sync_enabled,
        };
        Ok(Box::new(GuardedWriter::new(CommitOnShutdown::new(
            handle, commit,
        ))))
    }

    async fn exists(&self, file: &FileDescriptor) -> OperationResult<bool> {
        if file.is_root {
            return Ok(true);
        }
        match self.client.get_file_info(&file.path).await {
            Ok(_) => Ok(true),
            Err(RemoteFsError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_file(&self, path: &str, options: &FSOptions) -> OperationResult<FileDescriptor> {
        if options.is_cache_only {
            return self
                .cached_descriptor(path)
                .await?
                .ok_or_else(|| OperationError::file_not_found(format!("{} is not cached", path)));
        }

        match self.client.get_file_info(path).await {
            Ok(metadata) => Ok(remote_descriptor(self.authority(), &metadata)),
            Err(RemoteFsError::Network(message)) => match self.cached_descriptor(path).await? {
                Some(descriptor) => {
                    debug!("Server unreachable, using cached descriptor");
                    Ok(descriptor)
                }
                None => Err(OperationError::network_io(message)),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn authenticator(&self) -> Arc<dyn FileSystemAuthenticator> {
        self.authenticator.clone()
    }

    fn sync_processor(&self) -> Arc<dyn FileSystemSyncProcessor> {
        self.processor.clone()
    }
}

type CommitFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

/// Work to do once a writer has been shut down successfully.
///
/// Holds the claim on the file from the moment the writer is opened.
struct PendingCommit {
    claim: ProcessingGuard,
    processor: Arc<RemoteFileSyncProcessor>,
    file: FileDescriptor,
    staging: PathBuf,
    local: PathBuf,
    upload: bool,
}

impl PendingCommit {
    async fn run(self) -> io::Result<()> {
        tokio::fs::rename(&self.staging, &self.local).await?;

        self.processor
            .record_local_write(&self.file)
            .await
            .map_err(|e| io::Error::other(e.to_string()))?;
        drop(self.claim);

        if self.upload {
            match self
                .processor
                .process(&self.file, SyncStrategy::default(), None)
                .await
            {
                Ok(_) => info!(file_uid = %self.file.uid, "Local changes uploaded"),
                Err(e) => warn!(
                    file_uid = %self.file.uid,
                    kind = %e.kind,
                    "Upload failed, local changes kept for the next sync"
                ),
            }
        }
        Ok(())
    }
}

/// Writes into a staging file; shutting down moves it over the cached copy
/// and records the change.
struct CommitOnShutdown {
    file: tokio::fs::File,
    pending: Option<PendingCommit>,
    commit: Option<CommitFuture>,
}

impl CommitOnShutdown {
    fn new(file: tokio::fs::File, pending: PendingCommit) -> Self {
        Self {
            file,
            pending: Some(pending),
            commit: None,
        }
    }
}

impl AsyncWrite for CommitOnShutdown {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.commit.is_none() {
            ready!(Pin::new(&mut self.file).poll_shutdown(cx))?;
            match self.pending.take() {
                Some(pending) => self.commit = Some(Box::pin(pending.run())),
                None => return Poll::Ready(Ok(())),
            }
        }

        let result = match self.commit.as_mut() {
            Some(commit) => ready!(commit.as_mut().poll(cx)),
            None => Ok(()),
        };
        self.commit = None;
        Poll::Ready(result)
    }
}
