//! # Remote File Sync Processor
//!
//! Reconciles the cached copy of a remote database file with the server.
//!
//! ## Status
//!
//! The status of a file is derived from its cache row and a live metadata
//! probe (see [`compute_sync_status`]):
//!
//! | cache row                        | remote probe        | status                   |
//! |----------------------------------|---------------------|--------------------------|
//! | revision equal, not modified     | found               | `NoChanges`              |
//! | revision equal, modified         | found               | `LocalChanges`           |
//! | revision differs, not modified   | found               | `RemoteChanges`          |
//! | revision differs, modified       | found               | `Conflict`               |
//! | none                             | found               | `RemoteChanges`          |
//! | never uploaded, modified         | not found           | `LocalChanges`           |
//! | modified                         | network failure     | `LocalChangesNoNetwork`  |
//! | otherwise                        | network failure     | `NoNetwork`              |
//!
//! Authentication failures map to `AuthError`, missing files to
//! `FileNotFound`, everything else to `Error`.
//!
//! ## Processing
//!
//! [`RemoteFileSyncProcessor::process`] claims the file in the [`StatusMap`]
//! scoped to the processor's authority, uploads or downloads according to
//! the status, and updates the cache row only after the transfer was
//! confirmed. Downloads land in a temporary file
//! that replaces the cached copy only once complete.

use crate::api::{RemoteApiClient, RemoteFileMetadata, RemoteFsError, RemoteResult};
use crate::cache::RemoteFileCache;
use crate::model::RemoteFile;
use crate::status::{ProcessingGuard, ProcessingStatus, ProcessingUnit, StatusMap};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_auth::FSAuthority;
use core_fs::descriptor::{normalize_path, ROOT_PATH};
use core_fs::{
    ConflictResolutionStrategy, FileDescriptor, FileSystemSyncProcessor, OperationError,
    OperationResult, SyncConflictInfo, SyncProgressStatus, SyncStatus, SyncStrategy,
};
use core_runtime::events::{CoreEvent, EventBus, FileSyncEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Shared collaborators of every remote provider of one backend type.
///
/// The status map is shared as well; each processor narrows it to its own
/// authority.
#[derive(Clone)]
pub struct SyncContext {
    pub cache: RemoteFileCache,
    pub status_map: StatusMap,
    pub clock: Arc<dyn Clock>,
    pub network_monitor: Option<Arc<dyn bridge_traits::NetworkMonitor>>,
    pub event_bus: Option<EventBus>,
}

impl SyncContext {
    pub fn new(cache: RemoteFileCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            status_map: StatusMap::new(),
            clock,
            network_monitor: None,
            event_bus: None,
        }
    }

    pub fn with_network_monitor(
        mut self,
        monitor: Arc<dyn bridge_traits::NetworkMonitor>,
    ) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }
}

/// Status of a file given its cache row and the outcome of the metadata probe.
pub fn compute_sync_status(
    row: Option<&RemoteFile>,
    remote: &RemoteResult<RemoteFileMetadata>,
) -> SyncStatus {
    let locally_modified = row.is_some_and(|r| r.is_locally_modified);

    match remote {
        Ok(metadata) => match row {
            None => SyncStatus::RemoteChanges,
            Some(row) => {
                let same_revision = row.revision == metadata.revision;
                match (locally_modified, same_revision) {
                    (false, true) => SyncStatus::NoChanges,
                    (true, true) => SyncStatus::LocalChanges,
                    (false, false) => SyncStatus::RemoteChanges,
                    (true, false) => SyncStatus::Conflict,
                }
            }
        },
        Err(RemoteFsError::Network(_)) if locally_modified => SyncStatus::LocalChangesNoNetwork,
        Err(RemoteFsError::Network(_)) => SyncStatus::NoNetwork,
        Err(RemoteFsError::Auth(_)) => SyncStatus::AuthError,
        Err(RemoteFsError::FileNotFound(_))
            if row.is_some_and(|r| r.is_locally_modified && r.revision.is_none()) =>
        {
            SyncStatus::LocalChanges
        }
        Err(RemoteFsError::FileNotFound(_)) => SyncStatus::FileNotFound,
        Err(RemoteFsError::Generic(_)) => SyncStatus::Error,
    }
}

pub struct RemoteFileSyncProcessor {
    authority: FSAuthority,
    client: Arc<dyn RemoteApiClient>,
    context: SyncContext,
}

impl RemoteFileSyncProcessor {
    pub fn new(
        authority: FSAuthority,
        client: Arc<dyn RemoteApiClient>,
        context: SyncContext,
    ) -> Self {
        let context = SyncContext {
            status_map: context.status_map.scoped(&authority),
            ..context
        };
        Self {
            authority,
            client,
            context,
        }
    }

    pub fn authority(&self) -> &FSAuthority {
        &self.authority
    }

    pub fn status_map(&self) -> &StatusMap {
        &self.context.status_map
    }

    pub fn cache(&self) -> &RemoteFileCache {
        &self.context.cache
    }

    /// Where the cached copy of `file` lives.
    pub fn local_path(&self, file: &FileDescriptor) -> PathBuf {
        self.context.cache.local_file_path(&file.uid, &self.authority)
    }

    pub async fn get_cached_row(
        &self,
        file: &FileDescriptor,
    ) -> OperationResult<Option<RemoteFile>> {
        Ok(self
            .context
            .cache
            .get_by_uid(&file.uid, &self.authority)
            .await?)
    }

    /// Claim `file` for an operation of this processor's authority.
    pub fn claim(
        &self,
        file: &FileDescriptor,
        status: ProcessingStatus,
    ) -> OperationResult<ProcessingGuard> {
        self.context
            .status_map
            .try_put(ProcessingUnit::new(status, &file.uid, &file.path))
            .map_err(|_| OperationError::file_is_already_in_processing(&file.uid))
    }

    /// Record that the cached copy of `file` was rewritten locally.
    pub async fn record_local_write(&self, file: &FileDescriptor) -> OperationResult<RemoteFile> {
        let mut row = self
            .get_cached_row(file)
            .await?
            .unwrap_or_else(|| RemoteFile::new(&file.uid, &file.path, &self.authority));
        row.is_downloaded = true;
        row.is_locally_modified = true;
        row.is_uploaded = false;
        row.last_modification_timestamp = Some(self.context.clock.unix_timestamp_millis());

        let row = self.context.cache.put(row).await?;
        debug!(file_uid = %file.uid, "Local write recorded");
        Ok(row)
    }

    fn emit(&self, event: FileSyncEvent) {
        if let Some(bus) = &self.context.event_bus {
            // No subscribers is fine.
            let _ = bus.emit(CoreEvent::FileSync(event));
        }
    }

    fn descriptor(&self, metadata: &RemoteFileMetadata) -> FileDescriptor {
        remote_descriptor(&self.authority, metadata)
    }

    fn row_descriptor(&self, row: &RemoteFile) -> FileDescriptor {
        FileDescriptor::from_path(self.authority.clone(), &row.remote_path, false)
            .with_uid(&row.uid)
            .with_modified(row.last_modification_timestamp)
    }

    async fn probe(
        &self,
        file: &FileDescriptor,
    ) -> OperationResult<(Option<RemoteFile>, RemoteResult<RemoteFileMetadata>)> {
        let row = self.get_cached_row(file).await?;
        let remote = self.client.get_file_info(&file.path).await;
        Ok((row, remote))
    }

    async fn process_claimed(
        &self,
        guard: &ProcessingGuard,
        file: &FileDescriptor,
        sync_strategy: SyncStrategy,
        resolution: Option<ConflictResolutionStrategy>,
    ) -> OperationResult<(FileDescriptor, SyncStatus)> {
        let (row, remote) = self.probe(file).await?;
        let status = compute_sync_status(row.as_ref(), &remote);
        debug!(%status, "Computed sync status");

        let synced = match status {
            SyncStatus::NoChanges => {
                let local = self.local_path(file);
                if tokio::fs::try_exists(&local).await.unwrap_or(false) {
                    match remote {
                        Ok(metadata) => Ok(self.descriptor(&metadata)),
                        Err(e) => Err(e.into()),
                    }
                } else {
                    self.download(guard, file, row).await
                }
            }
            SyncStatus::LocalChanges => self.upload(guard, file, row).await,
            SyncStatus::RemoteChanges => {
                let local_wins = row.is_none()
                    && sync_strategy == SyncStrategy::LastLocalFile
                    && tokio::fs::try_exists(self.local_path(file))
                        .await
                        .unwrap_or(false);
                if local_wins {
                    self.upload(guard, file, row).await
                } else {
                    self.download(guard, file, row).await
                }
            }
            SyncStatus::Conflict => match resolution {
                None => {
                    self.emit(FileSyncEvent::ConflictDetected {
                        file_uid: file.uid.clone(),
                    });
                    Err(OperationError::conflict(format!(
                        "Local and remote copies of {} diverged",
                        file.name
                    )))
                }
                Some(ConflictResolutionStrategy::ResolveWithLocalFile) => {
                    info!("Resolving conflict with the local copy");
                    self.upload(guard, file, row).await
                }
                Some(ConflictResolutionStrategy::ResolveWithRemoteFile) => {
                    info!("Resolving conflict with the remote copy");
                    self.download(guard, file, row).await
                }
            },
            _ => Err(match remote {
                Err(e) => e.into(),
                Ok(_) => OperationError::generic(format!("Unexpected sync status {}", status)),
            }),
        };
        synced.map(|descriptor| (descriptor, status))
    }

    async fn download(
        &self,
        guard: &ProcessingGuard,
        file: &FileDescriptor,
        row: Option<RemoteFile>,
    ) -> OperationResult<FileDescriptor> {
        guard.set_status(ProcessingStatus::Downloading);

        let local = self.local_path(file);
        ensure_parent(&local).await?;
        let partial = local.with_extension("kdbx.download");

        let metadata = match self.client.download_file(&file.path, &partial).await {
            Ok(metadata) => metadata,
            Err(e) => {
                discard(&partial).await;
                return Err(e.into());
            }
        };
        tokio::fs::rename(&partial, &local).await?;

        let mut row =
            row.unwrap_or_else(|| RemoteFile::new(&file.uid, &file.path, &self.authority));
        row.remote_path = metadata.path.clone();
        row.revision = metadata.revision.clone();
        row.is_downloaded = true;
        row.is_locally_modified = false;
        row.last_download_timestamp = Some(self.context.clock.unix_timestamp_millis());
        row.last_remote_modification_timestamp = metadata.modified;
        self.context.cache.put(row).await?;

        info!(revision = ?metadata.revision, "Downloaded remote copy");
        Ok(self.descriptor(&metadata))
    }

    async fn upload(
        &self,
        guard: &ProcessingGuard,
        file: &FileDescriptor,
        row: Option<RemoteFile>,
    ) -> OperationResult<FileDescriptor> {
        guard.set_status(ProcessingStatus::Uploading);

        let local = self.local_path(file);
        if !tokio::fs::try_exists(&local).await? {
            return Err(OperationError::file_not_found(format!(
                "No local copy of {}",
                file.name
            )));
        }

        let metadata = self.client.upload_file(&local, &file.path).await?;

        let mut row =
            row.unwrap_or_else(|| RemoteFile::new(&file.uid, &file.path, &self.authority));
        row.remote_path = metadata.path.clone();
        row.revision = metadata.revision.clone();
        row.is_downloaded = true;
        row.is_locally_modified = false;
        row.is_uploaded = true;
        row.last_remote_modification_timestamp = metadata.modified;
        self.context.cache.put(row).await?;

        info!(revision = ?metadata.revision, "Uploaded local copy");
        Ok(self.descriptor(&metadata))
    }
}

pub(crate) fn remote_descriptor(
    authority: &FSAuthority,
    metadata: &RemoteFileMetadata,
) -> FileDescriptor {
    let path = normalize_path(&metadata.path);
    FileDescriptor {
        fs_authority: authority.clone(),
        is_root: path == ROOT_PATH,
        path,
        uid: metadata.uid.clone(),
        name: metadata.name.clone(),
        is_directory: metadata.is_directory,
        modified: metadata.modified,
    }
}

async fn ensure_parent(path: &Path) -> OperationResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "Failed to remove partial download");
        }
    }
}

#[async_trait]
impl FileSystemSyncProcessor for RemoteFileSyncProcessor {
    #[instrument(skip(self, file), fields(file_uid = %file.uid))]
    async fn get_sync_status(&self, file: &FileDescriptor) -> SyncStatus {
        match self.probe(file).await {
            Ok((row, remote)) => compute_sync_status(row.as_ref(), &remote),
            Err(e) => {
                warn!(error = %e, "Unable to read cache row");
                SyncStatus::Error
            }
        }
    }

    fn get_sync_progress_status(&self, file_uid: &str) -> SyncProgressStatus {
        self.context
            .status_map
            .get_by_file_uid(file_uid)
            .map(|unit| unit.status.into())
            .unwrap_or_default()
    }

    async fn get_sync_conflict_for_file(
        &self,
        file: &FileDescriptor,
    ) -> OperationResult<SyncConflictInfo> {
        let (row, remote) = self.probe(file).await?;
        let status = compute_sync_status(row.as_ref(), &remote);

        match (status, row, remote) {
            (SyncStatus::Conflict, Some(row), Ok(metadata)) => Ok(SyncConflictInfo {
                local_file: self.row_descriptor(&row),
                remote_file: self.descriptor(&metadata),
            }),
            (status, _, _) => Err(OperationError::incorrect_use_case(format!(
                "{} is not in conflict ({})",
                file.name, status
            ))),
        }
    }

    #[instrument(skip(self, file), fields(file_uid = %file.uid, fs_type = %self.authority.fs_type))]
    async fn process(
        &self,
        file: &FileDescriptor,
        sync_strategy: SyncStrategy,
        resolution: Option<ConflictResolutionStrategy>,
    ) -> OperationResult<FileDescriptor> {
        let guard = self.claim(file, ProcessingStatus::Syncing)?;

        self.emit(FileSyncEvent::Started {
            file_uid: file.uid.clone(),
            fs_type: self.authority.fs_type.to_string(),
        });

        let result = self
            .process_claimed(&guard, file, sync_strategy, resolution)
            .await;

        match &result {
            Ok((_, status)) => {
                let revision = self
                    .get_cached_row(file)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|row| row.revision);
                self.emit(FileSyncEvent::Completed {
                    file_uid: file.uid.clone(),
                    status: status.to_string(),
                    revision,
                });
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e.message, "Sync failed");
                self.emit(FileSyncEvent::Failed {
                    file_uid: file.uid.clone(),
                    message: e.message.clone(),
                    kind: e.kind.to_string(),
                });
            }
        }

        drop(guard);
        result.map(|(descriptor, _)| descriptor)
    }

    async fn get_locally_modified_files(&self) -> OperationResult<Vec<FileDescriptor>> {
        let rows = self.context.cache.get_locally_modified_files().await?;
        Ok(rows
            .iter()
            .filter(|row| row.belongs_to(&self.authority))
            .map(|row| self.row_descriptor(row))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::ServerCredentials;
    use core_fs::OperationErrorKind;

    fn row(revision: Option<&str>, locally_modified: bool) -> RemoteFile {
        let authority = FSAuthority::webdav(ServerCredentials::basic("https://x", "u", "p"));
        let mut row = RemoteFile::new("/db.kdbx", "/db.kdbx", &authority);
        row.revision = revision.map(str::to_string);
        row.is_locally_modified = locally_modified;
        row
    }

    fn remote(revision: &str) -> RemoteResult<RemoteFileMetadata> {
        Ok(RemoteFileMetadata {
            uid: "/db.kdbx".to_string(),
            path: "/db.kdbx".to_string(),
            name: "db.kdbx".to_string(),
            revision: Some(revision.to_string()),
            is_directory: false,
            modified: None,
        })
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (Some("rev1"), false, "rev1", SyncStatus::NoChanges),
            (Some("rev1"), true, "rev1", SyncStatus::LocalChanges),
            (Some("rev1"), false, "rev2", SyncStatus::RemoteChanges),
            (Some("rev1"), true, "rev2", SyncStatus::Conflict),
            (None, true, "rev1", SyncStatus::Conflict),
        ];

        for (cached, modified, current, expected) in cases {
            let row = row(cached, modified);
            assert_eq!(
                compute_sync_status(Some(&row), &remote(current)),
                expected,
                "cached={:?} modified={} remote={}",
                cached,
                modified,
                current
            );
        }

        assert_eq!(
            compute_sync_status(None, &remote("rev1")),
            SyncStatus::RemoteChanges
        );
    }

    #[test]
    fn test_status_on_probe_failure() {
        let clean = row(Some("rev1"), false);
        let dirty = row(Some("rev1"), true);
        let never_uploaded = row(None, true);
        let network = Err(RemoteFsError::Network("offline".into()));

        assert_eq!(
            compute_sync_status(Some(&clean), &network),
            SyncStatus::NoNetwork
        );
        assert_eq!(compute_sync_status(None, &network), SyncStatus::NoNetwork);
        assert_eq!(
            compute_sync_status(Some(&dirty), &network),
            SyncStatus::LocalChangesNoNetwork
        );
        assert_eq!(
            compute_sync_status(Some(&clean), &Err(RemoteFsError::Auth("401".into()))),
            SyncStatus::AuthError
        );

        let missing = Err(RemoteFsError::FileNotFound("404".into()));
        assert_eq!(
            compute_sync_status(Some(&clean), &missing),
            SyncStatus::FileNotFound
        );
        assert_eq!(
            compute_sync_status(Some(&never_uploaded), &missing),
            SyncStatus::LocalChanges
        );
        assert_eq!(
            compute_sync_status(
                Some(&clean),
                &Err(RemoteFsError::Generic(OperationError::generic_io("500")))
            ),
            SyncStatus::Error
        );
        assert_eq!(
            OperationError::from(RemoteFsError::Network("x".into())).kind,
            OperationErrorKind::NetworkIo
        );
    }
}
