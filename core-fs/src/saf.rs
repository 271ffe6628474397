//! Provider for documents picked through the host document tree (SAF).
//!
//! Documents are addressed by opaque URIs; both `path` and `uid` of a
//! descriptor hold the URI. There is no browsable root: the user picks files
//! through the host UI, so the root sentinel lists as empty.

use crate::descriptor::{FSOptions, FileDescriptor, OnConflictStrategy};
use crate::error::{OperationError, OperationResult};
use crate::guarded::GuardedWriter;
use crate::provider::{FileReader, FileSystemProvider, FileWriter};
use crate::sync::{
    ConflictResolutionStrategy, FileSystemSyncProcessor, SyncConflictInfo, SyncProgressStatus,
    SyncStatus, SyncStrategy,
};
use async_trait::async_trait;
use bridge_traits::storage::{DocumentMetadata, DocumentTree};
use core_auth::{FSAuthority, FileSystemAuthenticator, NoAuthAuthenticator};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct SafFileSystemProvider {
    tree: Arc<dyn DocumentTree>,
    authenticator: Arc<NoAuthAuthenticator>,
    sync_processor: Arc<SafFileSystemSyncProcessor>,
}

impl SafFileSystemProvider {
    pub fn new(authority: FSAuthority, tree: Arc<dyn DocumentTree>) -> Self {
        Self {
            tree,
            authenticator: Arc::new(NoAuthAuthenticator::new(authority)),
            sync_processor: Arc::new(SafFileSystemSyncProcessor),
        }
    }

    fn to_descriptor(&self, metadata: DocumentMetadata) -> FileDescriptor {
        FileDescriptor {
            fs_authority: self.authenticator.fs_authority().clone(),
            path: metadata.uri.clone(),
            uid: metadata.uri,
            name: metadata.display_name,
            is_directory: metadata.is_directory,
            is_root: false,
            modified: metadata.last_modified,
        }
    }

    async fn grant(&self, file: &FileDescriptor) -> OperationResult<()> {
        self.tree
            .take_persistable_permission(&file.path)
            .await
            .map_err(|e| {
                warn!(error = %e, "Unable to take document permission");
                OperationError::from(e)
            })
    }
}

#[async_trait]
impl FileSystemProvider for SafFileSystemProvider {
    async fn list_files(&self, dir: &FileDescriptor) -> OperationResult<Vec<FileDescriptor>> {
        if dir.is_root {
            return Ok(Vec::new());
        }
        let children = self.tree.list_children(&dir.path).await?;
        Ok(children
            .into_iter()
            .map(|metadata| self.to_descriptor(metadata))
            .collect())
    }

    async fn get_parent(&self, file: &FileDescriptor) -> OperationResult<FileDescriptor> {
        if file.is_root {
            return Err(OperationError::incorrect_use_case(
                "The root directory has no parent",
            ));
        }
        match self.tree.parent(&file.path).await? {
            Some(parent) => Ok(self.to_descriptor(parent)),
            None => self.get_root_file().await,
        }
    }

    async fn get_root_file(&self) -> OperationResult<FileDescriptor> {
        Ok(FileDescriptor::root(
            self.authenticator.fs_authority().clone(),
        ))
    }

    #[instrument(skip_all)]
    async fn open_file_for_read(
        &self,
        file: &FileDescriptor,
        _on_conflict: OnConflictStrategy,
        _options: &FSOptions,
    ) -> OperationResult<FileReader> {
        self.grant(file).await?;
        let reader = self.tree.open_input(&file.path).await?;
        debug!("Opened document for reading");
        Ok(reader)
    }

    #[instrument(skip_all)]
    async fn open_file_for_write(
        &self,
        file: &FileDescriptor,
        _on_conflict: OnConflictStrategy,
        options: &FSOptions,
    ) -> OperationResult<FileWriter> {
        if !options.is_write_enabled {
            return Err(OperationError::file_access("Writing is disabled"));
        }
        self.grant(file).await?;
        let writer = self.tree.open_output(&file.path).await?;
        debug!("Opened document for writing");
        Ok(Box::new(GuardedWriter::new(writer)))
    }

    async fn exists(&self, file: &FileDescriptor) -> OperationResult<bool> {
        if file.is_root {
            return Ok(true);
        }
        Ok(self.tree.exists(&file.path).await?)
    }

    async fn get_file(&self, path: &str, _options: &FSOptions) -> OperationResult<FileDescriptor> {
        let metadata = self.tree.query(path).await?;
        Ok(self.to_descriptor(metadata))
    }

    fn authenticator(&self) -> Arc<dyn FileSystemAuthenticator> {
        self.authenticator.clone()
    }

    fn sync_processor(&self) -> Arc<dyn FileSystemSyncProcessor> {
        self.sync_processor.clone()
    }
}

/// Host documents are written in place, so there is never anything to sync.
/// Asking this processor to sync or to describe a conflict is a caller bug.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafFileSystemSyncProcessor;

#[async_trait]
impl FileSystemSyncProcessor for SafFileSystemSyncProcessor {
    async fn get_sync_status(&self, _file: &FileDescriptor) -> SyncStatus {
        SyncStatus::NoChanges
    }

    fn get_sync_progress_status(&self, _file_uid: &str) -> SyncProgressStatus {
        SyncProgressStatus::Idle
    }

    async fn get_sync_conflict_for_file(
        &self,
        _file: &FileDescriptor,
    ) -> OperationResult<SyncConflictInfo> {
        Err(OperationError::incorrect_use_case(
            "Device documents have no sync conflicts",
        ))
    }

    async fn process(
        &self,
        _file: &FileDescriptor,
        _sync_strategy: SyncStrategy,
        _resolution: Option<ConflictResolutionStrategy>,
    ) -> OperationResult<FileDescriptor> {
        Err(OperationError::incorrect_use_case(
            "Device documents cannot be synchronized",
        ))
    }

    async fn get_locally_modified_files(&self) -> OperationResult<Vec<FileDescriptor>> {
        Ok(Vec::new())
    }
}
