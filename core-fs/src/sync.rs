//! Sync status model and the per-backend sync processor contract.

use crate::descriptor::FileDescriptor;
use crate::error::{OperationError, OperationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relation between the cached copy of a file and its remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    NoChanges,
    LocalChanges,
    RemoteChanges,
    Conflict,
    Error,
    AuthError,
    FileNotFound,
    NoNetwork,
    LocalChangesNoNetwork,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::NoChanges => "NoChanges",
            SyncStatus::LocalChanges => "LocalChanges",
            SyncStatus::RemoteChanges => "RemoteChanges",
            SyncStatus::Conflict => "Conflict",
            SyncStatus::Error => "Error",
            SyncStatus::AuthError => "AuthError",
            SyncStatus::FileNotFound => "FileNotFound",
            SyncStatus::NoNetwork => "NoNetwork",
            SyncStatus::LocalChangesNoNetwork => "LocalChangesNoNetwork",
        }
    }

    /// Statuses that carry unsynced local edits.
    pub fn has_local_changes(&self) -> bool {
        matches!(
            self,
            SyncStatus::LocalChanges | SyncStatus::Conflict | SyncStatus::LocalChangesNoNetwork
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncProgressStatus {
    #[default]
    Idle,
    Syncing,
    Downloading,
    Uploading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub progress: SyncProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConflictInfo {
    pub local_file: FileDescriptor,
    pub remote_file: FileDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolutionStrategy {
    ResolveWithLocalFile,
    ResolveWithRemoteFile,
}

/// Which side wins when the cache has no sync history for a file but a local
/// copy exists next to the remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStrategy {
    #[default]
    LastRemoteFile,
    LastLocalFile,
}

/// Reconciles the cached copy of a file with its backend.
#[async_trait]
pub trait FileSystemSyncProcessor: Send + Sync {
    /// Current relation between cache and remote. Failures are folded into
    /// the status (`NoNetwork`, `AuthError`, `FileNotFound`, `Error`).
    async fn get_sync_status(&self, file: &FileDescriptor) -> SyncStatus;

    fn get_sync_progress_status(&self, file_uid: &str) -> SyncProgressStatus;

    async fn get_sync_state(&self, file: &FileDescriptor) -> SyncState {
        let status = self.get_sync_status(file).await;
        SyncState {
            status,
            progress: self.get_sync_progress_status(&file.uid),
        }
    }

    async fn get_sync_conflict_for_file(
        &self,
        file: &FileDescriptor,
    ) -> OperationResult<SyncConflictInfo>;

    /// Bring the cached copy and the remote copy in line.
    ///
    /// Returns the descriptor of the file after synchronization.
    async fn process(
        &self,
        file: &FileDescriptor,
        sync_strategy: SyncStrategy,
        resolution: Option<ConflictResolutionStrategy>,
    ) -> OperationResult<FileDescriptor>;

    async fn get_locally_modified_files(&self) -> OperationResult<Vec<FileDescriptor>>;
}

/// Processor for files that live on the device and have nothing to sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSyncProcessor;

#[async_trait]
impl FileSystemSyncProcessor for LocalSyncProcessor {
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
            "Local files cannot be in conflict",
        ))
    }

    async fn process(
        &self,
        file: &FileDescriptor,
        _sync_strategy: SyncStrategy,
        _resolution: Option<ConflictResolutionStrategy>,
    ) -> OperationResult<FileDescriptor> {
        Ok(file.clone())
    }

    async fn get_locally_modified_files(&self) -> OperationResult<Vec<FileDescriptor>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationErrorKind;
    use core_auth::FSAuthority;

    #[tokio::test]
    async fn test_local_processor_has_nothing_to_sync() {
        let processor = LocalSyncProcessor;
        let file = FileDescriptor::from_path(FSAuthority::internal_storage(), "/a.kdbx", false);

        let state = processor.get_sync_state(&file).await;
        assert_eq!(state.status, SyncStatus::NoChanges);
        assert_eq!(state.progress, SyncProgressStatus::Idle);

        let processed = processor
            .process(&file, SyncStrategy::default(), None)
            .await
            .unwrap();
        assert_eq!(processed, file);

        let err = processor.get_sync_conflict_for_file(&file).await.unwrap_err();
        assert_eq!(err.kind, OperationErrorKind::IncorrectUseCase);
        assert!(processor
            .get_locally_modified_files()
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_local_changes_classification() {
        assert!(SyncStatus::Conflict.has_local_changes());
        assert!(SyncStatus::LocalChangesNoNetwork.has_local_changes());
        assert!(!SyncStatus::RemoteChanges.has_local_changes());
    }
}
