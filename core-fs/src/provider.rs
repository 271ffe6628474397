use crate::descriptor::{FSOptions, FileDescriptor, OnConflictStrategy};
use crate::error::OperationResult;
use crate::sync::FileSystemSyncProcessor;
use async_trait::async_trait;
use core_auth::{FSAuthority, FileSystemAuthenticator};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writers must be shut down (`AsyncWriteExt::shutdown`) for the content to be
/// committed.
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Uniform file operations over one storage backend.
///
/// One provider instance exists per [`FSAuthority`]; obtain it through
/// [`FileSystemResolver`](crate::FileSystemResolver).
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    async fn list_files(&self, dir: &FileDescriptor) -> OperationResult<Vec<FileDescriptor>>;

    async fn get_parent(&self, file: &FileDescriptor) -> OperationResult<FileDescriptor>;

    async fn get_root_file(&self) -> OperationResult<FileDescriptor>;

    async fn open_file_for_read(
        &self,
        file: &FileDescriptor,
        on_conflict: OnConflictStrategy,
        options: &FSOptions,
    ) -> OperationResult<FileReader>;

    async fn open_file_for_write(
        &self,
        file: &FileDescriptor,
        on_conflict: OnConflictStrategy,
        options: &FSOptions,
    ) -> OperationResult<FileWriter>;

    async fn exists(&self, file: &FileDescriptor) -> OperationResult<bool>;

    async fn get_file(&self, path: &str, options: &FSOptions) -> OperationResult<FileDescriptor>;

    fn authenticator(&self) -> Arc<dyn FileSystemAuthenticator>;

    fn sync_processor(&self) -> Arc<dyn FileSystemSyncProcessor>;

    fn fs_authority(&self) -> FSAuthority {
        self.authenticator().fs_authority().clone()
    }
}
