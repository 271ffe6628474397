//! Provider for files on a local directory tree (internal and external
//! storage).

use crate::descriptor::{
    join_path, normalize_path, parent_path, FSOptions, FileDescriptor, OnConflictStrategy,
};
use crate::error::{OperationError, OperationResult};
use crate::guarded::GuardedWriter;
use crate::provider::{FileReader, FileSystemProvider, FileWriter};
use crate::sync::{FileSystemSyncProcessor, LocalSyncProcessor};
use async_trait::async_trait;
use core_auth::{FSAuthority, FileSystemAuthenticator, NoAuthAuthenticator};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, instrument};

/// Files under `root`, addressed by `/`-separated paths relative to it.
pub struct RegularFileSystemProvider {
    root: PathBuf,
    authenticator: Arc<NoAuthAuthenticator>,
    sync_processor: Arc<LocalSyncProcessor>,
}

impl RegularFileSystemProvider {
    pub fn new(authority: FSAuthority, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            authenticator: Arc::new(NoAuthAuthenticator::new(authority)),
            sync_processor: Arc::new(LocalSyncProcessor),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    fn authority(&self) -> &FSAuthority {
        self.authenticator.fs_authority()
    }

    fn resolve(&self, path: &str) -> OperationResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(OperationError::file_access(format!(
                "Path escapes the storage root: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn describe(&self, path: &str) -> OperationResult<FileDescriptor> {
        let metadata = tokio::fs::metadata(self.resolve(path)?).await?;
        Ok(
            FileDescriptor::from_path(self.authority().clone(), path, metadata.is_dir())
                .with_modified(modified_millis(&metadata)),
        )
    }
}

fn modified_millis(metadata: &std::fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .and_then(|duration| i64::try_from(duration.as_millis()).ok())
}

#[async_trait]
impl FileSystemProvider for RegularFileSystemProvider {
    #[instrument(skip(self, dir), fields(path = %dir.path))]
    async fn list_files(&self, dir: &FileDescriptor) -> OperationResult<Vec<FileDescriptor>> {
        if !dir.is_directory {
            return Err(OperationError::generic_io(format!(
                "Not a directory: {}",
                dir.path
            )));
        }

        let mut entries = tokio::fs::read_dir(self.resolve(&dir.path)?).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(
                FileDescriptor::from_path(
                    self.authority().clone(),
                    join_path(&dir.path, &name),
                    metadata.is_dir(),
                )
                .with_modified(modified_millis(&metadata)),
            );
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(count = files.len(), "Listed directory");
        Ok(files)
    }

    async fn get_parent(&self, file: &FileDescriptor) -> OperationResult<FileDescriptor> {
        match parent_path(&file.path) {
            Some(parent) => self.describe(&parent).await,
            None => Err(OperationError::incorrect_use_case(
                "The root directory has no parent",
            )),
        }
    }

    async fn get_root_file(&self) -> OperationResult<FileDescriptor> {
        Ok(FileDescriptor::root(self.authority().clone()))
    }

    #[instrument(skip(self, file, _options), fields(path = %file.path))]
    async fn open_file_for_read(
        &self,
        file: &FileDescriptor,
        _on_conflict: OnConflictStrategy,
        _options: &FSOptions,
    ) -> OperationResult<FileReader> {
        let handle = tokio::fs::File::open(self.resolve(&file.path)?).await?;
        Ok(Box::new(handle))
    }

    #[instrument(skip(self, file, options), fields(path = %file.path))]
    async fn open_file_for_write(
        &self,
        file: &FileDescriptor,
        _on_conflict: OnConflictStrategy,
        options: &FSOptions,
    ) -> OperationResult<FileWriter> {
        if !options.is_write_enabled {
            return Err(OperationError::file_access("Writing is disabled"));
        }

        let target = self.resolve(&file.path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let handle = tokio::fs::File::create(target).await?;
        Ok(Box::new(GuardedWriter::new(handle)))
    }

    async fn exists(&self, file: &FileDescriptor) -> OperationResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(&file.path)?).await?)
    }

    async fn get_file(&self, path: &str, _options: &FSOptions) -> OperationResult<FileDescriptor> {
        self.describe(&normalize_path(path)).await
    }

    fn authenticator(&self) -> Arc<dyn FileSystemAuthenticator> {
        self.authenticator.clone()
    }

    fn sync_processor(&self) -> Arc<dyn FileSystemSyncProcessor> {
        self.sync_processor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationErrorKind;
    use crate::sync::SyncStatus;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn provider(dir: &TempDir) -> RegularFileSystemProvider {
        RegularFileSystemProvider::new(FSAuthority::internal_storage(), dir.path())
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);
        let file = FileDescriptor::from_path(provider.fs_authority(), "/vaults/work.kdbx", false);

        let mut writer = provider
            .open_file_for_write(&file, OnConflictStrategy::Cancel, &FSOptions::default())
            .await
            .unwrap();
        writer.write_all(b"kdbx").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut reader = provider
            .open_file_for_read(&file, OnConflictStrategy::Cancel, &FSOptions::default())
            .await
            .unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"kdbx");

        assert!(provider.exists(&file).await.unwrap());
        assert_eq!(
            provider.sync_processor().get_sync_status(&file).await,
            SyncStatus::NoChanges
        );
    }

    #[tokio::test]
    async fn test_list_files_and_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("vaults")).unwrap();
        std::fs::write(dir.path().join("vaults/b.kdbx"), b"b").unwrap();
        std::fs::write(dir.path().join("vaults/a.kdbx"), b"a").unwrap();
        let provider = provider(&dir);

        let root = provider.get_root_file().await.unwrap();
        let top = provider.list_files(&root).await.unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].is_directory);

        let files = provider.list_files(&top[0]).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.kdbx", "b.kdbx"]);
        assert_eq!(files[0].path, "/vaults/a.kdbx");
        assert!(files[0].modified.is_some());

        let parent = provider.get_parent(&files[0]).await.unwrap();
        assert_eq!(parent.path, "/vaults");
        let err = provider.get_parent(&root).await.unwrap_err();
        assert_eq!(err.kind, OperationErrorKind::IncorrectUseCase);
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let dir = TempDir::new().unwrap();
        let provider = provider(&dir);

        let missing = FileDescriptor::from_path(provider.fs_authority(), "/missing.kdbx", false);
        let err = provider
            .open_file_for_read(&missing, OnConflictStrategy::Cancel, &FSOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, OperationErrorKind::FileNotFound);

        let escape = provider
            .get_file("/../etc/passwd", &FSOptions::default())
            .await
            .unwrap_err();
        assert_eq!(escape.kind, OperationErrorKind::FileAccess);

        let read_only = provider
            .open_file_for_write(&missing, OnConflictStrategy::Cancel, &FSOptions::read_only())
            .await
            .err()
            .unwrap();
        assert_eq!(read_only.kind, OperationErrorKind::FileAccess);
    }
}
