//! Remote file cache for one backend type.
//!
//! Pairs the cache rows with the local copies of the files they describe.
//! Local copies live at `<cache_dir>/<fs_type>/<digest>.kdbx`, where the digest
//! covers the authority and the uid, so remote names never show up on disk.

use crate::model::{authority_key, to_hex, RemoteFile};
use crate::repository::RemoteFileRepository;
use crate::Result;
use core_auth::{FSAuthority, FSType};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct RemoteFileCache {
    fs_type: FSType,
    repository: Arc<dyn RemoteFileRepository>,
    cache_dir: PathBuf,
}

impl RemoteFileCache {
    pub fn new(
        fs_type: FSType,
        repository: Arc<dyn RemoteFileRepository>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs_type,
            repository,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn fs_type(&self) -> FSType {
        self.fs_type
    }

    pub async fn get_by_uid(
        &self,
        uid: &str,
        authority: &FSAuthority,
    ) -> Result<Option<RemoteFile>> {
        self.repository
            .find_by_uid(uid, &authority_key(authority))
            .await
    }

    pub async fn get_by_remote_path(
        &self,
        remote_path: &str,
        authority: &FSAuthority,
    ) -> Result<Option<RemoteFile>> {
        self.repository
            .find_by_remote_path(remote_path, &authority_key(authority))
            .await
    }

    /// Store `file`, replacing the row for the same uid and authority.
    pub async fn put(&self, file: RemoteFile) -> Result<RemoteFile> {
        let id = self.repository.upsert(&file).await?;
        debug!(file_uid = %file.uid, id, "Cache row stored");
        Ok(RemoteFile {
            id: Some(id),
            ..file
        })
    }

    pub async fn update(&self, file: &RemoteFile) -> Result<()> {
        self.repository.update(file).await
    }

    pub async fn get_locally_modified_files(&self) -> Result<Vec<RemoteFile>> {
        self.repository.find_locally_modified(self.fs_type).await
    }

    pub async fn get_all(&self) -> Result<Vec<RemoteFile>> {
        self.repository.find_all(self.fs_type).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.repository.delete(id).await
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the local copy of `uid` under `authority` is kept.
    pub fn local_file_path(&self, uid: &str, authority: &FSAuthority) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(authority_key(authority));
        hasher.update([0u8]);
        hasher.update(uid);
        let name = format!("{}.kdbx", to_hex(&hasher.finalize()));

        self.cache_dir.join(self.fs_type.as_str()).join(name)
    }
}
