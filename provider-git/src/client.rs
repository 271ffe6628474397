//! Git repository client
//!
//! Implements [`RemoteApiClientV2`] over a working clone of the repository.
//! Every call refreshes the clone from the remote first, so revisions are
//! always those of the remote branch.

use async_trait::async_trait;
use core_auth::{FSAuthority, ServerCredentials};
use core_fs::OperationResult;
use core_sync::{RemoteApiClientV2, RemoteFileMetadata};
use git2::Repository;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::instrument;

use crate::error::{GitError, Result};
use crate::repo::{GitAuthor, Checkout};

/// One async lock per working clone, shared by every client of the same
/// repository so git2 never runs twice on one clone.
#[derive(Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, workdir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(workdir.to_path_buf())
            .or_default()
            .clone()
    }
}

/// Working clone location for `url` on `branch` under `cache_dir`.
pub fn workdir_for(cache_dir: &Path, url: &str, branch: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0u8]);
    hasher.update(branch.as_bytes());
    cache_dir.join("git").join(format!("{:x}", hasher.finalize()))
}

pub struct GitClient {
    checkout: Option<Arc<Checkout>>,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl GitClient {
    /// Create a client for `authority`.
    ///
    /// An authority without git credentials yields a client whose every call
    /// fails with an authentication error.
    pub fn new(
        authority: &FSAuthority,
        cache_dir: &Path,
        author: GitAuthor,
        locks: &RepoLocks,
    ) -> Self {
        let checkout = match &authority.credentials {
            Some(ServerCredentials::Git {
                url,
                username,
                password,
                branch,
            }) => Some(Arc::new(Checkout {
                url: url.clone(),
                username: username.clone(),
                password: password.clone(),
                branch: branch.clone(),
                workdir: workdir_for(cache_dir, url, branch),
                author,
            })),
            _ => None,
        };

        let lock = match &checkout {
            Some(checkout) => locks.lock_for(&checkout.workdir),
            None => Arc::new(tokio::sync::Mutex::new(())),
        };

        Self { checkout, lock }
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.checkout.as_ref().map(|checkout| checkout.workdir.as_path())
    }

    /// Run `operation` on a refreshed clone on the blocking pool.
    ///
    /// The lock guard moves into the blocking task, so a cancelled caller
    /// keeps the clone locked until git2 is done with it.
    async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Checkout, &Repository) -> Result<T> + Send + 'static,
    {
        let checkout = self.checkout.clone().ok_or(GitError::MissingCredentials)?;
        let guard = self.lock.clone().lock_owned().await;

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let repo = checkout.open()?;
            checkout.refresh(&repo)?;
            operation(&checkout, &repo)
        })
        .await?
    }
}

#[async_trait]
impl RemoteApiClientV2 for GitClient {
    async fn list_dir(&self, path: &str) -> OperationResult<Vec<RemoteFileMetadata>> {
        let path = path.to_string();
        Ok(self.run(move |checkout, repo| checkout.list(repo, &path)).await?)
    }

    async fn get_file_info(&self, path: &str) -> OperationResult<RemoteFileMetadata> {
        let path = path.to_string();
        Ok(self.run(move |checkout, repo| checkout.metadata(repo, &path)).await?)
    }

    #[instrument(skip(self, local_path))]
    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> OperationResult<RemoteFileMetadata> {
        let remote_path = remote_path.to_string();
        let local_path = local_path.to_path_buf();
        Ok(self
            .run(move |checkout, repo| checkout.export(repo, &remote_path, &local_path))
            .await?)
    }

    #[instrument(skip(self, local_path))]
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> OperationResult<RemoteFileMetadata> {
        let remote_path = remote_path.to_string();
        let local_path = local_path.to_path_buf();
        Ok(self
            .run(move |checkout, repo| checkout.import(repo, &local_path, &remote_path))
            .await?)
    }

    async fn get_root(&self) -> OperationResult<RemoteFileMetadata> {
        Ok(self
            .run(|checkout, repo| checkout.metadata(repo, core_fs::descriptor::ROOT_PATH))
            .await?)
    }
}
