//! Resolver factory for Git authorities.

use core_auth::FSAuthority;
use core_fs::{Factory, FileSystemProvider};
use core_runtime::logging::redact_if_sensitive;
use core_sync::{RemoteFileSystemProvider, SyncContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::client::{GitClient, RepoLocks};
use crate::repo::GitAuthor;

/// Builds a [`RemoteFileSystemProvider`] backed by a [`GitClient`].
///
/// Creating a provider does no I/O; the working clone is made on first use.
pub struct GitFactory {
    context: SyncContext,
    cache_dir: PathBuf,
    author: GitAuthor,
    locks: RepoLocks,
}

impl GitFactory {
    pub fn new(context: SyncContext, cache_dir: impl Into<PathBuf>, author: GitAuthor) -> Self {
        Self {
            context,
            cache_dir: cache_dir.into(),
            author,
            locks: RepoLocks::new(),
        }
    }
}

impl Factory for GitFactory {
    fn create(&self, authority: &FSAuthority) -> Arc<dyn FileSystemProvider> {
        let user = authority.credentials.as_ref().map_or("", |c| c.username());
        debug!(
            fs_type = %authority.fs_type,
            user = %redact_if_sensitive("user", user),
            "Creating git provider"
        );
        let client = GitClient::new(authority, &self.cache_dir, self.author.clone(), &self.locks);
        Arc::new(RemoteFileSystemProvider::new(
            authority.clone(),
            client,
            self.context.clone(),
        ))
    }
}
