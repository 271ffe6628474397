//! # Remote API Clients
//!
//! Backends implement [`RemoteApiClientV2`], which reports failures as
//! [`OperationError`]s. Sync code talks to [`RemoteApiClient`] instead, whose
//! [`RemoteFsError`] carries only the distinctions sync decisions depend on.
//! [`RemoteApiClientAdapter`] bridges the two.

use async_trait::async_trait;
use core_fs::{OperationError, OperationErrorKind, OperationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::trace;

/// A file or directory as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileMetadata {
    pub uid: String,
    pub path: String,
    pub name: String,
    /// Opaque revision (ETag, commit id); `None` for directories.
    pub revision: Option<String>,
    pub is_directory: bool,
    /// Milliseconds since the epoch
    pub modified: Option<i64>,
}

/// Backend client contract.
#[async_trait]
pub trait RemoteApiClientV2: Send + Sync {
    async fn list_dir(&self, path: &str) -> OperationResult<Vec<RemoteFileMetadata>>;

    async fn get_file_info(&self, path: &str) -> OperationResult<RemoteFileMetadata>;

    /// Download `remote_path` into `local_path`, creating or truncating it.
    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> OperationResult<RemoteFileMetadata>;

    /// Upload `local_path` to `remote_path`. The returned metadata carries the
    /// revision assigned by the server.
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> OperationResult<RemoteFileMetadata>;

    async fn get_root(&self) -> OperationResult<RemoteFileMetadata>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFsError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote file not found: {0}")]
    FileNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Generic(OperationError),
}

impl RemoteFsError {
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteFsError::Network(_))
    }
}

impl From<OperationError> for RemoteFsError {
    fn from(e: OperationError) -> Self {
        match e.kind {
            OperationErrorKind::Auth => RemoteFsError::Auth(e.message),
            OperationErrorKind::FileNotFound => RemoteFsError::FileNotFound(e.message),
            OperationErrorKind::NetworkIo => RemoteFsError::Network(e.message),
            _ => RemoteFsError::Generic(e),
        }
    }
}

impl From<RemoteFsError> for OperationError {
    fn from(e: RemoteFsError) -> Self {
        match e {
            RemoteFsError::Auth(message) => OperationError::auth(message),
            RemoteFsError::FileNotFound(message) => OperationError::file_not_found(message),
            RemoteFsError::Network(message) => OperationError::network_io(message),
            RemoteFsError::Generic(inner) => inner,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteFsError>;

/// Client surface used by the sync processor and the remote provider.
#[async_trait]
pub trait RemoteApiClient: Send + Sync {
    async fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteFileMetadata>>;

    async fn get_file_info(&self, path: &str) -> RemoteResult<RemoteFileMetadata>;

    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> RemoteResult<RemoteFileMetadata>;

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> RemoteResult<RemoteFileMetadata>;

    async fn get_root(&self) -> RemoteResult<RemoteFileMetadata>;
}

pub struct RemoteApiClientAdapter<C> {
    client: C,
}

impl<C: RemoteApiClientV2> RemoteApiClientAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &C {
        &self.client
    }
}

fn classify<T>(operation: &str, result: OperationResult<T>) -> RemoteResult<T> {
    result.map_err(|e| {
        trace!(operation, kind = %e.kind, "Remote call failed");
        RemoteFsError::from(e)
    })
}

#[async_trait]
impl<C: RemoteApiClientV2> RemoteApiClient for RemoteApiClientAdapter<C> {
    async fn list_dir(&self, path: &str) -> RemoteResult<Vec<RemoteFileMetadata>> {
        classify("list_dir", self.client.list_dir(path).await)
    }

    async fn get_file_info(&self, path: &str) -> RemoteResult<RemoteFileMetadata> {
        classify("get_file_info", self.client.get_file_info(path).await)
    }

    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
    ) -> RemoteResult<RemoteFileMetadata> {
        classify(
            "download_file",
            self.client.download_file(remote_path, local_path).await,
        )
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> RemoteResult<RemoteFileMetadata> {
        classify(
            "upload_file",
            self.client.upload_file(local_path, remote_path).await,
        )
    }

    async fn get_root(&self) -> RemoteResult<RemoteFileMetadata> {
        classify("get_root", self.client.get_root().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Client {}

        #[async_trait]
        impl RemoteApiClientV2 for Client {
            async fn list_dir(&self, path: &str) -> OperationResult<Vec<RemoteFileMetadata>>;
            async fn get_file_info(&self, path: &str) -> OperationResult<RemoteFileMetadata>;
            async fn download_file(&self, remote_path: &str, local_path: &Path) -> OperationResult<RemoteFileMetadata>;
            async fn upload_file(&self, local_path: &Path, remote_path: &str) -> OperationResult<RemoteFileMetadata>;
            async fn get_root(&self) -> OperationResult<RemoteFileMetadata>;
        }
    }

    #[test]
    fn test_error_taxonomy_is_exhaustive() {
        let cases = [
            (OperationError::auth("401"), "Auth"),
            (OperationError::file_not_found("404"), "FileNotFound"),
            (OperationError::network_io("timeout"), "Network"),
            (OperationError::generic_io("500"), "Generic"),
            (OperationError::file_access("denied"), "Generic"),
            (OperationError::db("locked"), "Generic"),
        ];

        for (error, expected) in cases {
            let mapped = RemoteFsError::from(error.clone());
            let name = match &mapped {
                RemoteFsError::Auth(_) => "Auth",
                RemoteFsError::FileNotFound(_) => "FileNotFound",
                RemoteFsError::Network(_) => "Network",
                RemoteFsError::Generic(_) => "Generic",
            };
            assert_eq!(name, expected, "{:?}", error);
            assert_eq!(OperationError::from(mapped).kind, error.kind);
        }
    }

    #[tokio::test]
    async fn test_adapter_passes_results_through() {
        let mut client = MockClient::new();
        client
            .expect_get_file_info()
            .with(eq("/db.kdbx"))
            .returning(|path| {
                Ok(RemoteFileMetadata {
                    uid: path.to_string(),
                    path: path.to_string(),
                    name: "db.kdbx".to_string(),
                    revision: Some("rev1".to_string()),
                    is_directory: false,
                    modified: None,
                })
            });
        client
            .expect_get_root()
            .returning(|| Err(OperationError::network_io("offline")));

        let adapter = RemoteApiClientAdapter::new(client);

        let info = adapter.get_file_info("/db.kdbx").await.unwrap();
        assert_eq!(info.revision.as_deref(), Some("rev1"));

        let err = adapter.get_root().await.unwrap_err();
        assert!(err.is_network());
    }
}
