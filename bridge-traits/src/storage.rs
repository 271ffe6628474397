//! Storage Abstractions
//!
//! Provides platform-agnostic traits for secure credential storage and for
//! document trees the host grants access to (Android Storage Access Framework,
//! desktop directory pickers).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Secure credential storage trait
///
/// Abstracts secure storage mechanisms:
/// - macOS/iOS: Keychain
/// - Android: Keystore (hardware-backed when available)
/// - Windows: DPAPI
/// - Linux: Secret Service / libsecret
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Encrypt data at rest
/// - Use platform-provided secure storage when available
/// - Never log or expose sensitive data
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn store_authority(store: &dyn SecureStore, json: &str) -> Result<()> {
///     store.set_secret("fs_authority:work", json.as_bytes()).await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value, replacing any previous value under `key`
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check if a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// List all secret keys (without values)
    async fn list_keys(&self) -> Result<Vec<String>>;
}

/// Metadata of a single document inside a host document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Opaque, stable document URI
    pub uri: String,
    pub display_name: String,
    pub is_directory: bool,
    /// Last modification time in milliseconds since the Unix epoch
    pub last_modified: Option<i64>,
    pub size: Option<u64>,
}

/// Host document tree (Storage Access Framework on Android)
///
/// Documents are addressed by opaque URIs handed out by the host. Access to a
/// URI may be revoked at any time; implementations report that as
/// [`BridgeError::PermissionDenied`](crate::BridgeError::PermissionDenied)
/// and missing documents as [`BridgeError::NotFound`](crate::BridgeError::NotFound).
#[async_trait]
pub trait DocumentTree: Send + Sync {
    /// Persist read/write access to `uri` across process restarts.
    async fn take_persistable_permission(&self, uri: &str) -> Result<()>;

    /// Look up a single document
    async fn query(&self, uri: &str) -> Result<DocumentMetadata>;

    /// List the children of a directory document
    async fn list_children(&self, uri: &str) -> Result<Vec<DocumentMetadata>>;

    /// Parent of a document, `None` when the document is a tree root
    async fn parent(&self, uri: &str) -> Result<Option<DocumentMetadata>>;

    /// Open a document for streaming reads
    async fn open_input(&self, uri: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Open a document for streaming writes, truncating existing content
    async fn open_output(&self, uri: &str) -> Result<Box<dyn AsyncWrite + Send + Unpin>>;

    /// Check whether a document exists
    async fn exists(&self, uri: &str) -> Result<bool> {
        match self.query(uri).await {
            Ok(_) => Ok(true),
            Err(crate::BridgeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_metadata_serde() {
        let metadata = DocumentMetadata {
            uri: "content://tree/primary%3Avault/document/db.kdbx".to_string(),
            display_name: "db.kdbx".to_string(),
            is_directory: false,
            last_modified: Some(1_700_000_000_000),
            size: Some(1024),
        };

        let json = serde_json::to_string(&metadata).unwrap();
        let decoded: DocumentMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, metadata);
    }
}
