//! Document tree backed by a plain directory
//!
//! Desktop stand-in for the Android Storage Access Framework: documents are
//! addressed by `file://` URIs below a root directory the user picked, and
//! streams may only be opened for URIs the caller holds a persisted
//! permission for.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{DocumentMetadata, DocumentTree},
};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

const SCHEME: &str = "file://";

pub struct DirectoryDocumentTree {
    root: PathBuf,
    granted: Mutex<HashSet<PathBuf>>,
}

impl DirectoryDocumentTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            granted: Mutex::new(HashSet::new()),
        }
    }

    /// URI of the tree root
    pub fn root_uri(&self) -> String {
        Self::uri_for(&self.root)
    }

    pub fn uri_for(path: &Path) -> String {
        format!("{}{}", SCHEME, path.display())
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let raw = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| BridgeError::NotFound(format!("Unsupported URI: {}", uri)))?;
        let path = PathBuf::from(raw);

        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(BridgeError::PermissionDenied(format!(
                "{} is outside the granted tree",
                uri
            )));
        }
        Ok(path)
    }

    fn check_granted(&self, path: &Path) -> Result<()> {
        let granted = self
            .granted
            .lock()
            .map_err(|_| BridgeError::OperationFailed("permission table poisoned".into()))?;
        if path.ancestors().any(|p| granted.contains(p)) {
            Ok(())
        } else {
            Err(BridgeError::PermissionDenied(format!(
                "No persisted permission for {}",
                path.display()
            )))
        }
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> BridgeError {
        match e.kind() {
            std::io::ErrorKind::NotFound => BridgeError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                BridgeError::PermissionDenied(path.display().to_string())
            }
            _ => BridgeError::Io(e),
        }
    }

    async fn metadata_for(&self, path: &Path) -> Result<DocumentMetadata> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| Self::map_io_error(e, path))?;
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);

        Ok(DocumentMetadata {
            uri: Self::uri_for(path),
            display_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            is_directory: meta.is_dir(),
            last_modified,
            size: (!meta.is_dir()).then_some(meta.len()),
        })
    }
}

#[async_trait]
impl DocumentTree for DirectoryDocumentTree {
    async fn take_persistable_permission(&self, uri: &str) -> Result<()> {
        let path = self.resolve(uri)?;
        self.granted
            .lock()
            .map_err(|_| BridgeError::OperationFailed("permission table poisoned".into()))?
            .insert(path);
        debug!("Persisted document permission");
        Ok(())
    }

    async fn query(&self, uri: &str) -> Result<DocumentMetadata> {
        let path = self.resolve(uri)?;
        self.metadata_for(&path).await
    }

    async fn list_children(&self, uri: &str) -> Result<Vec<DocumentMetadata>> {
        let path = self.resolve(uri)?;
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| Self::map_io_error(e, &path))?;

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::map_io_error(e, &path))?
        {
            children.push(self.metadata_for(&entry.path()).await?);
        }
        children.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(children)
    }

    async fn parent(&self, uri: &str) -> Result<Option<DocumentMetadata>> {
        let path = self.resolve(uri)?;
        if path == self.root {
            return Ok(None);
        }
        match path.parent() {
            Some(parent) => self.metadata_for(parent).await.map(Some),
            None => Ok(None),
        }
    }

    async fn open_input(&self, uri: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let path = self.resolve(uri)?;
        self.check_granted(&path)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_io_error(e, &path))?;
        Ok(Box::new(file))
    }

    async fn open_output(&self, uri: &str) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let path = self.resolve(uri)?;
        self.check_granted(&path)?;
        let file = fs::File::create(&path)
            .await
            .map_err(|e| Self::map_io_error(e, &path))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_open_requires_persisted_permission() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db.kdbx"), b"vault").unwrap();
        let tree = DirectoryDocumentTree::new(dir.path());
        let uri = DirectoryDocumentTree::uri_for(&dir.path().join("db.kdbx"));

        assert!(matches!(
            tree.open_input(&uri).await,
            Err(BridgeError::PermissionDenied(_))
        ));

        tree.take_persistable_permission(&uri).await.unwrap();
        let mut content = String::new();
        tree.open_input(&uri)
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "vault");
    }

    #[tokio::test]
    async fn test_write_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let tree = DirectoryDocumentTree::new(dir.path());
        tree.take_persistable_permission(&tree.root_uri())
            .await
            .unwrap();

        let uri = DirectoryDocumentTree::uri_for(&dir.path().join("new.kdbx"));
        let mut out = tree.open_output(&uri).await.unwrap();
        out.write_all(b"data").await.unwrap();
        out.shutdown().await.unwrap();

        let children = tree.list_children(&tree.root_uri()).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].display_name, "new.kdbx");
        assert_eq!(children[0].size, Some(4));
        assert!(tree.parent(&tree.root_uri()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_and_foreign_documents() {
        let dir = tempfile::tempdir().unwrap();
        let tree = DirectoryDocumentTree::new(dir.path());

        let missing = DirectoryDocumentTree::uri_for(&dir.path().join("gone.kdbx"));
        assert!(matches!(
            tree.query(&missing).await,
            Err(BridgeError::NotFound(_))
        ));
        assert!(!tree.exists(&missing).await.unwrap());

        assert!(matches!(
            tree.query("file:///etc/passwd").await,
            Err(BridgeError::PermissionDenied(_))
        ));
    }
}
