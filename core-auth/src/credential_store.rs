//! Secure persistence of storage authorities
//!
//! Authorities embed server credentials, so they are stored through the host
//! [`SecureStore`] rather than the cache database. Each authority is saved
//! under a user-chosen name (e.g. the used-file entry it belongs to).
//!
//! ```no_run
//! use core_auth::{CredentialStore, FSAuthority, ServerCredentials};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store);
//! let authority = FSAuthority::webdav(ServerCredentials::basic(
//!     "https://dav.example.com/",
//!     "jo",
//!     "secret",
//! ));
//!
//! store.save("work", &authority).await?;
//! assert_eq!(store.load("work").await?, Some(authority));
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::FSAuthority;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "fs_authority:";

#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    /// Store an authority, overwriting any previous one with the same name.
    pub async fn save(&self, name: &str, authority: &FSAuthority) -> Result<()> {
        let json = authority.to_json()?;
        self.secure_store
            .set_secret(&Self::storage_key(name), json.as_bytes())
            .await
            .map_err(|e| {
                warn!(entry = name, error = %e, "Failed to store authority");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(entry = name, fs_type = %authority.fs_type, "Authority stored");
        Ok(())
    }

    /// Load an authority by name.
    ///
    /// Corrupted entries are deleted and reported as [`AuthError::Corrupted`].
    pub async fn load(&self, name: &str) -> Result<Option<FSAuthority>> {
        let key = Self::storage_key(name);
        let data = self
            .secure_store
            .get_secret(&key)
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;

        let Some(data) = data else {
            debug!(entry = name, "No stored authority");
            return Ok(None);
        };

        let decoded = String::from_utf8(data)
            .map_err(|e| e.to_string())
            .and_then(|json| FSAuthority::from_json(&json).map_err(|e| e.to_string()));

        match decoded {
            Ok(authority) => Ok(Some(authority)),
            Err(reason) => {
                warn!(entry = name, "Stored authority is corrupted, removing it");
                if let Err(e) = self.secure_store.delete_secret(&key).await {
                    warn!(entry = name, error = %e, "Failed to delete corrupted authority");
                }
                Err(AuthError::Corrupted {
                    name: name.to_string(),
                    reason,
                })
            }
        }
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        self.secure_store
            .delete_secret(&Self::storage_key(name))
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;
        info!(entry = name, "Authority removed");
        Ok(())
    }

    /// Names of all stored authorities, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let keys = self
            .secure_store
            .list_keys()
            .await
            .map_err(|e| AuthError::SecureStorageUnavailable(e.to_string()))?;

        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    fn storage_key(name: &str) -> String {
        format!("{}{}", KEY_PREFIX, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServerCredentials;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        data: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecureStore for MemoryStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.data.lock().unwrap().keys().cloned().collect())
        }
    }

    fn webdav() -> FSAuthority {
        FSAuthority::webdav(ServerCredentials::basic(
            "https://dav.example.com/",
            "jo",
            "secret",
        ))
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let store = CredentialStore::new(Arc::new(MemoryStore::default()));

        store.save("work", &webdav()).await.unwrap();
        store
            .save("personal", &FSAuthority::internal_storage())
            .await
            .unwrap();

        assert_eq!(store.load("work").await.unwrap(), Some(webdav()));
        assert_eq!(store.list().await.unwrap(), vec!["personal", "work"]);

        store.remove("work").await.unwrap();
        assert_eq!(store.load("work").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_removed() {
        let backing = Arc::new(MemoryStore::default());
        backing
            .set_secret("fs_authority:broken", b"{\"fs_type\":")
            .await
            .unwrap();
        let store = CredentialStore::new(backing.clone());

        assert!(matches!(
            store.load("broken").await,
            Err(AuthError::Corrupted { .. })
        ));
        assert!(backing
            .get_secret("fs_authority:broken")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_foreign_keys_are_not_listed() {
        let backing = Arc::new(MemoryStore::default());
        backing.set_secret("unrelated", b"x").await.unwrap();
        let store = CredentialStore::new(backing);

        assert!(store.list().await.unwrap().is_empty());
    }
}
