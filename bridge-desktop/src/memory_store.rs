//! Process-local secret storage

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::SecureStore};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-memory [`SecureStore`] for hosts without a keychain and for tests.
///
/// Nothing is persisted; secrets live until the store is dropped.
#[derive(Default)]
pub struct InMemorySecureStore {
    secrets: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.secrets
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.secrets.read().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.secrets.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.secrets.read().await.keys().cloned().collect())
    }
}
