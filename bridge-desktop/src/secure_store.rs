//! Secure Credential Storage using OS Keychain

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::{debug, error};

const INDEX_KEY: &str = "__passvault_key_index";

/// Keyring-based secure storage implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service (libsecret)
///
/// The OS keychains cannot enumerate entries, so the store keeps its own key
/// index in a dedicated entry.
pub struct KeyringSecureStore {
    service_name: String,
    index_lock: Mutex<()>,
}

impl KeyringSecureStore {
    /// Create a new secure store with default service name
    pub fn new() -> Self {
        Self::with_service_name("passvault-core")
    }

    /// Create a new secure store with custom service name
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            index_lock: Mutex::new(()),
        }
    }

    fn get_entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::OperationFailed(format!("Keyring error: {}", e))
    }

    fn read_index(&self) -> Result<Vec<String>> {
        match self.get_entry(INDEX_KEY)?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| BridgeError::OperationFailed(format!("Corrupt key index: {}", e))),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn write_index(&self, keys: &[String]) -> Result<()> {
        let json = serde_json::to_string(keys)
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
        self.get_entry(INDEX_KEY)?
            .set_password(&json)
            .map_err(Self::map_keyring_error)
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        // Keyring only supports strings
        let encoded = STANDARD.encode(value);
        self.get_entry(key)?
            .set_password(&encoded)
            .map_err(Self::map_keyring_error)?;

        let _guard = self.index_lock.lock().await;
        let mut keys = self.read_index()?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.write_index(&keys)?;
        }

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get_entry(key)?.get_password() {
            Ok(encoded) => {
                let decoded = STANDARD.decode(&encoded).map_err(|e| {
                    error!(key = key, error = %e, "Failed to decode secret");
                    BridgeError::OperationFailed(format!("Failed to decode secret: {}", e))
                })?;
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match self.get_entry(key)?.delete_credential() {
            Ok(_) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(Self::map_keyring_error(e)),
        }

        let _guard = self.index_lock.lock().await;
        let mut keys = self.read_index()?;
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            self.write_index(&keys)?;
        }

        debug!(key = key, "Deleted secret from keyring");
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let _guard = self.index_lock.lock().await;
        self.read_index()
    }
}
