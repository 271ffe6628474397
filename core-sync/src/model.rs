use core_auth::{FSAuthority, FSType, ServerCredentials};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Cache row for one remote file under one authority.
///
/// The row is the only record of which revision the cached copy was taken
/// from; it is written only after a transfer succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: Option<i64>,
    pub uid: String,
    pub remote_path: String,
    pub fs_type: FSType,
    /// Digest of the owning authority, see [`authority_key`].
    pub authority_key: String,
    /// Server revision the cached copy corresponds to.
    pub revision: Option<String>,
    pub is_downloaded: bool,
    pub is_locally_modified: bool,
    pub is_uploaded: bool,
    pub last_download_timestamp: Option<i64>,
    pub last_modification_timestamp: Option<i64>,
    pub last_remote_modification_timestamp: Option<i64>,
}

impl RemoteFile {
    pub fn new(
        uid: impl Into<String>,
        remote_path: impl Into<String>,
        authority: &FSAuthority,
    ) -> Self {
        Self {
            id: None,
            uid: uid.into(),
            remote_path: remote_path.into(),
            fs_type: authority.fs_type,
            authority_key: authority_key(authority),
            revision: None,
            is_downloaded: false,
            is_locally_modified: false,
            is_uploaded: false,
            last_download_timestamp: None,
            last_modification_timestamp: None,
            last_remote_modification_timestamp: None,
        }
    }

    pub fn belongs_to(&self, authority: &FSAuthority) -> bool {
        self.authority_key == authority_key(authority)
    }
}

/// Stable digest identifying an authority, credentials included.
///
/// Equal authorities produce equal keys; the key reveals nothing about the
/// credentials it was derived from.
pub fn authority_key(authority: &FSAuthority) -> String {
    let mut hasher = Sha256::new();
    hasher.update(authority.fs_type.as_str());
    hasher.update([u8::from(authority.is_browsable)]);
    match &authority.credentials {
        None => hasher.update([0u8]),
        Some(ServerCredentials::Basic {
            server_url,
            username,
            password,
        }) => {
            for part in ["basic", server_url.as_str(), username.as_str(), password.as_str()] {
                hasher.update([1u8]);
                hasher.update(part);
            }
        }
        Some(ServerCredentials::Git {
            url,
            username,
            password,
            branch,
        }) => {
            let parts = [
                "git",
                url.as_str(),
                username.as_str(),
                password.as_str(),
                branch.as_str(),
            ];
            for part in parts {
                hasher.update([1u8]);
                hasher.update(part);
            }
        }
    }
    to_hex(&hasher.finalize())
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
