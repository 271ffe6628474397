//! Per-backend credential suppliers.

use crate::types::{FSAuthority, ServerCredentials};

/// Supplies credentials for one storage backend and reports whether the user
/// must (re-)enter them before the backend can be used.
///
/// Every provider exposes exactly one authenticator.
pub trait FileSystemAuthenticator: Send + Sync {
    fn fs_authority(&self) -> &FSAuthority;

    fn is_authentication_required(&self) -> bool;

    fn credentials(&self) -> Option<&ServerCredentials> {
        self.fs_authority().credentials.as_ref()
    }
}

/// Authenticator for backends that never ask for credentials
/// (internal/external storage, SAF).
#[derive(Debug, Clone)]
pub struct NoAuthAuthenticator {
    authority: FSAuthority,
}

impl NoAuthAuthenticator {
    pub fn new(authority: FSAuthority) -> Self {
        Self { authority }
    }
}

impl FileSystemAuthenticator for NoAuthAuthenticator {
    fn fs_authority(&self) -> &FSAuthority {
        &self.authority
    }

    fn is_authentication_required(&self) -> bool {
        false
    }

    fn credentials(&self) -> Option<&ServerCredentials> {
        None
    }
}

/// Authenticator for remote backends holding server credentials.
#[derive(Debug, Clone)]
pub struct CredentialsAuthenticator {
    authority: FSAuthority,
}

impl CredentialsAuthenticator {
    pub fn new(authority: FSAuthority) -> Self {
        Self { authority }
    }
}

impl FileSystemAuthenticator for CredentialsAuthenticator {
    fn fs_authority(&self) -> &FSAuthority {
        &self.authority
    }

    fn is_authentication_required(&self) -> bool {
        !self
            .authority
            .credentials
            .as_ref()
            .is_some_and(ServerCredentials::is_complete)
    }
}
