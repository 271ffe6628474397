use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Storage backend kinds.
///
/// The set is closed: every backend the core can talk to is listed here and
/// the resolver keeps one provider factory per variant.
///
/// # Examples
///
/// ```
/// use core_auth::FSType;
///
/// assert_eq!(FSType::parse("webdav"), Some(FSType::WebDav));
/// assert!(FSType::Git.is_remote());
/// assert!(!FSType::Saf.is_remote());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FSType {
    /// App-private storage
    #[serde(rename = "internal")]
    InternalStorage,
    /// Shared device storage, gated by a runtime permission
    #[serde(rename = "external")]
    ExternalStorage,
    /// Documents granted through the Storage Access Framework
    #[serde(rename = "saf")]
    Saf,
    #[serde(rename = "webdav")]
    WebDav,
    #[serde(rename = "git")]
    Git,
}

impl FSType {
    pub const ALL: [FSType; 5] = [
        FSType::InternalStorage,
        FSType::ExternalStorage,
        FSType::Saf,
        FSType::WebDav,
        FSType::Git,
    ];

    /// Stable identifier used in persisted rows and cache paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            FSType::InternalStorage => "internal",
            FSType::ExternalStorage => "external",
            FSType::Saf => "saf",
            FSType::WebDav => "webdav",
            FSType::Git => "git",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "internal" | "internal_storage" => Some(FSType::InternalStorage),
            "external" | "external_storage" => Some(FSType::ExternalStorage),
            "saf" => Some(FSType::Saf),
            "webdav" => Some(FSType::WebDav),
            "git" => Some(FSType::Git),
            _ => None,
        }
    }

    /// Whether files of this type have a remote copy that needs syncing.
    pub fn is_remote(&self) -> bool {
        matches!(self, FSType::WebDav | FSType::Git)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FSType::InternalStorage => "Internal storage",
            FSType::ExternalStorage => "External storage",
            FSType::Saf => "Device files",
            FSType::WebDav => "WebDAV",
            FSType::Git => "Git",
        }
    }
}

impl fmt::Display for FSType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Already-decrypted server credentials.
///
/// # Security
///
/// `Debug` redacts passwords. Credentials are persisted only through
/// [`CredentialStore`](crate::CredentialStore).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerCredentials {
    /// HTTP basic credentials for a WebDAV server
    Basic {
        server_url: String,
        username: String,
        password: String,
    },
    /// Remote repository holding the database file
    Git {
        url: String,
        username: String,
        password: String,
        branch: String,
    },
}

impl ServerCredentials {
    pub fn basic(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ServerCredentials::Basic {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn git(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        ServerCredentials::Git {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            branch: branch.into(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            ServerCredentials::Basic { server_url, .. } => server_url,
            ServerCredentials::Git { url, .. } => url,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            ServerCredentials::Basic { username, .. } | ServerCredentials::Git { username, .. } => {
                username
            }
        }
    }

    pub fn password(&self) -> &str {
        match self {
            ServerCredentials::Basic { password, .. } | ServerCredentials::Git { password, .. } => {
                password
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.url().trim().is_empty()
            && !self.username().is_empty()
            && !self.password().is_empty()
    }
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerCredentials::Basic {
                server_url,
                username,
                ..
            } => f
                .debug_struct("Basic")
                .field("server_url", server_url)
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            ServerCredentials::Git {
                url,
                username,
                branch,
                ..
            } => f
                .debug_struct("Git")
                .field("url", url)
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field("branch", branch)
                .finish(),
        }
    }
}

/// Which backend, and which account on it, owns a file.
///
/// Authorities are compared by value, credentials included, and serve as the
/// key of the provider cache: equal authorities always resolve to the same
/// provider instance.
///
/// # Examples
///
/// ```
/// use core_auth::{FSAuthority, FSType, ServerCredentials};
///
/// let authority = FSAuthority::webdav(ServerCredentials::basic(
///     "https://dav.example.com/vaults/",
///     "jo",
///     "secret",
/// ));
/// assert_eq!(authority.fs_type, FSType::WebDav);
///
/// let json = authority.to_json().unwrap();
/// assert_eq!(FSAuthority::from_json(&json).unwrap(), authority);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FSAuthority {
    pub credentials: Option<ServerCredentials>,
    pub fs_type: FSType,
    pub is_browsable: bool,
}

impl FSAuthority {
    pub fn new(
        fs_type: FSType,
        credentials: Option<ServerCredentials>,
        is_browsable: bool,
    ) -> Self {
        Self {
            credentials,
            fs_type,
            is_browsable,
        }
    }

    pub fn internal_storage() -> Self {
        Self::new(FSType::InternalStorage, None, true)
    }

    pub fn external_storage() -> Self {
        Self::new(FSType::ExternalStorage, None, true)
    }

    /// SAF documents are picked through the host UI, never browsed.
    pub fn saf() -> Self {
        Self::new(FSType::Saf, None, false)
    }

    pub fn webdav(credentials: ServerCredentials) -> Self {
        Self::new(FSType::WebDav, Some(credentials), true)
    }

    pub fn git(credentials: ServerCredentials) -> Self {
        Self::new(FSType::Git, Some(credentials), false)
    }

    /// Serialize for used-file records and cache rows.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| AuthError::SerializationFailed {
            context: "fs authority".to_string(),
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let authority: FSAuthority =
            serde_json::from_str(json).map_err(|source| AuthError::SerializationFailed {
                context: "fs authority".to_string(),
                source,
            })?;
        authority.validate()?;
        Ok(authority)
    }

    /// Remote authorities need credentials of the matching kind.
    pub fn validate(&self) -> Result<()> {
        match (self.fs_type, &self.credentials) {
            (FSType::WebDav, Some(ServerCredentials::Basic { .. }))
            | (FSType::Git, Some(ServerCredentials::Git { .. })) => Ok(()),
            (FSType::WebDav, _) => Err(AuthError::InvalidAuthority(
                "WebDAV authority requires basic credentials".to_string(),
            )),
            (FSType::Git, _) => Err(AuthError::InvalidAuthority(
                "Git authority requires git credentials".to_string(),
            )),
            (_, None) => Ok(()),
            (fs_type, Some(_)) => Err(AuthError::InvalidAuthority(format!(
                "{} authority does not take credentials",
                fs_type
            ))),
        }
    }

    pub fn server_url(&self) -> Option<&str> {
        self.credentials.as_ref().map(ServerCredentials::url)
    }
}

impl fmt::Display for FSAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.server_url() {
            Some(url) => write!(f, "{}:{}", self.fs_type, url),
            None => write!(f, "{}", self.fs_type),
        }
    }
}
