//! Error types for the WebDAV provider

use bridge_traits::error::BridgeError;
use core_fs::OperationError;
use thiserror::Error;

/// WebDAV provider errors
#[derive(Error, Debug)]
pub enum WebDavError {
    /// The server rejected the credentials
    #[error("Authentication failed (status {status_code})")]
    AuthenticationFailed { status_code: u16 },

    /// No resource at the requested path
    #[error("Not found on server: {path}")]
    NotFound { path: String },

    /// Any other non-success response
    #[error("WebDAV request failed (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Malformed multistatus body
    #[error("Failed to parse server response: {0}")]
    ParseError(String),

    /// The authority carries no basic credentials
    #[error("WebDAV credentials are missing")]
    MissingCredentials,

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

impl WebDavError {
    /// Classify a completed response that was not successful.
    pub fn from_status(status_code: u16, path: &str, body: &[u8]) -> Self {
        match status_code {
            401 | 403 => WebDavError::AuthenticationFailed { status_code },
            404 | 410 => WebDavError::NotFound {
                path: path.to_string(),
            },
            _ => WebDavError::ApiError {
                status_code,
                message: String::from_utf8_lossy(body).trim().chars().take(200).collect(),
            },
        }
    }
}

/// Result type for WebDAV operations
pub type Result<T> = std::result::Result<T, WebDavError>;

impl From<WebDavError> for OperationError {
    fn from(error: WebDavError) -> Self {
        match error {
            WebDavError::AuthenticationFailed { .. } | WebDavError::MissingCredentials => {
                OperationError::auth(error.to_string())
            }
            WebDavError::NotFound { path } => OperationError::file_not_found(path),
            WebDavError::ApiError { .. } | WebDavError::ParseError(_) => {
                OperationError::generic_io(error.to_string())
            }
            WebDavError::BridgeError(e) => e.into(),
        }
    }
}
