//! Operation error taxonomy shared by every storage backend.

use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of a failed file operation.
///
/// Callers branch on the kind, never on the message: network failures let the
/// unlock flow fall back to the cached copy, missing files offer "remove this
/// entry" instead of "retry".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationErrorKind {
    FileNotFound,
    FileAccess,
    NetworkIo,
    GenericIo,
    Auth,
    Db,
    BiometricDataInvalidated,
    /// The operation is not supported by this backend or in this state.
    IncorrectUseCase,
    /// Another operation already holds the file.
    FileIsAlreadyInProcessing,
    /// Local and remote copies diverged; the user has to pick one.
    Conflict,
    Generic,
}

impl OperationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationErrorKind::FileNotFound => "FileNotFound",
            OperationErrorKind::FileAccess => "FileAccess",
            OperationErrorKind::NetworkIo => "NetworkIo",
            OperationErrorKind::GenericIo => "GenericIo",
            OperationErrorKind::Auth => "Auth",
            OperationErrorKind::Db => "Db",
            OperationErrorKind::BiometricDataInvalidated => "BiometricDataInvalidated",
            OperationErrorKind::IncorrectUseCase => "IncorrectUseCase",
            OperationErrorKind::FileIsAlreadyInProcessing => "FileIsAlreadyInProcessing",
            OperationErrorKind::Conflict => "Conflict",
            OperationErrorKind::Generic => "Generic",
        }
    }
}

impl fmt::Display for OperationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

pub type OperationResult<T> = std::result::Result<T, OperationError>;

impl OperationError {
    pub fn new(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::FileNotFound, message)
    }

    pub fn file_access(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::FileAccess, message)
    }

    pub fn network_io(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::NetworkIo, message)
    }

    pub fn generic_io(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::GenericIo, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Auth, message)
    }

    pub fn db(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Db, message)
    }

    pub fn biometric_data_invalidated(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::BiometricDataInvalidated, message)
    }

    pub fn incorrect_use_case(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::IncorrectUseCase, message)
    }

    pub fn file_is_already_in_processing(file_uid: &str) -> Self {
        Self::new(
            OperationErrorKind::FileIsAlreadyInProcessing,
            format!("File is already being processed: {}", file_uid),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Conflict, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Generic, message)
    }

    pub fn is_network_error(&self) -> bool {
        self.kind == OperationErrorKind::NetworkIo
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            OperationErrorKind::FileNotFound => "The file no longer exists",
            OperationErrorKind::FileAccess => "Access to the file was denied",
            OperationErrorKind::NetworkIo => "The server could not be reached",
            OperationErrorKind::GenericIo => "The file could not be read or written",
            OperationErrorKind::Auth => "The server rejected the credentials",
            OperationErrorKind::Db => "The local cache could not be updated",
            OperationErrorKind::BiometricDataInvalidated => {
                "Biometric data changed, unlock with the password"
            }
            OperationErrorKind::IncorrectUseCase => "This action is not available here",
            OperationErrorKind::FileIsAlreadyInProcessing => "The file is being synchronized",
            OperationErrorKind::Conflict => {
                "The file was changed both locally and on the server"
            }
            OperationErrorKind::Generic => "Something went wrong",
        }
    }
}

impl From<std::io::Error> for OperationError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => OperationError::file_not_found(e.to_string()),
            std::io::ErrorKind::PermissionDenied => OperationError::file_access(e.to_string()),
            _ => OperationError::generic_io(e.to_string()),
        }
    }
}

impl From<BridgeError> for OperationError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::PermissionDenied(msg) => OperationError::file_access(msg),
            BridgeError::NotFound(msg) => OperationError::file_not_found(msg),
            BridgeError::Network(msg) => OperationError::network_io(msg),
            BridgeError::Io(io) => OperationError::from(io),
            other => OperationError::generic_io(other.to_string()),
        }
    }
}
