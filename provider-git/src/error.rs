//! Error types for the Git provider

use core_fs::OperationError;
use git2::{ErrorClass, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Not found in repository: {path}")]
    NotFound { path: String },

    /// The remote refused the update, usually because it moved on
    #[error("Push rejected: {0}")]
    PushRejected(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Git credentials are missing")]
    MissingCredentials,

    #[error("Invalid repository path: {0}")]
    InvalidPath(String),

    #[error("Git error: {0}")]
    Git(git2::Error),

    #[error("Git task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

impl From<git2::Error> for GitError {
    fn from(error: git2::Error) -> Self {
        if error.code() == ErrorCode::Auth {
            return GitError::AuthenticationFailed(error.message().to_string());
        }
        match error.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh => {
                GitError::NetworkError(error.message().to_string())
            }
            _ => GitError::Git(error),
        }
    }
}

impl From<tokio::task::JoinError> for GitError {
    fn from(error: tokio::task::JoinError) -> Self {
        GitError::TaskFailed(error.to_string())
    }
}

impl From<GitError> for OperationError {
    fn from(error: GitError) -> Self {
        match error {
            GitError::AuthenticationFailed(_) | GitError::MissingCredentials => {
                OperationError::auth(error.to_string())
            }
            GitError::NotFound { path } => OperationError::file_not_found(path),
            GitError::NetworkError(message) => OperationError::network_io(message),
            GitError::InvalidPath(_) => OperationError::file_access(error.to_string()),
            GitError::PushRejected(_) | GitError::Git(_) => {
                OperationError::generic_io(error.to_string())
            }
            GitError::TaskFailed(message) => OperationError::generic(message),
            GitError::Io(e) => e.into(),
        }
    }
}
