use core_fs::OperationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Cached file {0} not found")]
    RowNotFound(i64),

    #[error("Cache row has no id")]
    MissingId,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<SyncError> for OperationError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Io(io) => OperationError::from(io),
            other => OperationError::db(other.to_string()),
        }
    }
}
