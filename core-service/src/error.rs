use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Configuration error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
