use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed ({context}): {source}")]
    SerializationFailed {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Stored authority '{name}' is corrupted: {reason}")]
    Corrupted { name: String, reason: String },

    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, AuthError>;
