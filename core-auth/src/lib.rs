//! # Storage Authorities & Authentication
//!
//! Identity of storage backends and the credentials that unlock them.
//!
//! ## Overview
//!
//! - [`FSType`] enumerates the storage backends.
//! - [`FSAuthority`] names a backend plus the account on it; it is the key
//!   under which providers are cached.
//! - [`FileSystemAuthenticator`] tells callers whether credentials must be
//!   entered before a backend can be used.
//! - [`CredentialStore`] persists authorities (with their credentials)
//!   through the host secure store.

pub mod authenticator;
pub mod credential_store;
pub mod error;
pub mod types;

pub use authenticator::{CredentialsAuthenticator, FileSystemAuthenticator, NoAuthAuthenticator};
pub use credential_store::CredentialStore;
pub use error::{AuthError, Result};
pub use types::{FSAuthority, FSType, ServerCredentials};
