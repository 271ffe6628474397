//! # Remote File Sync
//!
//! Keeps cached copies of remote database files in line with the server.
//!
//! ## Components
//!
//! - **Cache** (`model`, `repository`, `cache`): one SQLite row per remote file
//!   recording the revision the local copy was taken from
//! - **Status map** (`status`): at most one in-flight operation per file
//! - **API clients** (`api`): backend contract and the typed error taxonomy
//!   sync decisions are made on
//! - **Processor** (`processor`): status computation, upload, download and
//!   conflict resolution
//! - **Provider** (`remote_provider`): `FileSystemProvider` for remote
//!   backends, serving reads and writes from the cache

pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod model;
pub mod processor;
pub mod remote_provider;
pub mod repository;
pub mod status;

pub use api::{
    RemoteApiClient, RemoteApiClientAdapter, RemoteApiClientV2, RemoteFileMetadata,
    RemoteFsError, RemoteResult,
};
pub use cache::RemoteFileCache;
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, SyncError};
pub use model::{authority_key, RemoteFile};
pub use processor::{compute_sync_status, RemoteFileSyncProcessor, SyncContext};
pub use remote_provider::RemoteFileSystemProvider;
pub use repository::{RemoteFileRepository, SqliteRemoteFileRepository};
pub use sqlx::SqlitePool;
pub use status::{ProcessingGuard, ProcessingStatus, ProcessingUnit, StatusMap};
