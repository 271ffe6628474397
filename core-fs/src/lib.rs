//! # File System Abstraction
//!
//! One interface over every place a password database can live.
//!
//! ## Overview
//!
//! - [`FileSystemProvider`] lists, opens and writes files on one backend.
//! - [`FileSystemSyncProcessor`] reconciles a cached copy with its remote
//!   copy; local backends ship no-op processors.
//! - [`FileSystemResolver`] hands out one provider per [`FSAuthority`](core_auth::FSAuthority),
//!   built by the [`Factory`] registered for its backend type.
//! - [`GuardedWriter`] wraps every writer so that late flushes and closes
//!   never touch a finished stream.
//!
//! Local device storage is served by [`RegularFileSystemProvider`], host
//! documents by [`SafFileSystemProvider`]. Remote backends live in
//! `core-sync`.

pub mod descriptor;
pub mod error;
pub mod guarded;
pub mod provider;
pub mod regular;
pub mod resolver;
pub mod saf;
pub mod sync;

pub use descriptor::{FSOptions, FileDescriptor, OnConflictStrategy};
pub use error::{OperationError, OperationErrorKind, OperationResult};
pub use guarded::{GuardedWriter, WriterState, WriterStateHandle};
pub use provider::{FileReader, FileSystemProvider, FileWriter};
pub use regular::RegularFileSystemProvider;
pub use resolver::{Factory, FileSystemResolver, FileSystemResolverBuilder};
pub use saf::{SafFileSystemProvider, SafFileSystemSyncProcessor};
pub use sync::{
    ConflictResolutionStrategy, FileSystemSyncProcessor, LocalSyncProcessor, SyncConflictInfo,
    SyncProgressStatus, SyncState, SyncStatus, SyncStrategy,
};
