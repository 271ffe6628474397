//! # Git Provider
//!
//! Remote backend for databases kept in a Git repository.
//!
//! A working clone lives under `<cache_dir>/git/`. Downloads fetch the
//! configured branch, reset the clone onto it and copy the file out; uploads
//! copy the file in, commit and push. The revision of a file is the id of the
//! last commit that changed it.
//!
//! git2 is blocking, so every operation runs on the tokio blocking pool
//! behind a per-repository lock.

pub mod client;
pub mod error;
pub mod factory;
pub mod repo;

pub use client::{workdir_for, GitClient, RepoLocks};
pub use error::{GitError, Result};
pub use factory::GitFactory;
pub use repo::GitAuthor;
