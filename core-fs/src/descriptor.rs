//! File descriptors and per-open options.

use core_auth::FSAuthority;
use serde::{Deserialize, Serialize};

/// Path of the root directory in every backend that uses `/`-separated paths.
pub const ROOT_PATH: &str = "/";

/// A file or directory on some storage backend.
///
/// `uid` is the identity the backend keeps stable across renames where it can
/// (document URI, WebDAV href, path inside a repository); `path` is what the
/// backend is addressed with. For most backends the two are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub fs_authority: FSAuthority,
    pub path: String,
    pub uid: String,
    pub name: String,
    pub is_directory: bool,
    pub is_root: bool,
    /// Last modification time in milliseconds since the epoch, when known.
    pub modified: Option<i64>,
}

impl FileDescriptor {
    /// Descriptor whose uid equals its path and whose name is the last path
    /// segment.
    pub fn from_path(
        fs_authority: FSAuthority,
        path: impl Into<String>,
        is_directory: bool,
    ) -> Self {
        let path = normalize_path(&path.into());
        let is_root = path == ROOT_PATH;
        Self {
            fs_authority,
            uid: path.clone(),
            name: file_name(&path).to_string(),
            path,
            is_directory: is_directory || is_root,
            is_root,
            modified: None,
        }
    }

    pub fn root(fs_authority: FSAuthority) -> Self {
        Self::from_path(fs_authority, ROOT_PATH, true)
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_modified(mut self, modified: Option<i64>) -> Self {
        self.modified = modified;
        self
    }
}

/// How a single open call may use the cache and the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FSOptions {
    pub is_cache_enabled: bool,
    pub is_write_enabled: bool,
    /// Never touch the network; serve the cached copy.
    pub is_cache_only: bool,
    /// Keep local writes in the cache and leave the upload to a later sync.
    pub is_postponed_sync_enabled: bool,
}

impl FSOptions {
    pub fn default_options() -> Self {
        Self {
            is_cache_enabled: true,
            is_write_enabled: true,
            is_cache_only: false,
            is_postponed_sync_enabled: false,
        }
    }

    pub fn read_only() -> Self {
        Self {
            is_write_enabled: false,
            ..Self::default_options()
        }
    }

    pub fn cache_only() -> Self {
        Self {
            is_cache_only: true,
            is_postponed_sync_enabled: true,
            ..Self::default_options()
        }
    }
}

impl Default for FSOptions {
    fn default() -> Self {
        Self::default_options()
    }
}

/// What `open_file_for_read`/`open_file_for_write` do when the file is in
/// conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OnConflictStrategy {
    /// Fail with a conflict error.
    #[default]
    Cancel,
    /// Go ahead with the local copy.
    Rewrite,
}

/// Collapse duplicate separators, force a leading `/` and drop a trailing one.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent of a normalized path; `None` for the root.
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) | None => Some(ROOT_PATH.to_string()),
        Some(idx) => Some(path[..idx].to_string()),
    }
}

pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}
