//! In-flight sync operations.
//!
//! At most one [`ProcessingUnit`] exists per file uid and authority. Every
//! provider works on a view of the map scoped to its own authority (see
//! [`StatusMap::scoped`]), so two accounts may process the same path at
//! the same time. A unit is claimed with
//! [`StatusMap::try_put`], which checks and inserts under one lock, and is
//! released when the returned [`ProcessingGuard`] drops: on success, on error,
//! on panic and when the owning future is cancelled.

use crate::model::authority_key;
use core_auth::FSAuthority;
use core_fs::SyncProgressStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStatus {
    Syncing,
    Downloading,
    Uploading,
}

impl From<ProcessingStatus> for SyncProgressStatus {
    fn from(status: ProcessingStatus) -> Self {
        match status {
            ProcessingStatus::Syncing => SyncProgressStatus::Syncing,
            ProcessingStatus::Downloading => SyncProgressStatus::Downloading,
            ProcessingStatus::Uploading => SyncProgressStatus::Uploading,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingUnit {
    pub processing_uid: Uuid,
    pub status: ProcessingStatus,
    pub file_uid: String,
    pub remote_path: String,
}

impl ProcessingUnit {
    pub fn new(
        status: ProcessingStatus,
        file_uid: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            processing_uid: Uuid::new_v4(),
            status,
            file_uid: file_uid.into(),
            remote_path: remote_path.into(),
        }
    }
}

/// Scope digest and file uid.
type UnitKey = (String, String);

/// Map of in-flight operations keyed by authority and file uid.
///
/// Cheap to clone; clones share the same map and scope.
#[derive(Debug, Clone, Default)]
pub struct StatusMap {
    units: Arc<Mutex<HashMap<UnitKey, ProcessingUnit>>>,
    scope: String,
}

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// View of the same map restricted to files of `authority`.
    pub fn scoped(&self, authority: &FSAuthority) -> Self {
        Self {
            units: Arc::clone(&self.units),
            scope: authority_key(authority),
        }
    }

    /// Claim `unit.file_uid` within this scope.
    ///
    /// Returns the unit back when another operation already holds the file.
    pub fn try_put(&self, unit: ProcessingUnit) -> Result<ProcessingGuard, ProcessingUnit> {
        let key = self.key(&unit.file_uid);
        let mut units = self.lock();
        if units.contains_key(&key) {
            trace!(file_uid = %unit.file_uid, "File already claimed");
            return Err(unit);
        }

        let guard = ProcessingGuard {
            map: self.clone(),
            file_uid: unit.file_uid.clone(),
            processing_uid: unit.processing_uid,
        };
        debug!(file_uid = %unit.file_uid, status = ?unit.status, "File claimed");
        units.insert(key, unit);
        Ok(guard)
    }

    /// Remove the unit for `file_uid` regardless of who owns it.
    pub fn remove(&self, file_uid: &str) -> Option<ProcessingUnit> {
        self.lock().remove(&self.key(file_uid))
    }

    pub fn get_by_file_uid(&self, file_uid: &str) -> Option<ProcessingUnit> {
        self.lock().get(&self.key(file_uid)).cloned()
    }

    pub fn get_by_remote_path(&self, remote_path: &str) -> Option<ProcessingUnit> {
        self.lock()
            .iter()
            .find(|((scope, _), unit)| *scope == self.scope && unit.remote_path == remote_path)
            .map(|(_, unit)| unit.clone())
    }

    pub fn is_processing(&self, file_uid: &str) -> bool {
        self.lock().contains_key(&self.key(file_uid))
    }

    /// Number of claimed files in this scope.
    pub fn len(&self) -> usize {
        self.lock()
            .keys()
            .filter(|(scope, _)| *scope == self.scope)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, file_uid: &str) -> UnitKey {
        (self.scope.clone(), file_uid.to_string())
    }

    fn set_status(&self, file_uid: &str, processing_uid: Uuid, status: ProcessingStatus) {
        if let Some(unit) = self.lock().get_mut(&self.key(file_uid)) {
            if unit.processing_uid == processing_uid {
                unit.status = status;
            }
        }
    }

    fn release(&self, file_uid: &str, processing_uid: Uuid) {
        let key = self.key(file_uid);
        let mut units = self.lock();
        if units
            .get(&key)
            .is_some_and(|unit| unit.processing_uid == processing_uid)
        {
            units.remove(&key);
            debug!(file_uid, "File released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UnitKey, ProcessingUnit>> {
        self.units
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of one claimed file. Dropping the guard releases the file.
#[derive(Debug)]
#[must_use = "the file is released as soon as the guard is dropped"]
pub struct ProcessingGuard {
    map: StatusMap,
    file_uid: String,
    processing_uid: Uuid,
}

impl ProcessingGuard {
    pub fn file_uid(&self) -> &str {
        &self.file_uid
    }

    /// Report the phase of the claimed operation.
    pub fn set_status(&self, status: ProcessingStatus) {
        self.map
            .set_status(&self.file_uid, self.processing_uid, status);
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.map.release(&self.file_uid, self.processing_uid);
    }
}
