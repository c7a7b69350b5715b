//! Directory-service seam.
//!
//! The resolver only needs two things from the directory: the ordered list
//! of policy objects that apply to an identity, and a best-effort refresh
//! of their replicated file trees. Talking LDAP/SMB is left to
//! implementations of [`DirectoryService`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use tracing::debug;

use crate::error::{DirectoryError, ReplicationError};
use crate::identity::{Identity, Sid};
use crate::policy::PolicyObject;

/// Source of applicable policy objects.
pub trait DirectoryService: Send + Sync {
    /// Policy objects applying to `identity`, lowest precedence first.
    ///
    /// # Errors
    /// Returns `DirectoryError` on network, authentication or protocol failure.
    fn list_applicable_objects(&self, identity: &Identity) -> Result<Vec<PolicyObject>, DirectoryError>;

    /// Refreshes the local copies of the objects' file trees.
    ///
    /// # Errors
    /// Returns `ReplicationError` for the first object that could not be refreshed.
    fn refresh_replication(&self, objects: &[PolicyObject]) -> Result<(), ReplicationError>;
}

/// In-memory directory for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    objects: RwLock<HashMap<Sid, Vec<PolicyObject>>>,
    offline: AtomicBool,
    replication_broken: AtomicBool,
    list_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl InMemoryDirectory {
    /// Empty, reachable directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the objects returned for `sid`.
    pub fn set_objects(&self, sid: Sid, objects: Vec<PolicyObject>) {
        if let Ok(mut map) = self.objects.write() {
            map.insert(sid, objects);
        }
    }

    /// While offline every listing fails with `Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While broken every refresh fails.
    pub fn set_replication_broken(&self, broken: bool) {
        self.replication_broken.store(broken, Ordering::SeqCst);
    }

    /// Number of `list_applicable_objects` calls so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh_replication` calls so far.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl DirectoryService for InMemoryDirectory {
    fn list_applicable_objects(&self, identity: &Identity) -> Result<Vec<PolicyObject>, DirectoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::unreachable("directory is offline"));
        }
        let map = self.objects.read().map_err(|_| DirectoryError::Protocol {
            message: "poisoned lock: directory.objects".to_string(),
        })?;
        Ok(map.get(&identity.sid).cloned().unwrap_or_default())
    }

    fn refresh_replication(&self, objects: &[PolicyObject]) -> Result<(), ReplicationError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.replication_broken.load(Ordering::SeqCst) {
            let object = objects.first().map(|o| o.name.clone()).unwrap_or_default();
            return Err(ReplicationError {
                object,
                message: "replication disabled".to_string(),
            });
        }
        Ok(())
    }
}

/// Directory backed by a JSON manifest written by an external job.
///
/// The manifest maps SIDs to their ordered policy objects:
/// ```json
/// { "S-1-5-21-...-1105": [ { "name": "{GUID}", "file_sys_path": "\\\\dom\\SysVol\\..." } ] }
/// ```
/// The job replicates the file trees itself, so refreshing is a no-op.
#[derive(Debug, Clone)]
pub struct ManifestDirectory {
    path: PathBuf,
}

impl ManifestDirectory {
    /// Directory backed by the manifest at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the manifest.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<HashMap<Sid, Vec<PolicyObject>>, DirectoryError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            DirectoryError::unreachable(format!("cannot read manifest {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| DirectoryError::Protocol {
            message: format!("invalid manifest {}: {e}", self.path.display()),
        })
    }
}

impl DirectoryService for ManifestDirectory {
    fn list_applicable_objects(&self, identity: &Identity) -> Result<Vec<PolicyObject>, DirectoryError> {
        let mut manifest = self.read()?;
        let objects = manifest.remove(&identity.sid).unwrap_or_default();
        debug!(identity = %identity, objects = objects.len(), "read policy objects from manifest");
        Ok(objects)
    }

    fn refresh_replication(&self, _objects: &[PolicyObject]) -> Result<(), ReplicationError> {
        Ok(())
    }
}
