//! Resolution cache.
//!
//! Remembers, per SID, the policy files of the last successful directory
//! round trip so a later run can still apply policy while the directory
//! is unreachable.
//!
//! The cache is read once when a resolver starts and written once when it
//! is done. Writes go to a sibling temp file that is synced and renamed
//! over the old file, so readers only ever see a complete cache.

mod codec;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::identity::Sid;
use crate::policy::PolicyFileSet;

pub use codec::MAGIC;

/// What the cache remembers for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Directory-sourced files of the last successful resolution.
    pub files: PolicyFileSet,
    /// When the directory round trip that produced `files` completed.
    pub resolved_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Record stamped with the current time.
    #[must_use]
    pub fn new(files: PolicyFileSet) -> Self {
        Self {
            files,
            resolved_at: Utc::now(),
        }
    }
}

/// Cached records keyed by SID.
pub type CacheMap = BTreeMap<Sid, CacheRecord>;

/// Durable store for a [`CacheMap`].
#[derive(Debug, Clone)]
pub struct ResolutionCache {
    path: PathBuf,
}

impl ResolutionCache {
    /// Cache stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cache, failing on anything but a missing file.
    ///
    /// # Errors
    /// - `CacheError::Io` if the file exists but cannot be read
    /// - `CacheError::Corrupt` if its content does not decode
    pub fn try_load(&self) -> Result<CacheMap, CacheError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CacheMap::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        codec::decode(&mut BufReader::new(file)).map_err(|e| CacheError::Corrupt {
            reason: e.to_string(),
        })
    }

    /// Reads the cache. A missing, unreadable or corrupt cache is empty.
    #[must_use]
    pub fn load(&self) -> CacheMap {
        match self.try_load() {
            Ok(map) => {
                debug!(path = %self.path.display(), records = map.len(), "loaded resolution cache");
                map
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unusable resolution cache");
                CacheMap::new()
            }
        }
    }

    /// Replaces the stored cache with `map`.
    ///
    /// # Errors
    /// Returns `CacheError` if the cache cannot be encoded or written.
    pub fn save(&self, map: &CacheMap) -> Result<(), CacheError> {
        let bytes = codec::encode(map).map_err(|e| CacheError::Encode {
            reason: e.to_string(),
        })?;

        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp).map_err(io_err)?;
            file.write_all(&bytes).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        debug!(path = %self.path.display(), records = map.len(), "saved resolution cache");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> CacheMap {
        let mut map = CacheMap::new();
        map.insert(
            Sid::parse("S-1-5-21-1-2-3-1105").unwrap(),
            CacheRecord::new(PolicyFileSet {
                machine_files: vec![PathBuf::from("/c/GPO1/MACHINE/REGISTRY.POL")],
                user_files: vec![PathBuf::from("/c/GPO1/USER/REGISTRY.POL")],
            }),
        );
        map
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache.gpoa"));
        assert!(cache.load().is_empty());
        assert!(cache.try_load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("nested/cache.gpoa"));
        let map = sample();
        cache.save(&map).unwrap();
        assert_eq!(cache.load(), map);
        assert!(!dir.path().join("nested/cache.gpoa.tmp").exists());
    }

    #[test]
    fn load_save_leaves_bytes_unchanged() {
        let dir = tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache.gpoa"));
        cache.save(&sample()).unwrap();
        let before = fs::read(cache.path()).unwrap();

        cache.save(&cache.load()).unwrap();
        let after = fs::read(cache.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache.gpoa"));
        cache.save(&sample()).unwrap();

        let mut bytes = fs::read(cache.path()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x55;
        fs::write(cache.path(), bytes).unwrap();

        assert!(matches!(cache.try_load(), Err(CacheError::Corrupt { .. })));
        assert!(cache.load().is_empty());
    }

    #[test]
    fn garbage_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.gpoa");
        fs::write(&path, b"\x80\x04\x95pickle").unwrap();
        assert!(ResolutionCache::new(path).load().is_empty());
    }

    #[test]
    fn save_overwrites_fully() {
        let dir = tempdir().unwrap();
        let cache = ResolutionCache::new(dir.path().join("cache.gpoa"));
        cache.save(&sample()).unwrap();
        cache.save(&CacheMap::new()).unwrap();
        assert!(cache.load().is_empty());
    }
}
