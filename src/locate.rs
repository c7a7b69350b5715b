//! Locating the policy files of a single policy object.
//!
//! The directory hands out a server-side path for every object's file
//! tree. That path is untrusted: it is reduced to a relative path below
//! the local replication root before it is used for anything.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::classify::PathClassifier;
use crate::error::LocatorError;
use crate::policy::{PolicyFileSet, PolicyObject};

/// Recursive file enumeration.
pub trait DirectoryWalker: Send + Sync {
    /// Lists every regular file below `dir`.
    ///
    /// # Errors
    /// Returns an I/O error if `dir` or one of its subdirectories cannot be read.
    fn list_files_recursive(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Walks the local file system. Output is sorted so runs are reproducible.
///
/// Symbolic links are never followed, neither for directories nor for
/// files, so nothing outside `dir` is ever listed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWalker;

impl DirectoryWalker for FsWalker {
    fn list_files_recursive(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Reduces an untrusted server path to a safe relative path.
///
/// Both `/` and `\` separate components. When a `sysvol` component is
/// present only what follows it is kept. Empty and `.` components are
/// dropped, components are upper-cased to match the replicated layout.
///
/// # Errors
/// Returns `LocatorError::UnsafePath` for `..` components, NUL bytes,
/// drive prefixes, or a path with nothing left.
pub fn sanitize_sysvol_path(raw: &str) -> Result<PathBuf, LocatorError> {
    let reject = |reason: &'static str| LocatorError::UnsafePath {
        path: raw.to_string(),
        reason,
    };

    if raw.contains('\0') {
        return Err(reject("contains a NUL byte"));
    }

    let parts: Vec<&str> = raw.split(['/', '\\']).collect();
    let start = parts
        .iter()
        .position(|p| p.eq_ignore_ascii_case("sysvol"))
        .map_or(0, |pos| pos + 1);

    let mut safe = PathBuf::new();
    for &part in &parts[start..] {
        match part {
            "" | "." => continue,
            ".." => return Err(reject("parent directory component")),
            p if p.contains(':') => return Err(reject("drive or stream prefix")),
            p => safe.push(p.to_uppercase()),
        }
    }

    if safe.as_os_str().is_empty() {
        return Err(reject("no usable components"));
    }
    Ok(safe)
}

/// Finds the machine and user policy files of one policy object.
pub struct PolicyTreeLocator<W: DirectoryWalker = FsWalker> {
    root: PathBuf,
    walker: W,
    classifier: PathClassifier,
}

impl PolicyTreeLocator<FsWalker> {
    /// Locator over the local file system, rooted at the replication cache.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_walker(root, FsWalker)
    }
}

impl<W: DirectoryWalker> PolicyTreeLocator<W> {
    /// Locator with a custom walker.
    #[must_use]
    pub fn with_walker(root: impl Into<PathBuf>, walker: W) -> Self {
        Self {
            root: root.into(),
            walker,
            classifier: PathClassifier::new(),
        }
    }

    /// The local replication root all object trees live under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local directory holding `object`'s replicated tree.
    ///
    /// # Errors
    /// Returns `LocatorError::UnsafePath` if the object's path fails sanitization.
    pub fn tree_path(&self, object: &PolicyObject) -> Result<Option<PathBuf>, LocatorError> {
        match object.file_sys_path.as_deref() {
            Some(raw) => Ok(Some(self.root.join(sanitize_sysvol_path(raw)?))),
            None => Ok(None),
        }
    }

    /// Lists and classifies the policy files of `object`.
    ///
    /// An object without a file-system path, or whose tree was never
    /// replicated, contributes nothing.
    ///
    /// # Errors
    /// - `UnsafePath` if the object's path is rejected
    /// - `CacheRootMissing` if the replication root does not exist
    /// - `CacheRootUnreadable` if the replication root cannot be listed
    /// - `Io` if traversal of this object's tree fails
    pub fn locate(&self, object: &PolicyObject) -> Result<PolicyFileSet, LocatorError> {
        let Some(tree) = self.tree_path(object)? else {
            warn!(object = %object.name, "no file system path assigned to policy object");
            return Ok(PolicyFileSet::new());
        };
        debug!(object = %object.name, path = %tree.display(), "locating policy files");

        self.check_root()?;
        if !tree.is_dir() {
            warn!(
                object = %object.name,
                path = %tree.display(),
                "policy tree not replicated locally"
            );
            return Ok(PolicyFileSet::new());
        }

        let files = self
            .walker
            .list_files_recursive(&tree)
            .map_err(|source| LocatorError::Io {
                path: tree.clone(),
                source,
            })?;

        let relative: Vec<PathBuf> = files
            .iter()
            .filter_map(|f| f.strip_prefix(&tree).ok().map(Path::to_path_buf))
            .collect();
        let classified = self.classifier.classify(&relative);

        Ok(PolicyFileSet {
            machine_files: classified.machine_files.into_iter().map(|p| tree.join(p)).collect(),
            user_files: classified.user_files.into_iter().map(|p| tree.join(p)).collect(),
        })
    }

    fn check_root(&self) -> Result<(), LocatorError> {
        match fs::read_dir(&self.root) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound || !self.root.is_dir() => {
                Err(LocatorError::CacheRootMissing {
                    path: self.root.clone(),
                })
            }
            Err(source) => Err(LocatorError::CacheRootUnreadable {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sanitize_keeps_components_after_sysvol() {
        let path = sanitize_sysvol_path(
            "\\\\corp.example.com\\SysVol\\corp.example.com\\Policies\\{31B2F340-016D-11D2-945F-00C04FB984F9}",
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("CORP.EXAMPLE.COM/POLICIES/{31B2F340-016D-11D2-945F-00C04FB984F9}")
        );
    }

    #[test]
    fn sanitize_without_sysvol_keeps_everything() {
        let path = sanitize_sysvol_path("domain/policies/gpo1").unwrap();
        assert_eq!(path, PathBuf::from("DOMAIN/POLICIES/GPO1"));
    }

    #[test]
    fn sanitize_rejects_traversal() {
        let err = sanitize_sysvol_path("\\\\dc\\sysvol\\..\\..\\etc\\shadow").unwrap_err();
        assert!(matches!(err, LocatorError::UnsafePath { reason: "parent directory component", .. }));
        assert!(sanitize_sysvol_path("a/b/../../../root").is_err());
    }

    #[test]
    fn sanitize_rejects_degenerate_input() {
        assert!(sanitize_sysvol_path("").is_err());
        assert!(sanitize_sysvol_path("\\\\dc\\sysvol\\").is_err());
        assert!(sanitize_sysvol_path("C:\\Windows\\SYSVOL2").is_err());
        assert!(sanitize_sysvol_path("gpo\0x").is_err());
    }

    #[test]
    fn sanitized_path_stays_relative() {
        let path = sanitize_sysvol_path("/etc/passwd").unwrap();
        assert!(path.is_relative());
        assert_eq!(path, PathBuf::from("ETC/PASSWD"));
    }

    #[test]
    fn locate_classifies_replicated_tree() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("DOM/POLICIES/{GPO1}");
        fs::create_dir_all(tree.join("MACHINE")).unwrap();
        fs::create_dir_all(tree.join("USER")).unwrap();
        fs::write(tree.join("MACHINE/REGISTRY.POL"), b"").unwrap();
        fs::write(tree.join("USER/REGISTRY.POL"), b"").unwrap();
        fs::write(tree.join("GPT.INI"), b"[General]").unwrap();

        let locator = PolicyTreeLocator::new(dir.path());
        let gpo = PolicyObject::new("{GPO1}", Some("\\\\dom\\sysvol\\dom\\Policies\\{gpo1}".to_string()));
        let set = locator.locate(&gpo).unwrap();

        assert_eq!(set.machine_files, vec![tree.join("MACHINE/REGISTRY.POL")]);
        assert_eq!(set.user_files, vec![tree.join("USER/REGISTRY.POL")]);
    }

    #[test]
    fn locate_without_path_is_empty() {
        let dir = tempdir().unwrap();
        let locator = PolicyTreeLocator::new(dir.path());
        let set = locator.locate(&PolicyObject::new("Local Policy", None)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn locate_unreplicated_tree_is_empty() {
        let dir = tempdir().unwrap();
        let locator = PolicyTreeLocator::new(dir.path());
        let gpo = PolicyObject::new("{GPO2}", Some("dom/Policies/{GPO2}".to_string()));
        assert!(locator.locate(&gpo).unwrap().is_empty());
    }

    #[test]
    fn locate_missing_root_is_structural() {
        let dir = tempdir().unwrap();
        let locator = PolicyTreeLocator::new(dir.path().join("absent"));
        let gpo = PolicyObject::new("{GPO3}", Some("dom/Policies/{GPO3}".to_string()));
        let err = locator.locate(&gpo).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn locate_rejects_unsafe_object_path() {
        let dir = tempdir().unwrap();
        let locator = PolicyTreeLocator::new(dir.path());
        let gpo = PolicyObject::new("evil", Some("\\\\dc\\sysvol\\..\\secrets".to_string()));
        let err = locator.locate(&gpo).unwrap_err();
        assert!(!err.is_structural());
    }

    #[test]
    fn locate_root_that_is_a_file_is_missing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("gpo_cache");
        fs::write(&root, b"").unwrap();
        let locator = PolicyTreeLocator::new(&root);
        let gpo = PolicyObject::new("{GPO4}", Some("dom/Policies/{GPO4}".to_string()));
        assert!(matches!(
            locator.locate(&gpo).unwrap_err(),
            LocatorError::CacheRootMissing { .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn locate_ignores_symlinks_out_of_tree() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside.pol");
        fs::write(&outside, b"PReg").unwrap();
        let outside_dir = dir.path().join("elsewhere");
        fs::create_dir_all(outside_dir.join("MACHINE")).unwrap();
        fs::write(outside_dir.join("MACHINE/REGISTRY.POL"), b"PReg").unwrap();

        let root = dir.path().join("gpo_cache");
        let tree = root.join("DOM/POLICIES/{A}");
        fs::create_dir_all(tree.join("MACHINE")).unwrap();
        symlink(&outside, tree.join("MACHINE/REGISTRY.POL")).unwrap();
        symlink(outside_dir.join("MACHINE"), tree.join("USER")).unwrap();

        let linked_tree = root.join("DOM/POLICIES/{B}");
        symlink(&outside_dir, &linked_tree).unwrap();

        let locator = PolicyTreeLocator::new(&root);
        let set = locator
            .locate(&PolicyObject::new("{A}", Some("dom/Policies/{A}".to_string())))
            .unwrap();
        assert!(set.is_empty());

        let set = locator
            .locate(&PolicyObject::new("{B}", Some("dom/Policies/{B}".to_string())))
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn walker_is_sorted_and_recursive() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/c")).unwrap();
        fs::write(dir.path().join("b/c/z.pol"), b"").unwrap();
        fs::write(dir.path().join("a.pol"), b"").unwrap();
        fs::write(dir.path().join("b/y.pol"), b"").unwrap();

        let files = FsWalker.list_files_recursive(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("a.pol"),
                dir.path().join("b/c/z.pol"),
                dir.path().join("b/y.pol"),
            ]
        );
    }
}
