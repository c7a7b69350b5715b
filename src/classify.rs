//! Scope classification of policy file paths.
//!
//! Paths are sorted into machine and user buckets by name only. This
//! decides scope, nothing else: whether a path is safe to read is settled
//! by the locator before any file is enumerated.
//!
//! A pattern matches when some path component starts with `machine` (or
//! `user`) and the path ends in `.pol`, ignoring case. That covers bare
//! names like `Machine.pol` as well as the usual policy tree layout
//! `Machine/Registry.pol`. The locator hands in paths relative to the
//! policy tree root so directories above the tree never take part.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::policy::PolicyFileSet;

const MACHINE_POL_PATTERN: &str = r"(?:^|/)machine.*\.pol$";
const USER_POL_PATTERN: &str = r"(?:^|/)user.*\.pol$";

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn default_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            compile(MACHINE_POL_PATTERN).expect("machine pattern is a valid literal"),
            compile(USER_POL_PATTERN).expect("user pattern is a valid literal"),
        )
    })
}

/// Splits paths into machine-scope and user-scope policy files.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    machine: Regex,
    user: Regex,
}

impl Default for PathClassifier {
    fn default() -> Self {
        let (machine, user) = default_patterns();
        Self {
            machine: machine.clone(),
            user: user.clone(),
        }
    }
}

impl PathClassifier {
    /// Classifier with the standard machine and user patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a classifier from custom patterns (case-insensitive, matched
    /// against the `/`-separated path text).
    ///
    /// # Errors
    /// Returns the regex error if either pattern does not compile.
    pub fn with_patterns(machine: &str, user: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            machine: compile(machine)?,
            user: compile(user)?,
        })
    }

    /// True if `path` is a machine-scope policy file.
    #[must_use]
    pub fn is_machine_file(&self, path: &Path) -> bool {
        self.machine.is_match(&path_text(path))
    }

    /// True if `path` is a user-scope policy file.
    #[must_use]
    pub fn is_user_file(&self, path: &Path) -> bool {
        self.user.is_match(&path_text(path))
    }

    /// Partitions `paths`, preserving input order within each bucket.
    /// Paths matching neither pattern are dropped.
    #[must_use]
    pub fn classify(&self, paths: &[PathBuf]) -> PolicyFileSet {
        let mut set = PolicyFileSet::new();
        for path in paths {
            if self.is_machine_file(path) {
                set.machine_files.push(path.clone());
            }
            if self.is_user_file(path) {
                set.user_files.push(path.clone());
            }
        }
        set
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn partitions_bare_file_names() {
        let input = paths(&[
            "MACHINE.POL",
            "user.pol",
            "GPT.INI",
            "machine_extra.Pol",
            "userdata.txt",
            "Registry.pol",
        ]);
        let set = PathClassifier::new().classify(&input);

        assert_eq!(set.machine_files, paths(&["MACHINE.POL", "machine_extra.Pol"]));
        assert_eq!(set.user_files, paths(&["user.pol"]));
    }

    #[test]
    fn partitions_policy_tree_layout() {
        let input = paths(&[
            "MACHINE/REGISTRY.POL",
            "User/Registry.pol",
            "MACHINE/Microsoft/Windows NT/SecEdit/GptTmpl.inf",
            "GPT.INI",
        ]);
        let set = PathClassifier::new().classify(&input);

        assert_eq!(set.machine_files, paths(&["MACHINE/REGISTRY.POL"]));
        assert_eq!(set.user_files, paths(&["User/Registry.pol"]));
    }

    #[test]
    fn substring_inside_a_component_does_not_count() {
        let input = paths(&["POLICIES/NOTMACHINE/REGISTRY.POL", "POWERUSER/REGISTRY.POL"]);
        let set = PathClassifier::new().classify(&input);
        assert!(set.is_empty());
    }

    #[test]
    fn reclassifying_a_bucket_is_stable() {
        let input = paths(&["a/machine.pol", "b/USER.POL", "Machine/x.pol", "d/x.pol", "User/y.pol"]);
        let classifier = PathClassifier::new();
        let set = classifier.classify(&input);
        assert_eq!(set.machine_files.len(), 2);
        assert_eq!(set.user_files.len(), 2);

        let again = classifier.classify(&set.machine_files);
        assert_eq!(again.machine_files, set.machine_files);
        assert!(again.user_files.is_empty());

        let again = classifier.classify(&set.user_files);
        assert_eq!(again.user_files, set.user_files);
        assert!(again.machine_files.is_empty());
    }

    #[test]
    fn both_checks_run_independently() {
        // A user directory nested under a machine directory matches both.
        let set = PathClassifier::new().classify(&paths(&["Machine/User/Registry.pol"]));
        assert_eq!(set.machine_files.len(), 1);
        assert_eq!(set.user_files.len(), 1);
    }

    #[test]
    fn invalid_custom_pattern_is_rejected() {
        assert!(PathClassifier::with_patterns("(", "^user").is_err());
    }
}
