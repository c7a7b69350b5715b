//! Policy objects, file sets and parsed entries.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::value::PolicyValue;

/// Which part of a policy an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// System-wide settings.
    Machine,
    /// Settings for one account.
    User,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine => write!(f, "machine"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A directory-managed policy object as returned by the directory service.
///
/// The directory decides applicability and order; the resolver never
/// reorders the list it gets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyObject {
    /// Object name, usually the `{GUID}` of the GPO.
    pub name: String,

    /// Human readable name, when the directory provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Server-side path of the replicated file tree
    /// (e.g. `\\corp.example.com\SysVol\corp.example.com\Policies\{GUID}`).
    /// Untrusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_sys_path: Option<String>,
}

impl PolicyObject {
    /// Object with no display name.
    #[must_use]
    pub fn new(name: impl Into<String>, file_sys_path: Option<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            file_sys_path,
        }
    }

    /// Sets the human readable name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

/// Ordered machine and user policy files.
///
/// Order is precedence: a later file overrides an earlier one on key
/// conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFileSet {
    /// Machine-scope files, lowest precedence first.
    pub machine_files: Vec<PathBuf>,
    /// User-scope files, lowest precedence first.
    pub user_files: Vec<PathBuf>,
}

impl PolicyFileSet {
    /// Empty file set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends both scopes of `other` after the files already present.
    pub fn append(&mut self, other: Self) {
        self.machine_files.extend(other.machine_files);
        self.user_files.extend(other.user_files);
    }

    /// Inserts `path` as the lowest-precedence machine file.
    pub fn prepend_machine(&mut self, path: impl Into<PathBuf>) {
        self.machine_files.insert(0, path.into());
    }

    /// Files for one scope.
    #[must_use]
    pub fn files(&self, scope: Scope) -> &[PathBuf] {
        match scope {
            Scope::Machine => &self.machine_files,
            Scope::User => &self.user_files,
        }
    }

    /// Total number of files in both scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.machine_files.len() + self.user_files.len()
    }

    /// True when neither scope has files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machine_files.is_empty() && self.user_files.is_empty()
    }
}

/// Parser-attached details about where an entry came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// File the entry was parsed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Raw registry type code as found on disk.
    pub type_code: u32,

    /// Raw data size in bytes as found on disk.
    pub size: u32,
}

/// One parsed setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Registry key, e.g. `Software\Policies\Samba\Unix Settings`.
    pub key: String,

    /// Value name under the key. May be empty (the key's default value).
    pub value_name: String,

    /// Decoded value.
    pub value: PolicyValue,

    /// Where the entry came from.
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl PolicyEntry {
    /// Entry with metadata derived from `value`.
    #[must_use]
    pub fn new(key: impl Into<String>, value_name: impl Into<String>, value: PolicyValue) -> Self {
        let type_code = value.reg_type().code();
        Self {
            key: key.into(),
            value_name: value_name.into(),
            value,
            metadata: EntryMetadata {
                source: None,
                type_code,
                size: 0,
            },
        }
    }

    /// Records the file the entry was read from.
    #[must_use]
    pub fn with_source(mut self, source: &Path) -> Self {
        self.metadata.source = Some(source.to_path_buf());
        self
    }

    /// Merge identity: `key\value_name`, case-folded like registry lookups.
    #[must_use]
    pub fn key_path(&self) -> String {
        let key = self.key.trim_matches('\\');
        format!("{key}\\{}", self.value_name).to_ascii_lowercase()
    }
}
