//! Resolver configuration.
//!
//! Loaded from a TOML file (typically `/etc/gpoa/gpoa.toml`). Every field
//! has a default, so a missing file yields a working configuration.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::identity::machine_account_name;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gpoa/gpoa.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpoaConfig {
    /// Directory holding the resolution cache and the replicated trees.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Cache file name, relative to `cache_dir`.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Replication root, relative to `cache_dir`.
    #[serde(default = "default_replication_subdir")]
    pub replication_subdir: PathBuf,

    /// Baseline policy merged under every machine resolution.
    #[serde(default = "default_local_policy_path")]
    pub local_policy_path: PathBuf,

    /// Whether machine resolutions include the baseline.
    #[serde(default = "default_include_local_policy")]
    pub include_local_policy: bool,

    /// Computer account name. Derived from the host name when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/gpoa")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("cache.gpoa")
}

fn default_replication_subdir() -> PathBuf {
    PathBuf::from("gpo_cache")
}

fn default_local_policy_path() -> PathBuf {
    PathBuf::from("/usr/share/local-policy/default/local.pol")
}

const fn default_include_local_policy() -> bool {
    true
}

impl Default for GpoaConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_file: default_cache_file(),
            replication_subdir: default_replication_subdir(),
            local_policy_path: default_local_policy_path(),
            include_local_policy: default_include_local_policy(),
            machine_name: None,
        }
    }
}

impl GpoaConfig {
    /// Loads configuration from `path`; a missing file yields defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or invalid values.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()
    }

    /// Checks field constraints.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.cache_dir.is_absolute() {
            return Err(ConfigError::Invalid {
                field: "cache_dir",
                reason: format!("must be absolute (got {})", self.cache_dir.display()),
            });
        }
        check_contained("cache_file", &self.cache_file)?;
        check_contained("replication_subdir", &self.replication_subdir)?;
        if self.machine_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "machine_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(self)
    }

    /// Full path of the resolution cache file.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.cache_file)
    }

    /// Directory the replicated policy trees live under.
    #[must_use]
    pub fn replication_root(&self) -> PathBuf {
        self.cache_dir.join(&self.replication_subdir)
    }

    /// Computer account name, falling back to `hostname`.
    #[must_use]
    pub fn machine_account(&self, hostname: &str) -> String {
        self.machine_name
            .as_deref()
            .map_or_else(|| machine_account_name(hostname), machine_account_name)
    }
}

fn check_contained(field: &'static str, path: &Path) -> Result<(), ConfigError> {
    let contained = !path.as_os_str().is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if contained {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a relative path without '..' (got {})", path.display()),
        })
    }
}
