//! Error types for gpoa.
//!
//! All errors are strongly typed using thiserror, one enum per concern.
//! Most of them never leave the resolver: it demotes them to log records
//! and carries on with whatever data it still has. Only a broken local
//! installation (missing replication root) reaches the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the directory service (network, auth, protocol).
///
/// Always transient from the resolver's point of view: they trigger the
/// cache fallback and never abort a run.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DirectoryError {
    #[error("Directory service unreachable: {message}")]
    Unreachable {
        message: String,
    },

    #[error("Directory authentication failed: {message}")]
    Auth {
        message: String,
    },

    #[error("Directory protocol error: {message}")]
    Protocol {
        message: String,
    },
}

impl DirectoryError {
    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }
}

/// A policy object's file tree could not be refreshed locally.
#[derive(Debug, Error)]
#[error("Unable to replicate '{object}': {message}")]
pub struct ReplicationError {
    /// Name of the object that failed.
    pub object: String,
    /// What went wrong.
    pub message: String,
}

/// Errors raised while locating the policy files of one object.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LocatorError {
    #[error("Unsafe policy path '{path}': {reason}")]
    UnsafePath {
        path: String,
        reason: &'static str,
    },

    #[error("Replication cache root missing: {}", path.display())]
    CacheRootMissing {
        path: PathBuf,
    },

    #[error("Replication cache root unreadable: {}: {source}", path.display())]
    CacheRootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to traverse {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LocatorError {
    /// Returns true for failures of the replication root itself. Anything
    /// confined to one object's tree is not structural.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::CacheRootMissing { .. } | Self::CacheRootUnreadable { .. })
    }
}

/// Errors raised by a policy-file parser.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ParseError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Bad signature: expected PReg header")]
    BadSignature,

    #[error("Unsupported PReg version {version}")]
    UnsupportedVersion {
        version: u32,
    },

    #[error("Unexpected end of data at offset {offset}")]
    Truncated {
        offset: usize,
    },

    #[error("Malformed record at offset {offset}: {reason}")]
    Malformed {
        offset: usize,
        reason: String,
    },

    #[error("Unsupported policy file format: {}", path.display())]
    UnsupportedFormat {
        path: PathBuf,
    },
}

/// Errors raised by the resolution cache.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum CacheError {
    #[error("Cache I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache file corrupt: {reason}")]
    Corrupt {
        reason: String,
    },

    #[error("Failed to encode cache: {reason}")]
    Encode {
        reason: String,
    },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: field '{field}' {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Top-level error type for gpoa.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum GpoaError {
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GpoaError {
    /// Returns true if this error is expected to clear on a later run.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    /// Returns true if this error must be reported to the caller instead
    /// of being absorbed by the resolver.
    #[must_use]
    pub const fn is_caller_visible(&self) -> bool {
        match self {
            Self::Locator(e) => e.is_structural(),
            Self::Cache(CacheError::Io { .. } | CacheError::Encode { .. }) => true,
            Self::Config(_) => true,
            Self::Directory(_) | Self::Parse(_) | Self::Cache(CacheError::Corrupt { .. }) => false,
        }
    }
}

/// Result type alias for gpoa operations.
pub type GpoaResult<T> = Result<T, GpoaError>;
