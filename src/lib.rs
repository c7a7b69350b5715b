//! # gpoa - Group Policy resolution for Linux domain members
//!
//! gpoa works out which centrally managed settings apply to a computer or
//! user account of a directory domain, and merges them into one ordered
//! key/value view per scope for appliers to act on.
//!
//! ## Core Concepts
//!
//! - **Policy object**: a directory-managed bundle with a replicated file tree
//! - **Policy file set**: machine and user `Registry.pol` files, in precedence order
//! - **Policy view**: merged entries of one scope; later files win, positions stay put
//! - **Resolution cache**: last good file set per SID, used while the directory is down
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gpoa::{GpoaConfig, Identity, ManifestDirectory, PolicyResolver, Sid};
//!
//! let config = GpoaConfig::load("/etc/gpoa/gpoa.toml".as_ref())?;
//! let directory = Arc::new(ManifestDirectory::new("/var/cache/gpoa/gpos.json"));
//! let mut resolver = PolicyResolver::new(config, directory);
//!
//! let machine = Identity::new("WS01$", Sid::parse("S-1-5-21-1-2-3-1105")?);
//! let session = resolver.run_session(&machine, None)?;
//! for entry in session.machine_values() {
//!     println!("{}\\{} = {}", entry.key, entry.value_name, entry.value);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod classify;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod locate;
pub mod merge;
pub mod policy;
pub mod preg;
pub mod resolver;
pub mod value;
pub mod view;

// Re-export primary types at crate root for convenience
pub use cache::{CacheMap, CacheRecord, ResolutionCache};
pub use classify::PathClassifier;
pub use config::GpoaConfig;
pub use directory::{DirectoryService, InMemoryDirectory, ManifestDirectory};
pub use error::{
    CacheError, ConfigError, DirectoryError, GpoaError, GpoaResult, LocatorError, ParseError,
    ReplicationError,
};
pub use identity::{machine_account_name, Identity, Sid};
pub use locate::{sanitize_sysvol_path, DirectoryWalker, FsWalker, PolicyTreeLocator};
pub use merge::{MergeEngine, PolicyParser};
pub use policy::{EntryMetadata, PolicyEntry, PolicyFileSet, PolicyObject, Scope};
pub use preg::PregParser;
pub use resolver::{PolicyResolver, Resolution, ResolutionOutcome, Session};
pub use value::{PolicyValue, RegType};
pub use view::PolicyView;
