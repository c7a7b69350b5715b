//! Policy resolution: identity in, merged machine and user views out.
//!
//! Per identity the resolver asks the directory for the applicable policy
//! objects, refreshes their replicated trees, collects their policy files
//! in directory order and merges them. When the directory cannot be
//! reached it falls back to the files recorded by the last successful run.
//!
//! ```text
//!   Start ──list ok──▶ Replicate ──▶ Locate & Accumulate ──▶ Persist ──▶ Resolved
//!     │                 (failure logged)  (unsafe objects dropped)
//!     └──list failed──▶ Fallback ──────────────────────────────────────▶ ResolvedFromCache
//! ```
//!
//! Only a missing or unreadable replication root escapes as an error.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheMap, CacheRecord, ResolutionCache};
use crate::config::GpoaConfig;
use crate::directory::DirectoryService;
use crate::error::{CacheError, GpoaResult, LocatorError};
use crate::identity::Identity;
use crate::locate::{DirectoryWalker, FsWalker, PolicyTreeLocator};
use crate::merge::{MergeEngine, PolicyParser};
use crate::policy::{PolicyEntry, PolicyFileSet};
use crate::preg::PregParser;
use crate::view::PolicyView;

/// How a resolution obtained its policy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Fresh from the directory.
    Resolved,
    /// The directory failed. `cached` tells whether a record existed;
    /// without one both views are empty.
    ResolvedFromCache {
        /// A cache record existed for the identity.
        cached: bool,
    },
}

impl ResolutionOutcome {
    /// True when the files came from the cache path.
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::ResolvedFromCache { .. })
    }
}

/// Result of resolving one identity.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// Identity the files were resolved for.
    pub identity: Identity,
    /// Fresh or fallback.
    pub outcome: ResolutionOutcome,
    /// Files that were merged, baseline included.
    pub files: PolicyFileSet,
    /// Merged machine scope.
    pub machine: PolicyView,
    /// Only computed for human identities.
    pub user: Option<PolicyView>,
}

/// Views an applier run consumes: machine settings from the computer
/// account, user settings from the logged-in user.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Resolution of the computer account.
    pub machine: Resolution,
    /// Resolution of the logged-in user, if any.
    pub user: Option<Resolution>,
}

impl Session {
    /// Machine-scope entries of the computer account.
    #[must_use]
    pub fn machine_values(&self) -> Vec<PolicyEntry> {
        self.machine.machine.values()
    }

    /// User-scope entries of the user, empty for a machine-only session.
    #[must_use]
    pub fn user_values(&self) -> Vec<PolicyEntry> {
        self.user
            .as_ref()
            .and_then(|r| r.user.as_ref())
            .map(PolicyView::values)
            .unwrap_or_default()
    }
}

/// Resolves identities against a directory, with cache fallback.
pub struct PolicyResolver<P: PolicyParser = PregParser, W: DirectoryWalker = FsWalker> {
    config: GpoaConfig,
    directory: Arc<dyn DirectoryService>,
    locator: PolicyTreeLocator<W>,
    merger: MergeEngine<P>,
    cache: ResolutionCache,
    records: CacheMap,
    last: Option<Resolution>,
}

impl PolicyResolver<PregParser, FsWalker> {
    /// Resolver reading Registry.pol files from the local file system.
    /// Loads the resolution cache.
    #[must_use]
    pub fn new(config: GpoaConfig, directory: Arc<dyn DirectoryService>) -> Self {
        Self::with_parts(config, directory, PregParser, FsWalker)
    }
}

impl<P: PolicyParser, W: DirectoryWalker> PolicyResolver<P, W> {
    /// Resolver with custom parser and walker. Loads the resolution cache.
    #[must_use]
    pub fn with_parts(config: GpoaConfig, directory: Arc<dyn DirectoryService>, parser: P, walker: W) -> Self {
        let cache = ResolutionCache::new(config.cache_path());
        let records = cache.load();
        Self {
            locator: PolicyTreeLocator::with_walker(config.replication_root(), walker),
            merger: MergeEngine::new(parser),
            config,
            directory,
            cache,
            records,
            last: None,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GpoaConfig {
        &self.config
    }

    /// Cache records as they would be persisted now.
    #[must_use]
    pub fn records(&self) -> &CacheMap {
        &self.records
    }

    /// Local policy file a machine resolution would put first.
    #[must_use]
    pub fn local_policy_path(&self) -> Option<PathBuf> {
        self.config
            .include_local_policy
            .then(|| self.config.local_policy_path.clone())
    }

    /// Resolves `identity` and merges its views.
    ///
    /// The user view is computed only when `is_machine_identity` is false.
    /// The local baseline is merged under the machine view of machine
    /// identities when enabled in the configuration.
    ///
    /// # Errors
    /// Returns a structural `LocatorError` when the replication root is
    /// missing or cannot be traversed. Nothing else fails a resolution.
    pub fn resolve(&mut self, identity: &Identity, is_machine_identity: bool) -> Result<Resolution, LocatorError> {
        info!(identity = %identity, machine = is_machine_identity, "resolving policy");

        let (mut files, outcome) = self.policy_files(identity)?;

        if is_machine_identity && self.config.include_local_policy {
            files.prepend_machine(self.config.local_policy_path.clone());
        }
        info!(files = ?files.machine_files, "machine policy file set");
        info!(files = ?files.user_files, "user policy file set");

        let machine = self.merger.merge(&files.machine_files);
        let user = (!is_machine_identity).then(|| self.merger.merge(&files.user_files));

        info!(
            identity = %identity,
            outcome = ?outcome,
            machine_entries = machine.len(),
            user_entries = user.as_ref().map_or(0, PolicyView::len),
            machine_digest = %machine.digest(),
            "policy resolved"
        );

        let resolution = Resolution {
            identity: identity.clone(),
            outcome,
            files,
            machine,
            user,
        };
        self.last = Some(resolution.clone());
        Ok(resolution)
    }

    /// Machine-scope entries of the last resolution.
    #[must_use]
    pub fn machine_values(&self) -> Vec<PolicyEntry> {
        self.last.as_ref().map(|r| r.machine.values()).unwrap_or_default()
    }

    /// User-scope entries of the last resolution (empty for machine identities).
    #[must_use]
    pub fn user_values(&self) -> Vec<PolicyEntry> {
        self.last
            .as_ref()
            .and_then(|r| r.user.as_ref())
            .map(PolicyView::values)
            .unwrap_or_default()
    }

    /// Writes all cache records in one go.
    ///
    /// # Errors
    /// Returns `CacheError` if the cache file cannot be written.
    pub fn persist(&self) -> Result<(), CacheError> {
        self.cache.save(&self.records)
    }

    /// Full run: the computer account (with baseline), then the user if
    /// any, then one cache write.
    ///
    /// # Errors
    /// Returns structural locator failures and cache write failures.
    pub fn run_session(&mut self, machine: &Identity, user: Option<&Identity>) -> GpoaResult<Session> {
        let machine = self.resolve(machine, true)?;
        let user = match user {
            Some(identity) => Some(self.resolve(identity, false)?),
            None => None,
        };
        self.persist()?;
        Ok(Session { machine, user })
    }

    fn policy_files(&mut self, identity: &Identity) -> Result<(PolicyFileSet, ResolutionOutcome), LocatorError> {
        let objects = match self.directory.list_applicable_objects(identity) {
            Ok(objects) => objects,
            Err(e) => {
                error!(identity = %identity, error = %e, "unable to fetch policy objects");
                return Ok(self.fallback(identity));
            }
        };
        debug!(
            identity = %identity,
            objects = ?objects.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            "applicable policy objects"
        );

        if let Err(e) = self.directory.refresh_replication(&objects) {
            warn!(identity = %identity, error = %e, "replication failed, using local copies");
        }

        let mut files = PolicyFileSet::new();
        for object in &objects {
            match self.locator.locate(object) {
                Ok(found) => files.append(found),
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => warn!(object = %object.name, error = %e, "ignoring policy object"),
            }
        }

        self.records
            .insert(identity.sid.clone(), CacheRecord::new(files.clone()));
        Ok((files, ResolutionOutcome::Resolved))
    }

    fn fallback(&self, identity: &Identity) -> (PolicyFileSet, ResolutionOutcome) {
        match self.records.get(&identity.sid) {
            Some(record) => {
                info!(
                    identity = %identity,
                    resolved_at = %record.resolved_at,
                    "using cached policy files"
                );
                (record.files.clone(), ResolutionOutcome::ResolvedFromCache { cached: true })
            }
            None => {
                warn!(identity = %identity, "no cached policy files, resolving to empty policy");
                (PolicyFileSet::new(), ResolutionOutcome::ResolvedFromCache { cached: false })
            }
        }
    }
}
