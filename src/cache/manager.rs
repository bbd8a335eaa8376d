//! Cache lifecycle
//!
//! `Loaded -> Validated -> Purged | Kept -> Persisted`. Nothing is written to
//! the cache store or metadata before `persist`, so a failed build leaves the
//! previous state intact. If `persist` itself fails part way, the cached
//! bundle is dropped so it can never outlive the fingerprint describing it.

use crate::cache::fingerprint::CacheFingerprint;
use crate::error::{RbpackError, RbpackResult};
use crate::layout::{BuildLayout, BUNDLE_CONFIG_PATH, BUNDLE_PATH};
use crate::store::{keys, remove_path, CacheStore, MetadataStore};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Paths carried between builds, relative to the build dir
pub const CACHED_PATHS: [&str; 2] = [BUNDLE_PATH, BUNDLE_CONFIG_PATH];

/// Lifecycle state of the cache during a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Restored from the store, prior fingerprint read
    Loaded,
    /// Compared against the current fingerprint
    Validated,
    /// Installed gems discarded
    Purged,
    /// Installed gems reused
    Kept,
    /// New state written back
    Persisted,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Validated => write!(f, "validated"),
            Self::Purged => write!(f, "purged"),
            Self::Kept => write!(f, "kept"),
            Self::Persisted => write!(f, "persisted"),
        }
    }
}

/// Why installed gems were discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeReason {
    /// The set of installed runtimes differs from the previous build
    RuntimesChanged {
        previous: Vec<String>,
        current: Vec<String>,
    },
    /// Gems cached by a build that did not record its Bundler version
    UntrackedBundle,
}

impl fmt::Display for PurgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimesChanged { previous, current } => write!(
                f,
                "Ruby version change detected ({} -> {})",
                previous.join(", "),
                current.join(", ")
            ),
            Self::UntrackedBundle => write!(f, "cached gems predate Bundler version tracking"),
        }
    }
}

/// Outcome of validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    Kept,
    Purged(PurgeReason),
}

impl CacheDecision {
    pub fn is_purged(&self) -> bool {
        matches!(self, Self::Purged(_))
    }
}

impl fmt::Display for CacheDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kept => write!(f, "kept"),
            Self::Purged(reason) => write!(f, "purged: {}", reason),
        }
    }
}

/// Drives the cache through one build
pub struct CacheManager<'a> {
    store: &'a dyn CacheStore,
    layout: &'a BuildLayout,
    enabled: bool,
    state: CacheState,
    previous: Option<CacheFingerprint>,
    bundler_tracked: bool,
    /// The store held a bundle when the build started
    cached_bundle: bool,
    current: Option<CacheFingerprint>,
}

impl<'a> CacheManager<'a> {
    /// Restore cached paths into the build dir and read the prior fingerprint
    pub async fn load(
        store: &'a dyn CacheStore,
        metadata: &dyn MetadataStore,
        layout: &'a BuildLayout,
        enabled: bool,
    ) -> RbpackResult<Self> {
        let cached_bundle = enabled && store.exists(BUNDLE_PATH).await?;
        if enabled {
            for path in CACHED_PATHS {
                store.load(path).await?;
            }
        } else {
            debug!("Cache disabled, starting from an empty bundle");
        }

        let previous = match metadata.read(keys::FINGERPRINT).await? {
            None => None,
            Some(bytes) => match CacheFingerprint::from_bytes(&bytes) {
                Ok(fingerprint) => Some(fingerprint),
                Err(e) => {
                    warn!("Ignoring unreadable cache fingerprint: {}", e);
                    None
                }
            },
        };
        let bundler_tracked = metadata.exists(keys::BUNDLER_VERSION).await?;

        Ok(Self {
            store,
            layout,
            enabled,
            state: CacheState::Loaded,
            previous,
            bundler_tracked,
            cached_bundle,
            current: None,
        })
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Fingerprint persisted by the previous successful build
    pub fn previous(&self) -> Option<&CacheFingerprint> {
        self.previous.as_ref()
    }

    fn expect_state(&self, expected: CacheState) -> RbpackResult<()> {
        if self.state != expected {
            return Err(RbpackError::Internal(format!(
                "cache is {}, expected {}",
                self.state, expected
            )));
        }
        Ok(())
    }

    /// Compare the current fingerprint with the previous build's
    pub fn validate(&mut self, current: CacheFingerprint) -> RbpackResult<CacheDecision> {
        self.expect_state(CacheState::Loaded)?;

        // Only a bundle that came out of the store can be untracked; one the
        // application ships itself is left alone.
        let decision = if self.cached_bundle && !self.bundler_tracked {
            CacheDecision::Purged(PurgeReason::UntrackedBundle)
        } else {
            match &self.previous {
                Some(previous) if !previous.same_runtimes(&current) => {
                    CacheDecision::Purged(PurgeReason::RuntimesChanged {
                        previous: previous.runtime_keys().into_iter().map(String::from).collect(),
                        current: current.runtime_keys().into_iter().map(String::from).collect(),
                    })
                }
                _ => CacheDecision::Kept,
            }
        };

        debug!("Cache decision: {}", decision);
        self.current = Some(current);
        self.state = CacheState::Validated;
        Ok(decision)
    }

    /// Act on a decision: discard installed gems or keep them
    pub async fn apply(&mut self, decision: &CacheDecision) -> RbpackResult<()> {
        self.expect_state(CacheState::Validated)?;

        match decision {
            CacheDecision::Kept => self.state = CacheState::Kept,
            CacheDecision::Purged(reason) => {
                info!("{}, clearing cached gems", reason);
                let bundle = self.layout.bundle_dir();
                remove_path(&bundle)
                    .map_err(|e| RbpackError::io(format!("removing {}", bundle.display()), e))?;
                self.store.clear(BUNDLE_PATH).await?;
                self.state = CacheState::Purged;
            }
        }
        Ok(())
    }

    /// Store cached paths and the new fingerprint. Only call after every
    /// other stage succeeded.
    pub async fn persist(&mut self, metadata: &mut dyn MetadataStore) -> RbpackResult<()> {
        if !matches!(self.state, CacheState::Kept | CacheState::Purged) {
            return Err(RbpackError::Internal(format!(
                "cache is {}, expected kept or purged",
                self.state
            )));
        }
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| RbpackError::Internal("cache persisted without a fingerprint".into()))?;

        if let Err(e) = self.commit(current, metadata).await {
            if self.enabled {
                warn!("Could not persist the cache, dropping cached gems: {}", e);
                if let Err(clear) = self.store.clear(BUNDLE_PATH).await {
                    warn!("Could not clear cached gems: {}", clear);
                }
            }
            return Err(e);
        }

        self.state = CacheState::Persisted;
        Ok(())
    }

    async fn commit(
        &self,
        current: &CacheFingerprint,
        metadata: &mut dyn MetadataStore,
    ) -> RbpackResult<()> {
        if self.enabled {
            for path in CACHED_PATHS {
                self.store.store(path).await?;
            }
        }

        metadata
            .write(keys::FINGERPRINT, current.to_bytes()?, true)
            .await?;
        metadata
            .write(
                keys::PIPELINE_VERSION,
                current.pipeline_version.as_bytes().to_vec(),
                true,
            )
            .await?;
        metadata
            .write(
                keys::BUNDLER_VERSION,
                current.bundler_version.as_bytes().to_vec(),
                true,
            )
            .await?;
        metadata.save().await
    }
}
