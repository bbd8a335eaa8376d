//! Cache fingerprints
//!
//! A fingerprint records what the installed gems were built against: the
//! observed `ruby -v` of every active runtime mapped to the RubyGems
//! version it ships, plus the pipeline and Bundler version tags.

use crate::env::BuildEnvironment;
use crate::error::{RbpackError, RbpackResult};
use crate::exec::{CommandRunner, CommandSpec};
use crate::version::RuntimeVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

/// A runtime installed by this build, with the interpreter to probe
#[derive(Debug, Clone)]
pub struct InstalledRuntime {
    pub version: RuntimeVersion,
    pub executable: PathBuf,
}

/// Comparable signature of the environment gems were installed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFingerprint {
    /// Observed runtime description -> RubyGems version
    pub runtimes: BTreeMap<String, String>,
    /// Version of rbpack that produced the cache
    pub pipeline_version: String,
    /// Pinned Bundler version
    pub bundler_version: String,
    /// When the fingerprint was observed
    pub recorded_at: DateTime<Utc>,
}

impl CacheFingerprint {
    /// Fingerprint with no runtimes yet
    pub fn new(pipeline_version: impl Into<String>, bundler_version: impl Into<String>) -> Self {
        Self {
            runtimes: BTreeMap::new(),
            pipeline_version: pipeline_version.into(),
            bundler_version: bundler_version.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Add an observed runtime
    pub fn with_runtime(mut self, description: impl Into<String>, gem_version: impl Into<String>) -> Self {
        self.runtimes.insert(description.into(), gem_version.into());
        self
    }

    /// Probe every installed runtime
    pub async fn observe(
        runtimes: &[InstalledRuntime],
        runner: &dyn CommandRunner,
        env: &BuildEnvironment,
        pipeline_version: &str,
        bundler_version: &str,
    ) -> RbpackResult<Self> {
        let mut fingerprint = Self::new(pipeline_version, bundler_version);

        for runtime in runtimes {
            let program = runtime.executable.display().to_string();
            let description = probe(
                runner,
                CommandSpec::new(&program).arg("-v").env(env.vars().clone()),
            )
            .await?;
            let gem_version = probe(
                runner,
                CommandSpec::new(&program)
                    .args(["-S", "gem", "--version"])
                    .env(env.vars().clone()),
            )
            .await?;

            debug!("{} reports {} (RubyGems {})", runtime.version, description, gem_version);
            fingerprint.runtimes.insert(description, gem_version);
        }

        Ok(fingerprint)
    }

    /// Runtime descriptions, compared as a set
    pub fn runtime_keys(&self) -> BTreeSet<&str> {
        self.runtimes.keys().map(String::as_str).collect()
    }

    /// Whether both fingerprints cover the same runtimes
    pub fn same_runtimes(&self, other: &Self) -> bool {
        self.runtime_keys() == other.runtime_keys()
    }

    /// Short content hash, for display
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (description, gem_version) in &self.runtimes {
            hasher.update(description.as_bytes());
            hasher.update([0]);
            hasher.update(gem_version.as_bytes());
            hasher.update([0]);
        }
        hasher.update(self.pipeline_version.as_bytes());
        hasher.update([0]);
        hasher.update(self.bundler_version.as_bytes());
        hex::encode(&hasher.finalize()[..6])
    }

    pub fn to_bytes(&self) -> RbpackResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> RbpackResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

async fn probe(runner: &dyn CommandRunner, spec: CommandSpec) -> RbpackResult<String> {
    let output = runner.run(&spec).await?;
    if !output.success() {
        return Err(RbpackError::command_exec(spec.to_string(), output.error_tail()));
    }
    Ok(output.stdout.trim().to_string())
}
