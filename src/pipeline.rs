//! Build pipeline
//!
//! Stages run strictly in order and the first failure aborts the build.
//! Cache contents and fingerprint metadata are only written by the last
//! stage, so an aborted build leaves the next one starting from the
//! previous successful state.

use crate::artifact::ArtifactInstaller;
use crate::bundler::{require_lockfile, DependencyInstaller};
use crate::cache::{CacheDecision, CacheFingerprint, CacheManager, InstalledRuntime};
use crate::config::Config;
use crate::env::{BuildEnvironment, EnvironmentBuilder};
use crate::error::RbpackResult;
use crate::exec::{CommandRunner, SystemRunner};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::layout::BuildLayout;
use crate::lockfile::BuildPlatform;
use crate::store::{keys, CacheStore, DirCacheStore, DirMetadataStore, MetadataStore};
use crate::version::{ResolvedVersions, VersionResolver, VersionSource};
use crate::PIPELINE_VERSION;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// External collaborators of a build
pub struct Collaborators {
    /// Runtime catalog, runtimes, Bundler and libyaml
    pub runtime_fetcher: Box<dyn Fetcher>,
    /// JDK artifacts
    pub vm_fetcher: Box<dyn Fetcher>,
    pub runner: Box<dyn CommandRunner>,
    pub cache: Box<dyn CacheStore>,
    pub metadata: Box<dyn MetadataStore>,
}

impl Collaborators {
    /// Production collaborators: HTTPS downloads, real processes and
    /// directory-backed stores
    pub fn system(config: &Config, layout: &BuildLayout) -> Self {
        Self {
            runtime_fetcher: Box::new(HttpFetcher::new(&config.sources.runtime_url)),
            vm_fetcher: Box::new(HttpFetcher::new(&config.sources.jvm_url)),
            runner: Box::new(SystemRunner::new()),
            cache: Box::new(DirCacheStore::new(layout.build_dir(), layout.cache_dir())),
            metadata: Box::new(DirMetadataStore::new(layout.metadata_dir())),
        }
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckManifest,
    ResolveVersions,
    InstallRuntimes,
    BuildEnvironment,
    ValidateCache,
    InstallDependencies,
    PersistCache,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckManifest => write!(f, "Checking Gemfile.lock"),
            Self::ResolveVersions => write!(f, "Resolving Ruby version"),
            Self::InstallRuntimes => write!(f, "Installing runtimes"),
            Self::BuildEnvironment => write!(f, "Setting up environment"),
            Self::ValidateCache => write!(f, "Validating cache"),
            Self::InstallDependencies => write!(f, "Installing dependencies using bundler"),
            Self::PersistCache => write!(f, "Caching build"),
        }
    }
}

/// Summary of a successful build
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Application runtime
    pub ruby_version: String,
    /// Build-only runtime, if one was needed
    pub bootstrap_version: Option<String>,
    pub source: VersionSource,
    /// Content hash of the lockfile as checked in
    pub lockfile_hash: String,
    /// Artifacts downloaded by this build
    pub fetched: Vec<String>,
    pub cache: CacheDecision,
    /// Whether Bundler ran in deployment mode
    pub deployment: bool,
    pub lockfile_regenerated: bool,
    pub bundled_with: Option<String>,
    pub profile_script: PathBuf,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

/// One build of one application
pub struct Pipeline {
    config: Config,
    layout: BuildLayout,
    base_env: BuildEnvironment,
    collaborators: Collaborators,
    platform: Option<BuildPlatform>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        layout: BuildLayout,
        base_env: BuildEnvironment,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            layout,
            base_env,
            collaborators,
            platform: None,
        }
    }

    /// Check lockfile compatibility against `platform` instead of the host
    pub fn with_platform(mut self, platform: BuildPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Run every stage. The scratch dir is removed afterwards whether or
    /// not the build succeeded.
    pub async fn run(self) -> RbpackResult<BuildReport> {
        let scratch = self.layout.scratch_dir().to_path_buf();
        let result = self.execute().await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", scratch.display(), e);
            }
        }
        result
    }

    async fn execute(self) -> RbpackResult<BuildReport> {
        let started = Instant::now();
        let Self {
            config,
            layout,
            base_env,
            collaborators,
            platform,
        } = self;
        let Collaborators {
            runtime_fetcher,
            vm_fetcher,
            runner,
            cache,
            mut metadata,
        } = collaborators;

        enter(Stage::CheckManifest);
        let lockfile = require_lockfile(layout.build_dir())?;

        enter(Stage::ResolveVersions);
        let versions = VersionResolver::new(runtime_fetcher.as_ref(), &config.runtime)
            .resolve(&base_env, Some(&lockfile), metadata.as_mut())
            .await?;
        let mut warnings = versions.warnings.clone();

        enter(Stage::InstallRuntimes);
        let installed = ArtifactInstaller::new(
            runtime_fetcher.as_ref(),
            vm_fetcher.as_ref(),
            &layout,
            &config.runtime.stack,
            &config.runtime.jvm_version,
        )
        .install_plan(&versions)
        .await?;

        enter(Stage::BuildEnvironment);
        let builder = EnvironmentBuilder::new(&layout);
        let env = builder.build_process_env(&base_env, &versions);
        let profile_script = builder
            .build_profile_script(&versions)
            .write(&layout.profile_dir())
            .await?;

        enter(Stage::ValidateCache);
        let mut manager =
            CacheManager::load(cache.as_ref(), metadata.as_ref(), &layout, config.cache.enabled)
                .await?;
        let current = CacheFingerprint::observe(
            &installed_runtimes(&layout, &versions),
            runner.as_ref(),
            &env,
            PIPELINE_VERSION,
            &config.bundler.version,
        )
        .await?;
        let decision = manager.validate(current)?;
        manager.apply(&decision).await?;
        if let CacheDecision::Purged(reason) = &decision {
            warnings.push(format!("{}. Purged cached gems.", reason));
        }

        enter(Stage::InstallDependencies);
        let mut installer = DependencyInstaller::new(
            runtime_fetcher.as_ref(),
            runner.as_ref(),
            &layout,
            &config.bundler,
            &config.runtime,
        );
        if let Some(platform) = platform {
            installer = installer.with_platform(platform);
        }
        let summary = installer
            .install(&versions, &env, decision.is_purged())
            .await?;
        if !summary.deployment {
            warnings.push(
                "Gemfile.lock was generated for another platform and has been regenerated"
                    .to_string(),
            );
        }

        enter(Stage::PersistCache);
        manager.persist(metadata.as_mut()).await?;
        if let Err(e) = metadata
            .write(keys::BUILD_MARKER, PIPELINE_VERSION.as_bytes().to_vec(), false)
            .await
        {
            warn!("Could not record build marker: {}", e);
        }

        let duration = started.elapsed();
        info!("Build finished in {:.1}s", duration.as_secs_f64());

        Ok(BuildReport {
            ruby_version: versions.primary.identifier().to_string(),
            bootstrap_version: versions.bootstrap.as_ref().map(|b| b.identifier().to_string()),
            source: versions.source,
            lockfile_hash: lockfile.hash,
            fetched: installed.fetched,
            cache: decision,
            deployment: summary.deployment,
            lockfile_regenerated: summary.lockfile_regenerated,
            bundled_with: summary.bundled_with,
            profile_script,
            warnings,
            duration,
        })
    }
}

fn enter(stage: Stage) {
    info!("-----> {}", stage);
}

/// Interpreters to probe for the fingerprint, bootstrap first
fn installed_runtimes(layout: &BuildLayout, versions: &ResolvedVersions) -> Vec<InstalledRuntime> {
    let bootstrap = versions.bootstrap.iter().map(|runtime| InstalledRuntime {
        version: runtime.clone(),
        executable: layout.bootstrap_dir(runtime).join("bin").join(runtime.executable()),
    });
    let primary = std::iter::once(InstalledRuntime {
        version: versions.primary.clone(),
        executable: layout
            .runtime_dir(&versions.primary)
            .join("bin")
            .join(versions.primary.executable()),
    });
    bootstrap.chain(primary).collect()
}
