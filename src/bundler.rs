//! Gem installation via Bundler
//!
//! Installs the application's gems into `vendor/bundle` with the runtime's
//! Bundler. A lockfile from an incompatible platform is discarded and
//! Bundler resolves from scratch; otherwise the install runs in deployment
//! mode against the lockfile.

use crate::config::{BundlerConfig, RuntimeConfig};
use crate::env::{BuildEnvironment, ScopedEnvRemoval};
use crate::error::{RbpackError, RbpackResult};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::layout::{BuildLayout, BUNDLE_PATH};
use crate::lockfile::{BuildPlatform, Lockfile, LOCKFILE_NAME};
use crate::store::remove_path;
use crate::version::ResolvedVersions;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Version of the libyaml helper artifact
pub const LIBYAML_VERSION: &str = "0.1.7";

/// Variable that makes git commands in gem installs operate on the wrong repo
pub const GIT_DIR: &str = "GIT_DIR";

/// What the install did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    /// Whether Bundler ran with `--deployment`
    pub deployment: bool,
    /// Whether the lockfile was discarded and regenerated
    pub lockfile_regenerated: bool,
    /// `BUNDLED WITH` of the application's lockfile
    pub bundled_with: Option<String>,
    /// Gem dirs that received a fresh copy of Bundler
    pub managed_installs: Vec<PathBuf>,
}

/// Load the application's lockfile, which must exist
pub fn require_lockfile(build_dir: &Path) -> RbpackResult<Lockfile> {
    Lockfile::detect(build_dir)?.ok_or(RbpackError::MissingManifest)
}

/// Runs Bundler for the application
pub struct DependencyInstaller<'a> {
    fetcher: &'a dyn Fetcher,
    runner: &'a dyn CommandRunner,
    layout: &'a BuildLayout,
    bundler: &'a BundlerConfig,
    runtime: &'a RuntimeConfig,
    platform: BuildPlatform,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        runner: &'a dyn CommandRunner,
        layout: &'a BuildLayout,
        bundler: &'a BundlerConfig,
        runtime: &'a RuntimeConfig,
    ) -> Self {
        Self {
            fetcher,
            runner,
            layout,
            bundler,
            runtime,
            platform: BuildPlatform::detect(),
        }
    }

    /// Check lockfile compatibility against `platform` instead of the host
    pub fn with_platform(mut self, platform: BuildPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Install gems. `purged` forces a fresh copy of Bundler into every
    /// gem dir.
    pub async fn install(
        &self,
        versions: &ResolvedVersions,
        env: &BuildEnvironment,
        purged: bool,
    ) -> RbpackResult<InstallSummary> {
        let lockfile = require_lockfile(self.layout.build_dir())?;
        let mut summary = InstallSummary {
            bundled_with: lockfile.bundled_with.clone(),
            ..InstallSummary::default()
        };

        summary.deployment =
            lockfile.is_compatible_with(&self.platform, versions.primary.needs_jvm());
        if !summary.deployment {
            warn!(
                "Removing `Gemfile.lock` because it was generated for {} which cannot be installed on {}.\n\
                 Bundler will do a full resolve so native gems are handled properly.\n\
                 This may result in unexpected gem versions being used in your app.",
                lockfile.platforms.join(", "),
                self.platform
            );
            lockfile.delete()?;
            // Frozen settings from a cached config would refuse to resolve
            let config = self.layout.bundle_config_dir().join("config");
            remove_path(&config)
                .map_err(|e| RbpackError::io(format!("removing {}", config.display()), e))?;
        }

        summary.managed_installs = self.install_managed_gems(versions, purged).await?;
        let libyaml = self.prepare_libyaml().await?;

        let spec = self.install_command(versions, env, &libyaml, summary.deployment);
        info!("Running: {}", spec);
        let output = {
            let _git_dir = ScopedEnvRemoval::remove(GIT_DIR);
            self.runner.run_streaming(&spec).await?
        };

        if !output.success() {
            return Err(self.install_error(&output));
        }

        if !summary.deployment {
            summary.lockfile_regenerated = self.layout.build_dir().join(LOCKFILE_NAME).is_file();
            if !summary.lockfile_regenerated {
                warn!("Bundler did not write a new Gemfile.lock");
            }
        }

        self.trim_bundle(versions)?;
        if summary.deployment {
            self.clean(env).await;
        }

        Ok(summary)
    }

    /// Install the pinned Bundler into each runtime's gem dir
    async fn install_managed_gems(
        &self,
        versions: &ResolvedVersions,
        purged: bool,
    ) -> RbpackResult<Vec<PathBuf>> {
        let artifact = format!("bundler/bundler-{}.tgz", self.bundler.version);
        let gem_dirs: BTreeSet<PathBuf> = versions
            .runtimes()
            .into_iter()
            .map(|runtime| self.layout.gem_dir(runtime))
            .collect();

        let mut installed = Vec::new();
        for gem_dir in gem_dirs {
            let marker = gem_dir
                .join("gems")
                .join(format!("bundler-{}", self.bundler.version));
            if !purged && marker.exists() {
                debug!("Bundler {} present in {}", self.bundler.version, gem_dir.display());
                continue;
            }

            info!("Installing bundler {}", self.bundler.version);
            self.unpack(&artifact, &gem_dir).await?;
            installed.push(gem_dir);
        }
        Ok(installed)
    }

    /// Unpack libyaml headers and libraries for native extensions
    async fn prepare_libyaml(&self) -> RbpackResult<PathBuf> {
        let dir = self.layout.libyaml_dir();
        let artifact = format!("{}/libyaml-{}.tgz", self.runtime.stack, LIBYAML_VERSION);
        self.unpack(&artifact, &dir).await?;
        Ok(dir)
    }

    async fn unpack(&self, artifact: &str, dest: &Path) -> RbpackResult<()> {
        match self.fetcher.fetch_and_unpack(artifact, dest).await? {
            FetchOutcome::Unpacked => Ok(()),
            FetchOutcome::Failed(reason) => Err(RbpackError::ArtifactFetch {
                artifact: artifact.to_string(),
                stack: self.runtime.stack.clone(),
                reason,
            }),
        }
    }

    fn without_groups(&self, env: &BuildEnvironment) -> String {
        env.get("BUNDLE_WITHOUT")
            .map(str::trim)
            .filter(|groups| !groups.is_empty())
            .unwrap_or(self.bundler.without.as_str())
            .to_string()
    }

    fn install_command(
        &self,
        versions: &ResolvedVersions,
        env: &BuildEnvironment,
        libyaml: &Path,
        deployment: bool,
    ) -> CommandSpec {
        let prepend = |key: &str, value: PathBuf| match env.get(key).filter(|v| !v.is_empty()) {
            Some(existing) => format!("{}:{}", value.display(), existing),
            None => value.display().to_string(),
        };
        let include = libyaml.join("include");

        let mut command_env = env
            .without(GIT_DIR)
            .with("CPATH", prepend("CPATH", include.clone()))
            .with("CPPATH", prepend("CPPATH", include))
            .with("LIBRARY_PATH", prepend("LIBRARY_PATH", libyaml.join("lib")));

        // Bootstrap tools go last so they never shadow the app's runtime
        if let Some(bootstrap) = &versions.bootstrap {
            let bin = self.layout.bootstrap_dir(bootstrap).join("bin");
            let path = match env.get("PATH") {
                Some(path) => format!("{}:{}", path, bin.display()),
                None => bin.display().to_string(),
            };
            command_env = command_env.with("PATH", path);
        }

        let mut spec = CommandSpec::new("bundle")
            .args(["install", "--without"])
            .arg(self.without_groups(env))
            .args([
                "--path",
                BUNDLE_PATH,
                "--binstubs",
                "vendor/bundle/bin",
            ])
            .arg(format!("-j{}", self.bundler.jobs));
        if deployment {
            spec = spec.arg("--deployment");
        }
        spec.env(command_env.vars().clone())
            .current_dir(self.layout.build_dir())
    }

    fn install_error(&self, output: &CommandOutput) -> RbpackError {
        let combined = output.combined();
        let remediation = self
            .runtime
            .disallowed_native_extensions
            .iter()
            .find(|gem| combined.contains(&format!("An error occurred while installing {}", gem)))
            .map(|gem| {
                format!(
                    "Detected {gem} gem which is not supported on this platform.\n\
                     Move `{gem}` into the development and test groups of your Gemfile \
                     so it is not installed during the build.",
                    gem = gem
                )
            });

        RbpackError::DependencyInstall {
            output: combined.trim_end().to_string(),
            remediation,
        }
    }

    /// Drop the gem download cache and native build objects
    fn trim_bundle(&self, versions: &ResolvedVersions) -> RbpackResult<()> {
        let gem_dir = self.layout.gem_dir(&versions.primary);
        let cache = gem_dir.join("cache");
        remove_path(&cache).map_err(|e| RbpackError::io(format!("removing {}", cache.display()), e))?;

        let gems = gem_dir.join("gems");
        let Ok(entries) = std::fs::read_dir(&gems) else {
            return Ok(());
        };
        let mut removed = 0usize;
        for ext in entries.filter_map(|e| e.ok()).map(|e| e.path().join("ext")) {
            for entry in WalkDir::new(&ext).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if entry.file_type().is_file() && path.extension().is_some_and(|x| x == "o") {
                    std::fs::remove_file(path)
                        .map_err(|e| RbpackError::io(format!("removing {}", path.display()), e))?;
                    removed += 1;
                }
            }
        }
        debug!("Removed {} native build object(s)", removed);
        Ok(())
    }

    /// Remove gems no longer in the lockfile
    async fn clean(&self, env: &BuildEnvironment) {
        let spec = CommandSpec::new("bundle")
            .arg("clean")
            .env(env.without(GIT_DIR).vars().clone())
            .current_dir(self.layout.build_dir());
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => debug!("bundle clean finished"),
            Ok(output) => warn!("bundle clean failed: {}", output.error_tail()),
            Err(e) => warn!("bundle clean failed: {}", e),
        }
    }
}
