//! Runtime version resolution
//!
//! Precedence, highest first:
//! 1. `RUBY_VERSION` in the build environment (deprecated)
//! 2. `RUBY VERSION` declared in Gemfile.lock
//! 3. the version recorded by a previous build
//! 4. the configured default

use crate::config::RuntimeConfig;
use crate::env::BuildEnvironment;
use crate::error::{RbpackError, RbpackResult};
use crate::fetch::Fetcher;
use crate::lockfile::Lockfile;
use crate::store::{keys, MetadataStore};
use crate::version::runtime::{RuntimeVersion, BOOTSTRAP_RUNTIME};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Catalog of available runtime identifiers at the runtime source
pub const CATALOG_NAME: &str = "ruby_versions.json";

/// Environment variable overriding the declared version
pub const VERSION_OVERRIDE_VAR: &str = "RUBY_VERSION";

/// Where the primary runtime version came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionSource {
    /// Declared in the lockfile
    ExplicitDeclaration,
    /// Recorded by a previous build
    LegacyFile,
    /// Taken from `RUBY_VERSION` (deprecated)
    EnvironmentOverride,
    /// Configured default
    Default,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitDeclaration => write!(f, "Gemfile.lock"),
            Self::LegacyFile => write!(f, "previous build"),
            Self::EnvironmentOverride => write!(f, "$RUBY_VERSION"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// How an artifact in the install plan is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallRule {
    /// Build-time only runtime, unpacked outside the app
    BootstrapRuntime,
    /// The application's runtime
    Runtime,
    /// JDK for JVM-hosted engines
    SecondaryVm,
}

/// One entry of the install plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub rule: InstallRule,
}

/// Outcome of version resolution
#[derive(Debug, Clone)]
pub struct ResolvedVersions {
    /// Runtime the application runs on
    pub primary: RuntimeVersion,
    /// Runtime used only to compile native extensions
    pub bootstrap: Option<RuntimeVersion>,
    /// Where `primary` came from
    pub source: VersionSource,
    /// Artifacts to install, in order
    pub plan: Vec<ArtifactSpec>,
    /// Notices for the build log
    pub warnings: Vec<String>,
}

impl ResolvedVersions {
    /// Every active runtime, bootstrap first
    pub fn runtimes(&self) -> Vec<&RuntimeVersion> {
        self.bootstrap.iter().chain(std::iter::once(&self.primary)).collect()
    }
}

/// The set of runtime identifiers published for a stack
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    versions: Vec<String>,
}

impl VersionCatalog {
    /// Download and parse the catalog
    pub async fn fetch(fetcher: &dyn Fetcher) -> RbpackResult<Self> {
        let bytes = fetcher.fetch(CATALOG_NAME).await?;
        Self::from_json(&bytes)
    }

    /// Parse a JSON array of identifiers
    pub fn from_json(bytes: &[u8]) -> RbpackResult<Self> {
        let versions: Vec<String> = serde_json::from_slice(bytes)?;
        debug!("Catalog lists {} runtime(s)", versions.len());
        Ok(Self { versions })
    }

    /// Whether `identifier` is published
    pub fn contains(&self, identifier: &str) -> bool {
        self.versions.iter().any(|v| v == identifier)
    }

    /// Published identifiers
    pub fn versions(&self) -> &[String] {
        &self.versions
    }
}

/// Determines which runtimes a build installs
pub struct VersionResolver<'a> {
    fetcher: &'a dyn Fetcher,
    config: &'a RuntimeConfig,
}

impl<'a> VersionResolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, config: &'a RuntimeConfig) -> Self {
        Self { fetcher, config }
    }

    /// Resolve the runtime set and install plan, recording the primary
    /// identifier in metadata.
    pub async fn resolve(
        &self,
        env: &BuildEnvironment,
        lockfile: Option<&Lockfile>,
        metadata: &mut dyn MetadataStore,
    ) -> RbpackResult<ResolvedVersions> {
        let mut warnings = Vec::new();
        let (identifier, source) = self.select(env, lockfile, &*metadata).await?;

        // Checked verbatim: anything the catalog does not publish is rejected
        // before it is interpreted.
        let catalog = VersionCatalog::fetch(self.fetcher).await?;
        let invalid = || RbpackError::InvalidVersion {
            version: identifier.clone(),
            valid: catalog.versions().to_vec(),
        };
        if !catalog.contains(&identifier) {
            return Err(invalid());
        }
        let primary: RuntimeVersion = identifier.parse().map_err(|_| invalid())?;
        let existing_app = metadata.exists(keys::BUILD_MARKER).await?;

        match source {
            VersionSource::EnvironmentOverride => warnings.push(format!(
                "Setting ${} is deprecated and will be removed.\n\
                 Declare the version in your Gemfile instead: ruby \"{}\"",
                VERSION_OVERRIDE_VAR,
                primary.version()
            )),
            VersionSource::LegacyFile => warnings.push(format!(
                "You have not declared a Ruby version in your Gemfile.\n\
                 Keeping {} from your previous build. Declare it in your Gemfile:\n\
                 ruby '{}'",
                primary,
                primary.version()
            )),
            VersionSource::Default if existing_app => warnings.push(format!(
                "You have not declared a Ruby version in your Gemfile.\n\
                 To set your Ruby version add this line to your Gemfile:\n\
                 ruby '{}'",
                primary.version()
            )),
            _ => {}
        }
        for warning in &warnings {
            warn!("{}", warning);
        }

        info!("Using Ruby version: {} (from {})", primary, source);
        metadata
            .write(
                keys::RUBY_VERSION,
                primary.identifier().as_bytes().to_vec(),
                false,
            )
            .await?;

        let bootstrap = if primary.requires_bootstrap() {
            Some(BOOTSTRAP_RUNTIME.parse::<RuntimeVersion>()?)
        } else {
            None
        };
        let plan = self.plan(&primary, bootstrap.as_ref());

        Ok(ResolvedVersions {
            primary,
            bootstrap,
            source,
            plan,
            warnings,
        })
    }

    /// Candidate identifier and its source, not yet validated
    async fn select(
        &self,
        env: &BuildEnvironment,
        lockfile: Option<&Lockfile>,
        metadata: &dyn MetadataStore,
    ) -> RbpackResult<(String, VersionSource)> {
        if let Some(raw) = env
            .get(VERSION_OVERRIDE_VAR)
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Ok((raw.to_string(), VersionSource::EnvironmentOverride));
        }

        if let Some(declared) = lockfile.and_then(|l| l.ruby_version.as_deref()) {
            let identifier = match RuntimeVersion::from_declaration(declared) {
                Ok(version) => version.identifier().to_string(),
                Err(e) => {
                    debug!("{}", e);
                    declared.trim().to_string()
                }
            };
            return Ok((identifier, VersionSource::ExplicitDeclaration));
        }

        if let Some(previous) = metadata.read_string(keys::RUBY_VERSION).await? {
            let previous = previous.trim();
            if !previous.is_empty() {
                return Ok((previous.to_string(), VersionSource::LegacyFile));
            }
        }

        Ok((
            self.config.default_version.trim().to_string(),
            VersionSource::Default,
        ))
    }

    fn plan(&self, primary: &RuntimeVersion, bootstrap: Option<&RuntimeVersion>) -> Vec<ArtifactSpec> {
        let mut plan = Vec::new();
        if let Some(bootstrap) = bootstrap {
            plan.push(ArtifactSpec {
                name: bootstrap.identifier().to_string(),
                rule: InstallRule::BootstrapRuntime,
            });
        }
        if primary.needs_jvm() {
            plan.push(ArtifactSpec {
                name: format!("openjdk{}", self.config.jvm_version),
                rule: InstallRule::SecondaryVm,
            });
        }
        plan.push(ArtifactSpec {
            name: primary.identifier().to_string(),
            rule: InstallRule::Runtime,
        });
        plan
    }
}
