//! Runtime version identifiers
//!
//! An identifier names one prebuilt runtime artifact:
//! `ruby-<version>[-p<patchlevel>][-<engine>-<engine_version>]`.

use crate::error::{RbpackError, RbpackResult};
use semver::Version;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime used to compile native extensions for families older than 1.9.3
pub const BOOTSTRAP_RUNTIME: &str = "ruby-1.9.2";

/// Oldest family that builds its own native extensions
const SELF_HOSTING_FLOOR: Version = Version::new(1, 9, 3);

/// Releases below this carry their patchlevel in the identifier
const PATCHLEVEL_CEILING: Version = Version::new(2, 1, 0);

/// Alternate execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// JRuby, running on a JVM
    Jruby,
}

impl Engine {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "jruby" => Some(Self::Jruby),
            _ => None,
        }
    }

    /// Engine name as used in identifiers and gem paths
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jruby => "jruby",
        }
    }
}

/// A parsed runtime version identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeVersion {
    identifier: String,
    version: String,
    patchlevel: Option<String>,
    engine: Option<(Engine, String)>,
}

impl RuntimeVersion {
    /// Build an identifier from a Bundler `RUBY VERSION` entry, e.g.
    /// `ruby 2.7.8p225` or `ruby 2.5.7p0 (jruby 9.2.13.0)`
    pub fn from_declaration(declaration: &str) -> RbpackResult<Self> {
        let cleaned = declaration.replace(['(', ')'], " ");
        let mut words = cleaned.split_whitespace();
        let parse_err = || RbpackError::VersionParse(declaration.trim().to_string());

        if words.next() != Some("ruby") {
            return Err(parse_err());
        }
        let full = words.next().ok_or_else(parse_err)?;
        let (version, patchlevel) = match full.split_once('p') {
            Some((v, p)) => (v, Some(p)),
            None => (full, None),
        };

        let mut identifier = format!("ruby-{}", version);
        match (words.next(), words.next()) {
            (Some(engine), Some(engine_version)) => {
                identifier.push_str(&format!("-{}-{}", engine, engine_version));
            }
            (None, _) => {
                if let Some(patch) = patchlevel.filter(|p| *p != "-1") {
                    if numeric(version).is_some_and(|v| v < PATCHLEVEL_CEILING) {
                        identifier.push_str(&format!("-p{}", patch));
                    }
                }
            }
            _ => return Err(parse_err()),
        }

        identifier.parse()
    }

    /// Full identifier, e.g. `ruby-2.5.7-jruby-9.2.13.0`
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Language version, e.g. `2.5.7`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Patchlevel, if part of the identifier
    pub fn patchlevel(&self) -> Option<&str> {
        self.patchlevel.as_deref()
    }

    /// Alternate engine, if any
    pub fn engine(&self) -> Option<Engine> {
        self.engine.as_ref().map(|(e, _)| *e)
    }

    /// Alternate engine version, if any
    pub fn engine_version(&self) -> Option<&str> {
        self.engine.as_ref().map(|(_, v)| v.as_str())
    }

    /// Language version as semver (missing components are zero)
    pub fn numeric(&self) -> Version {
        numeric(&self.version).unwrap_or_else(|| Version::new(0, 0, 0))
    }

    /// Engine directory name under the bundle path (`ruby` or `jruby`)
    pub fn engine_name(&self) -> &'static str {
        self.engine().map_or("ruby", |e| e.name())
    }

    /// Gem ABI version. The 1.9 family shares the `1.9.1` ABI.
    pub fn abi_version(&self) -> String {
        let v = self.numeric();
        if v.major == 1 && v.minor == 9 {
            return "1.9.1".to_string();
        }
        format!("{}.{}.0", v.major, v.minor)
    }

    /// Version-scoped gem directory relative to the app root
    pub fn gem_dir(&self) -> PathBuf {
        PathBuf::from("vendor/bundle")
            .join(self.engine_name())
            .join(self.abi_version())
    }

    /// Interpreter executable shipped in the runtime's `bin/`
    pub fn executable(&self) -> &'static str {
        match self.engine() {
            Some(Engine::Jruby) => "jruby",
            None => "ruby",
        }
    }

    /// Whether native extensions must be built by the bootstrap runtime
    pub fn requires_bootstrap(&self) -> bool {
        self.engine.is_none() && self.numeric() < SELF_HOSTING_FLOOR
    }

    /// Whether the runtime needs a managed JVM
    pub fn needs_jvm(&self) -> bool {
        self.engine() == Some(Engine::Jruby)
    }

    /// Artifact name of the runtime tarball for `stack`
    pub fn artifact_name(&self, stack: &str) -> String {
        format!("{}/{}.tgz", stack, self.identifier)
    }
}

/// Parse up to three numeric components into a semver version
fn numeric(version: &str) -> Option<Version> {
    let mut parts = version.split('.').map(|p| p.parse::<u64>().ok());
    let major = parts.next()??;
    let minor = parts.next().unwrap_or(Some(0))?;
    let patch = parts.next().unwrap_or(Some(0))?;
    Some(Version::new(major, minor, patch))
}

impl FromStr for RuntimeVersion {
    type Err = RbpackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let identifier = s.trim();
        let parse_err = || RbpackError::VersionParse(identifier.to_string());

        let rest = identifier.strip_prefix("ruby-").ok_or_else(parse_err)?;
        let mut parts = rest.split('-');
        let version = parts.next().filter(|v| numeric(v).is_some()).ok_or_else(parse_err)?;

        let mut patchlevel = None;
        let mut engine = None;
        let mut next = parts.next();
        if let Some(p) = next.and_then(|p| p.strip_prefix('p')) {
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                return Err(parse_err());
            }
            patchlevel = Some(p.to_string());
            next = parts.next();
        }
        if let Some(name) = next {
            let kind = Engine::parse(name).ok_or_else(parse_err)?;
            let engine_version = parts.next().filter(|v| !v.is_empty()).ok_or_else(parse_err)?;
            engine = Some((kind, engine_version.to_string()));
        }
        if parts.next().is_some() {
            return Err(parse_err());
        }

        Ok(Self {
            identifier: identifier.to_string(),
            version: version.to_string(),
            patchlevel,
            engine,
        })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)
    }
}
