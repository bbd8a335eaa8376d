//! Gemfile.lock detection, parsing and platform checks
//!
//! Only the sections that drive the build are parsed: `PLATFORMS`,
//! `RUBY VERSION` and `BUNDLED WITH`. Dependency resolution is left to
//! Bundler.

use crate::error::{RbpackError, RbpackResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lockfile name inside the application directory
pub const LOCKFILE_NAME: &str = "Gemfile.lock";

/// Gemfile name inside the application directory
pub const GEMFILE_NAME: &str = "Gemfile";

/// Platform the build runs on, in RubyGems platform terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlatform {
    /// CPU name as RubyGems spells it (`x86_64`, `aarch64`)
    pub cpu: String,
    /// Operating system (`linux`, `darwin`)
    pub os: String,
}

impl BuildPlatform {
    /// Detect the current platform
    pub fn detect() -> Self {
        Self::new(std::env::consts::ARCH, std::env::consts::OS)
    }

    /// Create a platform from CPU and OS names
    pub fn new(cpu: impl Into<String>, os: impl Into<String>) -> Self {
        let os = match os.into().as_str() {
            "macos" => "darwin".to_string(),
            other => other.to_string(),
        };
        Self {
            cpu: cpu.into(),
            os,
        }
    }

    /// Whether gems locked for `platform` can be installed here.
    ///
    /// `ruby` (pure-Ruby gems) always matches; `java` matches only when the
    /// runtime is JRuby; native platforms (`x86_64-linux`,
    /// `arm64-darwin-22`) match on CPU and OS.
    pub fn accepts(&self, platform: &str, java: bool) -> bool {
        match platform {
            "ruby" => true,
            "java" | "jruby" => java,
            other => {
                let mut parts = other.splitn(3, '-');
                let cpu = parts.next().unwrap_or_default();
                let os = parts.next().unwrap_or_default();
                let cpu_matches = cpu == self.cpu
                    || cpu == "universal"
                    || (cpu == "arm64" && self.cpu == "aarch64")
                    || (cpu == "aarch64" && self.cpu == "arm64");
                cpu_matches && os.starts_with(&self.os)
            }
        }
    }
}

impl fmt::Display for BuildPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.cpu, self.os)
    }
}

/// A parsed Gemfile.lock
#[derive(Debug, Clone)]
pub struct Lockfile {
    /// Path to the lockfile
    pub path: PathBuf,
    /// SHA256 hash of the lockfile contents (first 12 chars)
    pub hash: String,
    /// Entries of the `PLATFORMS` section
    pub platforms: Vec<String>,
    /// Entry of the `RUBY VERSION` section (e.g. `ruby 3.2.4p170`)
    pub ruby_version: Option<String>,
    /// Entry of the `BUNDLED WITH` section
    pub bundled_with: Option<String>,
}

impl Lockfile {
    /// Load the lockfile from an application directory, if present
    pub fn detect(app_dir: &Path) -> RbpackResult<Option<Self>> {
        let path = app_dir.join(LOCKFILE_NAME);
        if !path.is_file() {
            debug!("No lockfile at {}", path.display());
            return Ok(None);
        }

        let contents = fs::read(&path).map_err(|e| RbpackError::LockfileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(Self::parse(path, &contents)))
    }

    /// Parse lockfile contents
    pub fn parse(path: PathBuf, contents: &[u8]) -> Self {
        let text = String::from_utf8_lossy(contents);
        let mut platforms = Vec::new();
        let mut ruby_version = None;
        let mut bundled_with = None;
        let mut section = "";

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if !line.starts_with(' ') {
                section = line.trim();
                continue;
            }
            let entry = line.trim();
            match section {
                "PLATFORMS" => platforms.push(entry.to_string()),
                "RUBY VERSION" => ruby_version = Some(entry.to_string()),
                "BUNDLED WITH" => bundled_with = Some(entry.to_string()),
                _ => {}
            }
        }

        debug!(
            "Parsed {}: platforms={:?} ruby={:?}",
            path.display(),
            platforms,
            ruby_version
        );

        Self {
            hash: hash_contents(contents),
            path,
            platforms,
            ruby_version,
            bundled_with,
        }
    }

    /// Whether the lockfile can be installed on `platform`. A lockfile with
    /// no `PLATFORMS` section is treated as portable.
    pub fn is_compatible_with(&self, platform: &BuildPlatform, java: bool) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| platform.accepts(p, java))
    }

    /// Delete the lockfile from disk
    pub fn delete(&self) -> RbpackResult<()> {
        fs::remove_file(&self.path)
            .map_err(|e| RbpackError::io(format!("deleting {}", self.path.display()), e))
    }
}

/// Hash contents using SHA256, returning first 12 hex chars
fn hash_contents(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let result = hasher.finalize();

    // Take first 12 hex characters (6 bytes)
    hex::encode(&result[..6])
}

/// Whether the directory holds a Ruby application
pub fn is_ruby_app(app_dir: &Path) -> bool {
    app_dir.join(GEMFILE_NAME).is_file()
}
