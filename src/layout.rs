//! Filesystem layout of a build
//!
//! ```text
//! <build_dir>/
//!   bin/                      links to runtime executables
//!   vendor/<runtime>/         unpacked runtime
//!   vendor/jvm/               JDK (JRuby only)
//!   vendor/bundle/            installed gems, binstubs under bin/
//!   .bundle/                  Bundler configuration
//!   .profile.d/ruby.sh        runtime environment
//! <cache_dir>/
//!   vendor/bundle/, .bundle/  cached copies
//!   vendor/heroku/            build metadata
//! <scratch_dir>/              build-only artifacts, never shipped
//! ```

use crate::store::METADATA_DIR;
use crate::version::RuntimeVersion;
use std::path::{Path, PathBuf};

/// Bundler install path, relative to the build dir
pub const BUNDLE_PATH: &str = "vendor/bundle";

/// Bundler configuration dir, relative to the build dir
pub const BUNDLE_CONFIG_PATH: &str = ".bundle";

/// Paths used by one build
#[derive(Debug, Clone)]
pub struct BuildLayout {
    build_dir: PathBuf,
    cache_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl BuildLayout {
    /// Layout with a fresh scratch dir under the system temp dir
    pub fn new(build_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        let scratch_dir = std::env::temp_dir().join(format!("rbpack-{}", uuid::Uuid::new_v4()));
        Self::with_scratch_dir(build_dir, cache_dir, scratch_dir)
    }

    /// Layout with an explicit scratch dir
    pub fn with_scratch_dir(
        build_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            build_dir: build_dir.into(),
            cache_dir: cache_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.build_dir.join("bin")
    }

    /// Install dir of an application runtime
    pub fn runtime_dir(&self, runtime: &RuntimeVersion) -> PathBuf {
        self.build_dir.join("vendor").join(runtime.identifier())
    }

    /// Install dir of a bootstrap runtime
    pub fn bootstrap_dir(&self, runtime: &RuntimeVersion) -> PathBuf {
        self.scratch_dir.join(runtime.identifier())
    }

    pub fn jvm_dir(&self) -> PathBuf {
        self.build_dir.join("vendor/jvm")
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.build_dir.join(BUNDLE_PATH)
    }

    /// Binstubs written by Bundler
    pub fn binstubs_dir(&self) -> PathBuf {
        self.bundle_dir().join("bin")
    }

    /// Version-scoped gem dir of `runtime`
    pub fn gem_dir(&self, runtime: &RuntimeVersion) -> PathBuf {
        self.build_dir.join(runtime.gem_dir())
    }

    pub fn bundle_config_dir(&self) -> PathBuf {
        self.build_dir.join(BUNDLE_CONFIG_PATH)
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.build_dir.join(".profile.d")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.cache_dir.join(METADATA_DIR)
    }

    /// Unpacked libyaml headers and libraries
    pub fn libyaml_dir(&self) -> PathBuf {
        self.scratch_dir.join("libyaml")
    }

    /// `path` relative to the build dir, if inside it
    pub fn relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(&self.build_dir).ok()
    }
}
