//! Persistent stores that survive across builds
//!
//! - [`CacheStore`]: directory trees (installed gems, Bundler config) keyed
//!   by path relative to the build directory
//! - [`MetadataStore`]: small key/value records (fingerprint, version tags,
//!   first-build marker)
//!
//! Both are backed by the cache directory handed to the build. Clearing
//! that directory clears both.

mod cache;
mod metadata;

pub use cache::{CacheStore, DirCacheStore};
pub use metadata::{DirMetadataStore, MetadataStore};

use crate::error::{RbpackError, RbpackResult};
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Metadata keys written by the build
pub mod keys {
    /// Runtime version resolved by the last build (informational)
    pub const RUBY_VERSION: &str = "ruby_version";
    /// Serialized cache fingerprint
    pub const FINGERPRINT: &str = "fingerprint";
    /// Pipeline version tag of the last successful build
    pub const PIPELINE_VERSION: &str = "buildpack_version";
    /// Bundler version tag of the last successful build
    pub const BUNDLER_VERSION: &str = "bundler_version";
    /// Present once an application has completed a build
    pub const BUILD_MARKER: &str = "build_marker";
}

/// Directory under the cache dir holding build metadata
pub const METADATA_DIR: &str = "vendor/heroku";

/// Reject paths that would escape the store root
pub(crate) fn validate_relative(path: &str) -> RbpackResult<()> {
    let p = Path::new(path);
    let escapes = p.is_absolute()
        || p
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.is_empty() || escapes {
        return Err(RbpackError::Internal(format!(
            "store path must be relative and stay inside the store: {}",
            path
        )));
    }
    Ok(())
}

/// Recursively copy `src` to `dst`, preserving symlinks as symlinks.
///
/// `dst` must not exist yet.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)?;
            #[cfg(not(unix))]
            std::fs::copy(entry.path(), &target).map(|_| ())?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file, symlink or directory tree if present
pub(crate) fn remove_path(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
