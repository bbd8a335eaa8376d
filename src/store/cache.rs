//! Directory-backed cache store

use crate::error::{RbpackError, RbpackResult};
use crate::store::{copy_tree, remove_path, validate_relative};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable storage of directory trees between builds
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Restore `path` from the cache into the build directory, replacing
    /// what is there. A path absent from the cache is left untouched.
    async fn load(&self, path: &str) -> RbpackResult<()>;

    /// Save `path` from the build directory into the cache, replacing the
    /// cached copy
    async fn store(&self, path: &str) -> RbpackResult<()>;

    /// Remove `path` from the cache
    async fn clear(&self, path: &str) -> RbpackResult<()>;

    /// Whether the cache holds `path`
    async fn exists(&self, path: &str) -> RbpackResult<bool>;
}

/// Cache store that mirrors paths between the build dir and a cache dir
#[derive(Debug, Clone)]
pub struct DirCacheStore {
    build_dir: PathBuf,
    cache_dir: PathBuf,
}

impl DirCacheStore {
    /// Create a store mirroring `build_dir` into `cache_dir`
    pub fn new(build_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache directory root
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    async fn replace(from: PathBuf, to: PathBuf) -> RbpackResult<()> {
        let context = format!("copying {} to {}", from.display(), to.display());
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            remove_path(&to)?;
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent)?;
            }
            copy_tree(&from, &to)
        })
        .await
        .map_err(|e| RbpackError::Internal(format!("cache copy task failed: {}", e)))?
        .map_err(|e| RbpackError::io(context, e))
    }
}

#[async_trait]
impl CacheStore for DirCacheStore {
    async fn load(&self, path: &str) -> RbpackResult<()> {
        validate_relative(path)?;
        let cached = self.cache_dir.join(path);
        if !cached.exists() {
            debug!("Cache has no {}", path);
            return Ok(());
        }
        debug!("Loading {} from cache", path);
        Self::replace(cached, self.build_dir.join(path)).await
    }

    async fn store(&self, path: &str) -> RbpackResult<()> {
        validate_relative(path)?;
        let built = self.build_dir.join(path);
        if !built.exists() {
            debug!("Nothing to store for {}", path);
            return self.clear(path).await;
        }
        debug!("Storing {} in cache", path);
        Self::replace(built, self.cache_dir.join(path)).await
    }

    async fn clear(&self, path: &str) -> RbpackResult<()> {
        validate_relative(path)?;
        let cached = self.cache_dir.join(path);
        debug!("Clearing {} from cache", path);
        remove_path(&cached)
            .map_err(|e| RbpackError::io(format!("clearing cache path {}", cached.display()), e))
    }

    async fn exists(&self, path: &str) -> RbpackResult<bool> {
        validate_relative(path)?;
        Ok(self.cache_dir.join(path).exists())
    }
}
