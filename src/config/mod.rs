//! Configuration management for rbpack

pub mod schema;

pub use schema::{BundlerConfig, CacheConfig, Config, GeneralConfig, RuntimeConfig, SourcesConfig};

use crate::error::{RbpackError, RbpackResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name looked up in the build directory
pub const LOCAL_CONFIG_FILE: &str = "rbpack.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with the default user-level path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rbpack")
            .join("config.toml")
    }

    /// Find the build-directory config, if the application ships one
    pub fn find_local_config(build_dir: &Path) -> Option<PathBuf> {
        let candidate = build_dir.join(LOCAL_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> RbpackResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> RbpackResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| RbpackError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| RbpackError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load the build-directory config when present, else this manager's path
    pub async fn load_for_build(&self, build_dir: Option<&Path>) -> RbpackResult<Config> {
        if let Some(local) = build_dir.and_then(Self::find_local_config) {
            debug!("Using build config: {}", local.display());
            return self.load_from_file(&local).await;
        }
        self.load().await
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.runtime.stack, "heroku-22");
    }

    #[tokio::test]
    async fn build_dir_config_wins() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(LOCAL_CONFIG_FILE),
            "[bundler]\nversion = \"2.4.22\"\n",
        )
        .unwrap();
        let manager = ConfigManager::with_path(temp.path().join("missing.toml"));

        let config = manager.load_for_build(Some(temp.path())).await.unwrap();
        assert_eq!(config.bundler.version, "2.4.22");
    }

    #[tokio::test]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[runtime\n").unwrap();
        let manager = ConfigManager::with_path(path.clone());

        match manager.load().await {
            Err(RbpackError::ConfigInvalid { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }
}
