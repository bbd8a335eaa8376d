//! Configuration schema for rbpack
//!
//! Configuration is read from `rbpack.toml` in the build directory, or from
//! the path given by `--config` / `RBPACK_CONFIG`.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Runtime selection and artifact settings
    pub runtime: RuntimeConfig,

    /// Bundler settings
    pub bundler: BundlerConfig,

    /// Artifact download locations
    pub sources: SourcesConfig,

    /// Cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Version used when the application declares none
    pub default_version: String,

    /// Build stack; runtime artifacts are published per stack
    pub stack: String,

    /// JDK release installed for JRuby applications
    pub jvm_version: String,

    /// Gems whose native extensions cannot build on this platform
    pub disallowed_native_extensions: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_version: "ruby-3.2.4".to_string(),
            stack: "heroku-22".to_string(),
            jvm_version: "1.8".to_string(),
            disallowed_native_extensions: vec!["sqlite3".to_string()],
        }
    }
}

/// Bundler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Pinned Bundler release installed into every runtime's gem dir
    pub version: String,

    /// Gem groups excluded from installation (colon separated)
    pub without: String,

    /// Parallel install jobs
    pub jobs: u32,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            version: "2.5.11".to_string(),
            without: "development:test".to_string(),
            jobs: 4,
        }
    }
}

/// Artifact source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Base URL of the runtime catalog and runtime/helper artifacts
    pub runtime_url: String,

    /// Base URL of JDK artifacts
    pub jvm_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            runtime_url: "https://heroku-buildpack-ruby.s3.us-east-1.amazonaws.com".to_string(),
            jvm_url: "https://lang-jvm.s3.us-east-1.amazonaws.com".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Restore and persist installed gems across builds (default: true)
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[runtime]"));
        assert!(toml.contains("[bundler]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.runtime.default_version, "ruby-3.2.4");
        assert_eq!(config.bundler.without, "development:test");
        assert!(config.cache.enabled);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [runtime]
            stack = "heroku-24"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.runtime.stack, "heroku-24");
        assert_eq!(config.runtime.jvm_version, "1.8"); // default preserved
        assert_eq!(config.runtime.disallowed_native_extensions, vec!["sqlite3"]);
    }
}
