//! Error types for rbpack
//!
//! All modules use `RbpackResult<T>` as their return type. Every fatal
//! build error carries a remediation through [`RbpackError::hint`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rbpack operations
pub type RbpackResult<T> = Result<T, RbpackError>;

/// All errors that can occur in rbpack
#[derive(Error, Debug)]
pub enum RbpackError {
    // Version errors
    #[error("Invalid Ruby version specified: {version}\nValid versions: {}", valid.join(", "))]
    InvalidVersion { version: String, valid: Vec<String> },

    #[error("Could not parse Ruby version identifier: {0}")]
    VersionParse(String),

    // Manifest errors
    #[error("Gemfile.lock required. Please check it in.")]
    MissingManifest,

    #[error("Failed to read lockfile {path}: {reason}")]
    LockfileRead { path: String, reason: String },

    // Artifact errors
    #[error("Could not install {artifact} for stack {stack}: {reason}")]
    ArtifactFetch {
        artifact: String,
        stack: String,
        reason: String,
    },

    #[error("HTTP request failed for {url}: {reason}")]
    Http { url: String, reason: String },

    // Dependency errors
    #[error(
        "Failed to install gems via Bundler.\n{output}{}",
        remediation.as_ref().map(|r| format!("\n\n{}", r)).unwrap_or_default()
    )]
    DependencyInstall {
        output: String,
        remediation: Option<String>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Store errors
    #[error("Metadata key {key} is not valid UTF-8")]
    MetadataEncoding { key: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, output: {output}")]
    CommandExecution { command: String, output: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl RbpackError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Whether this error is a user-facing build failure (as opposed to an
    /// internal or environmental one)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVersion { .. }
                | Self::MissingManifest
                | Self::ArtifactFetch { .. }
                | Self::DependencyInstall { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InvalidVersion { .. } => Some(
                "Declare one of the valid versions in your Gemfile, run `bundle install`, and commit Gemfile.lock"
                    .to_string(),
            ),
            Self::MissingManifest => Some(
                "Run `bundle install` locally and commit the generated Gemfile.lock".to_string(),
            ),
            Self::ArtifactFetch { stack, .. } => Some(format!(
                "Check that this version is available for {}, or retry the build if the network failed",
                stack
            )),
            Self::DependencyInstall { .. } => {
                Some("Run `bundle install` locally to reproduce the failure".to_string())
            }
            _ => None,
        }
    }
}
