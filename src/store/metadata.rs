//! Build metadata persistence
//!
//! Each key is one file under the metadata root. Writes flagged as
//! touching the fingerprint are staged in memory and only reach disk on
//! [`MetadataStore::save`], so a build that fails before saving leaves the
//! previous fingerprint intact. Informational writes go straight to disk.

use crate::error::{RbpackError, RbpackResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Durable key/value storage between builds
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Read a value, if present
    async fn read(&self, key: &str) -> RbpackResult<Option<Vec<u8>>>;

    /// Write a value. `touches_fingerprint` marks values that take part in
    /// cache-validity comparison; those are held back until [`save`](Self::save).
    async fn write(&mut self, key: &str, value: Vec<u8>, touches_fingerprint: bool)
        -> RbpackResult<()>;

    /// Whether a value exists for `key`
    async fn exists(&self, key: &str) -> RbpackResult<bool>;

    /// Flush staged values
    async fn save(&mut self) -> RbpackResult<()>;

    /// Read a value as UTF-8 text with surrounding whitespace removed
    async fn read_string(&self, key: &str) -> RbpackResult<Option<String>> {
        match self.read(key).await? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes)
                .map(|s| Some(s.trim().to_string()))
                .map_err(|_| RbpackError::MetadataEncoding {
                    key: key.to_string(),
                }),
        }
    }
}

/// Metadata store keeping one file per key in a directory
#[derive(Debug)]
pub struct DirMetadataStore {
    root: PathBuf,
    staged: BTreeMap<String, Vec<u8>>,
}

impl DirMetadataStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staged: BTreeMap::new(),
        }
    }

    fn key_path(&self, key: &str) -> RbpackResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(RbpackError::Internal(format!("invalid metadata key: {}", key)));
        }
        Ok(self.root.join(key))
    }

    async fn write_through(&self, key: &str, value: &[u8]) -> RbpackResult<()> {
        let path = self.key_path(key)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RbpackError::io(format!("creating {}", self.root.display()), e))?;
        fs::write(&path, value)
            .await
            .map_err(|e| RbpackError::io(format!("writing metadata {}", path.display()), e))
    }
}

#[async_trait]
impl MetadataStore for DirMetadataStore {
    async fn read(&self, key: &str) -> RbpackResult<Option<Vec<u8>>> {
        if let Some(value) = self.staged.get(key) {
            return Ok(Some(value.clone()));
        }
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RbpackError::io(format!("reading metadata {}", path.display()), e)),
        }
    }

    async fn write(
        &mut self,
        key: &str,
        value: Vec<u8>,
        touches_fingerprint: bool,
    ) -> RbpackResult<()> {
        self.key_path(key)?;
        if touches_fingerprint {
            debug!("Staging metadata {}", key);
            self.staged.insert(key.to_string(), value);
            Ok(())
        } else {
            debug!("Writing metadata {}", key);
            self.write_through(key, &value).await
        }
    }

    async fn exists(&self, key: &str) -> RbpackResult<bool> {
        if self.staged.contains_key(key) {
            return Ok(true);
        }
        Ok(self.key_path(key)?.exists())
    }

    async fn save(&mut self) -> RbpackResult<()> {
        let staged = std::mem::take(&mut self.staged);
        for (key, value) in &staged {
            self.write_through(key, value).await?;
        }
        debug!("Saved {} metadata value(s)", staged.len());
        Ok(())
    }
}
