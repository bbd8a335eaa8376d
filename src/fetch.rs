//! Artifact fetching
//!
//! The [`Fetcher`] trait downloads named artifacts relative to a base
//! location and unpacks tarballs into a destination directory. Unpack
//! failures are reported as a [`FetchOutcome`] the caller inspects; `Err`
//! is kept for failures of the local machinery (e.g. creating directories).

use crate::error::{RbpackError, RbpackResult};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Result of a fetch-and-unpack attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The artifact was downloaded and unpacked
    Unpacked,
    /// Download or unpack failed; carries the reason
    Failed(String),
}

impl FetchOutcome {
    /// Whether the artifact is now present on disk
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Unpacked)
    }
}

/// Abstract artifact source
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download an artifact into memory
    async fn fetch(&self, name: &str) -> RbpackResult<Vec<u8>>;

    /// Download a gzipped tarball and unpack it into `dest`
    async fn fetch_and_unpack(&self, name: &str, dest: &Path) -> RbpackResult<FetchOutcome>;

    /// Human-readable description of the source, for diagnostics
    fn source_name(&self) -> String;
}

/// Fetches artifacts over HTTPS and unpacks them with `tar`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    base_url: String,
}

impl HttpFetcher {
    /// Create a fetcher rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    /// Blocking download of `url` into `target`
    fn download_to(url: &str, target: &Path) -> Result<u64, String> {
        let mut response = ureq::get(url).call().map_err(|e| e.to_string())?;
        let mut file = std::fs::File::create(target).map_err(|e| e.to_string())?;
        io::copy(&mut response.body_mut().as_reader(), &mut file).map_err(|e| e.to_string())
    }

    async fn download(&self, name: &str, target: PathBuf) -> Result<u64, String> {
        let url = self.url_for(name);
        debug!("Downloading {}", url);
        tokio::task::spawn_blocking(move || Self::download_to(&url, &target))
            .await
            .map_err(|e| format!("download task failed: {}", e))?
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, name: &str) -> RbpackResult<Vec<u8>> {
        let url = self.url_for(name);
        debug!("Fetching {}", url);

        let task_url = url.clone();
        let body = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, String> {
            let mut response = ureq::get(&task_url).call().map_err(|e| e.to_string())?;
            response
                .body_mut()
                .read_to_vec()
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| RbpackError::Internal(format!("fetch task failed: {}", e)))?;

        body.map_err(|reason| RbpackError::Http { url, reason })
    }

    async fn fetch_and_unpack(&self, name: &str, dest: &Path) -> RbpackResult<FetchOutcome> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| RbpackError::io(format!("creating {}", dest.display()), e))?;

        let archive = dest.join(format!(".download-{}.tgz", uuid::Uuid::new_v4()));
        let downloaded = self.download(name, archive.clone()).await;

        let outcome = match downloaded {
            Err(reason) => FetchOutcome::Failed(reason),
            Ok(bytes) => {
                info!("Fetched {} ({} bytes)", name, bytes);
                unpack(&archive, dest).await
            }
        };

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", archive.display(), e);
            }
        }

        Ok(outcome)
    }

    fn source_name(&self) -> String {
        self.base_url.clone()
    }
}

async fn unpack(archive: &Path, dest: &Path) -> FetchOutcome {
    let result = Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => FetchOutcome::Unpacked,
        Ok(output) => FetchOutcome::Failed(format!(
            "tar exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Err(e) => FetchOutcome::Failed(format!("could not run tar: {}", e)),
    }
}
