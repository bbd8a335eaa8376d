//! Runtime and JDK installation
//!
//! Artifacts are unpacked into their install dir and marked complete; a
//! marked install is never fetched again. Executables of installs inside
//! the application are linked into `bin/`.

use crate::error::{RbpackError, RbpackResult};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::layout::BuildLayout;
use crate::store::remove_path;
use crate::version::{InstallRule, ResolvedVersions, RuntimeVersion};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Written into an install dir once unpacking succeeded
pub const INSTALL_MARKER: &str = ".rbpack-installed";

/// What an install pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Artifacts downloaded during this pass
    pub fetched: Vec<String>,
    /// Names linked into `bin/`
    pub linked: Vec<String>,
}

/// Installs the artifacts of a resolved plan
pub struct ArtifactInstaller<'a> {
    runtime_fetcher: &'a dyn Fetcher,
    vm_fetcher: &'a dyn Fetcher,
    layout: &'a BuildLayout,
    stack: &'a str,
    jvm_version: &'a str,
}

impl<'a> ArtifactInstaller<'a> {
    pub fn new(
        runtime_fetcher: &'a dyn Fetcher,
        vm_fetcher: &'a dyn Fetcher,
        layout: &'a BuildLayout,
        stack: &'a str,
        jvm_version: &'a str,
    ) -> Self {
        Self {
            runtime_fetcher,
            vm_fetcher,
            layout,
            stack,
            jvm_version,
        }
    }

    /// Install every artifact of the plan, in order
    pub async fn install_plan(&self, versions: &ResolvedVersions) -> RbpackResult<InstallReport> {
        let mut report = InstallReport::default();

        for spec in &versions.plan {
            let (artifact, fetched, install_dir) = match spec.rule {
                InstallRule::BootstrapRuntime => {
                    let runtime: RuntimeVersion = spec.name.parse()?;
                    let fetched = self.install_bootstrap_runtime(&runtime).await?;
                    (
                        runtime.artifact_name(self.stack),
                        fetched,
                        self.layout.bootstrap_dir(&runtime),
                    )
                }
                InstallRule::Runtime => {
                    let runtime: RuntimeVersion = spec.name.parse()?;
                    let fetched = self.install_runtime(&runtime).await?;
                    (
                        runtime.artifact_name(self.stack),
                        fetched,
                        self.layout.runtime_dir(&runtime),
                    )
                }
                InstallRule::SecondaryVm => {
                    let fetched = self.install_secondary_vm().await?;
                    (self.jvm_artifact(), fetched, self.layout.jvm_dir())
                }
            };

            if fetched {
                report.fetched.push(artifact);
            }
            report.linked.extend(self.link_executables(&install_dir).await?);
        }

        Ok(report)
    }

    /// Install an application runtime into `vendor/<identifier>`.
    /// Returns whether anything was downloaded.
    pub async fn install_runtime(&self, runtime: &RuntimeVersion) -> RbpackResult<bool> {
        info!("Installing {}", runtime);
        let artifact = runtime.artifact_name(self.stack);
        let dest = self.layout.runtime_dir(runtime);
        self.install_artifact(self.runtime_fetcher, &artifact, &dest).await
    }

    /// Install the build-only runtime into the scratch dir
    pub async fn install_bootstrap_runtime(&self, runtime: &RuntimeVersion) -> RbpackResult<bool> {
        info!("Installing {} to build native extensions", runtime);
        let artifact = runtime.artifact_name(self.stack);
        let dest = self.layout.bootstrap_dir(runtime);
        self.install_artifact(self.runtime_fetcher, &artifact, &dest).await
    }

    /// Install the JDK into `vendor/jvm`
    pub async fn install_secondary_vm(&self) -> RbpackResult<bool> {
        info!("Installing JVM: openjdk{}", self.jvm_version);
        let artifact = self.jvm_artifact();
        let dest = self.layout.jvm_dir();
        self.install_artifact(self.vm_fetcher, &artifact, &dest).await
    }

    fn jvm_artifact(&self) -> String {
        format!("openjdk{}.tar.gz", self.jvm_version)
    }

    async fn install_artifact(
        &self,
        fetcher: &dyn Fetcher,
        artifact: &str,
        dest: &Path,
    ) -> RbpackResult<bool> {
        let marker = dest.join(INSTALL_MARKER);
        if marker.exists() {
            debug!("{} already installed at {}", artifact, dest.display());
            return Ok(false);
        }

        // Drop leftovers of an interrupted install
        remove_path(dest).map_err(|e| RbpackError::io(format!("clearing {}", dest.display()), e))?;

        match fetcher.fetch_and_unpack(artifact, dest).await? {
            FetchOutcome::Unpacked => {}
            FetchOutcome::Failed(reason) => {
                return Err(RbpackError::ArtifactFetch {
                    artifact: artifact.to_string(),
                    stack: self.stack.to_string(),
                    reason: format!("{} (from {})", reason, fetcher.source_name()),
                });
            }
        }

        tokio::fs::write(&marker, artifact)
            .await
            .map_err(|e| RbpackError::io(format!("writing {}", marker.display()), e))?;
        Ok(true)
    }

    /// Link the executables of `install_dir/bin` into the app's `bin/`.
    ///
    /// Existing symlinks are replaced; regular files are left alone. Installs
    /// outside the application are not linked.
    pub async fn link_executables(&self, install_dir: &Path) -> RbpackResult<Vec<String>> {
        let Some(relative) = self.layout.relative(install_dir) else {
            return Ok(Vec::new());
        };
        let source_bin = install_dir.join("bin");
        if !source_bin.is_dir() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = std::fs::read_dir(&source_bin)
            .map_err(|e| RbpackError::io(format!("reading {}", source_bin.display()), e))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let bin_dir = self.layout.bin_dir();
        tokio::fs::create_dir_all(&bin_dir)
            .await
            .map_err(|e| RbpackError::io(format!("creating {}", bin_dir.display()), e))?;

        let mut linked = Vec::new();
        for name in names {
            let link = bin_dir.join(&name);
            match std::fs::symlink_metadata(&link) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    std::fs::remove_file(&link)
                        .map_err(|e| RbpackError::io(format!("replacing {}", link.display()), e))?;
                }
                Ok(_) => {
                    warn!("Not linking {}: bin/{} is provided by the app", name, name);
                    continue;
                }
                Err(_) => {}
            }

            let target = PathBuf::from("..").join(relative).join("bin").join(&name);
            symlink(&target, &link)
                .map_err(|e| RbpackError::io(format!("linking {}", link.display()), e))?;
            linked.push(name);
        }

        debug!("Linked {} executable(s) from {}", linked.len(), install_dir.display());
        Ok(linked)
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_default();
    std::fs::copy(resolved, link).map(|_| ())
}
