//! Build and runtime environment
//!
//! [`BuildEnvironment`] is an immutable snapshot of variables threaded
//! through the pipeline; every subprocess gets its environment from it.
//! [`EnvironmentBuilder`] derives the build-process environment and the
//! `.profile.d` script the application sources at boot.

use crate::error::{RbpackError, RbpackResult};
use crate::layout::BuildLayout;
use crate::version::ResolvedVersions;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Profile script written into the application
pub const PROFILE_SCRIPT: &str = "ruby.sh";

const DEFAULT_LANG: &str = "en_US.UTF-8";
const DEFAULT_JAVA_OPTS: &str = "-Xmx384m -Xss512k -XX:+UseCompressedOops -Dfile.encoding=UTF-8";
const DEFAULT_JRUBY_OPTS: &str = "-Xcompile.invokedynamic=false";

/// Config vars never imported from the env dir
const ENV_DIR_DENYLIST: &[&str] = &[
    "PATH",
    "GIT_DIR",
    "CPATH",
    "CPPATH",
    "LD_PRELOAD",
    "LIBRARY_PATH",
];

/// Immutable set of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Environment from key/value pairs
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Copy with `key` set to `value`
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(key.into(), value.into());
        Self { vars }
    }

    /// Copy with `key` set only if absent
    pub fn with_default(&self, key: &str, value: impl Into<String>) -> Self {
        if self.contains(key) {
            return self.clone();
        }
        self.with(key, value)
    }

    /// Copy without `key`
    pub fn without(&self, key: &str) -> Self {
        let mut vars = self.vars.clone();
        vars.remove(key);
        Self { vars }
    }

    /// Copy with the config vars of an env dir (one file per variable)
    /// layered on top
    pub fn with_env_dir(&self, dir: &Path) -> RbpackResult<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| RbpackError::io(format!("reading env dir {}", dir.display()), e))?;

        let mut vars = self.vars.clone();
        for entry in entries {
            let entry = entry.map_err(|e| RbpackError::io("reading env dir entry", e))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if ENV_DIR_DENYLIST.contains(&name.as_str()) || !entry.path().is_file() {
                continue;
            }
            let value = std::fs::read_to_string(entry.path())
                .map_err(|e| RbpackError::io(format!("reading config var {}", name), e))?;
            debug!("Imported config var {}", name);
            vars.insert(name, value);
        }
        Ok(Self { vars })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// All variables
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

/// How a profile entry treats a value already set at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMode {
    /// Keep an existing value
    Default,
    /// Always assign
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub name: String,
    pub value: String,
    pub mode: ProfileMode,
}

/// Shell fragment exporting the runtime environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileScript {
    entries: Vec<ProfileEntry>,
}

impl ProfileScript {
    fn push(&mut self, name: &str, value: impl Into<String>, mode: ProfileMode) {
        self.entries.push(ProfileEntry {
            name: name.to_string(),
            value: value.into(),
            mode,
        });
    }

    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }

    /// Look up an entry by variable name
    pub fn get(&self, name: &str) -> Option<&ProfileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Render as POSIX shell
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| match entry.mode {
                ProfileMode::Default => format!(
                    "export {name}=\"${{{name}:-{value}}}\"\n",
                    name = entry.name,
                    value = entry.value
                ),
                ProfileMode::Override => format!("export {}=\"{}\"\n", entry.name, entry.value),
            })
            .collect()
    }

    /// Write into `<profile_dir>/ruby.sh`
    pub async fn write(&self, profile_dir: &Path) -> RbpackResult<PathBuf> {
        tokio::fs::create_dir_all(profile_dir)
            .await
            .map_err(|e| RbpackError::io(format!("creating {}", profile_dir.display()), e))?;
        let path = profile_dir.join(PROFILE_SCRIPT);
        tokio::fs::write(&path, self.render())
            .await
            .map_err(|e| RbpackError::io(format!("writing {}", path.display()), e))?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Derives environments from the resolved runtimes
pub struct EnvironmentBuilder<'a> {
    layout: &'a BuildLayout,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(layout: &'a BuildLayout) -> Self {
        Self { layout }
    }

    /// PATH entries ahead of the inherited PATH, relative to the app root
    fn path_entries(versions: &ResolvedVersions) -> Vec<PathBuf> {
        let mut entries = vec![
            PathBuf::from("vendor/bundle/bin"),
            versions.primary.gem_dir().join("bin"),
        ];
        if versions.primary.needs_jvm() {
            entries.push(PathBuf::from("vendor/jvm/bin"));
        }
        entries.push(PathBuf::from("bin"));
        entries
    }

    /// Environment for build-time subprocesses
    pub fn build_process_env(
        &self,
        base: &BuildEnvironment,
        versions: &ResolvedVersions,
    ) -> BuildEnvironment {
        let root = self.layout.build_dir();
        let gem_dir = self.layout.gem_dir(&versions.primary);

        let mut path: Vec<String> = Self::path_entries(versions)
            .iter()
            .map(|p| root.join(p).display().to_string())
            .collect();
        if let Some(existing) = base.get("PATH").filter(|p| !p.is_empty()) {
            path.push(existing.to_string());
        }

        let mut env = base
            .with_default("LANG", DEFAULT_LANG)
            .with("PATH", path.join(":"))
            .with("GEM_PATH", gem_dir.display().to_string())
            .with("GEM_HOME", gem_dir.display().to_string());

        if versions.primary.needs_jvm() {
            env = env
                .with_default("JAVA_OPTS", DEFAULT_JAVA_OPTS)
                .with_default("JRUBY_OPTS", DEFAULT_JRUBY_OPTS)
                .with_default("JAVA_HOME", self.layout.jvm_dir().display().to_string());
        }
        env
    }

    /// Environment exported to the running application
    pub fn build_profile_script(&self, versions: &ResolvedVersions) -> ProfileScript {
        let home = |p: &Path| format!("$HOME/{}", p.display());
        let mut script = ProfileScript::default();

        script.push("LANG", DEFAULT_LANG, ProfileMode::Default);

        let mut path: Vec<String> = Self::path_entries(versions)
            .iter()
            .map(|p| home(p.as_path()))
            .collect();
        path.push("$PATH".to_string());
        script.push("PATH", path.join(":"), ProfileMode::Override);

        script.push(
            "GEM_PATH",
            format!("{}:$GEM_PATH", home(versions.primary.gem_dir().as_path())),
            ProfileMode::Override,
        );

        if versions.primary.needs_jvm() {
            script.push("JAVA_OPTS", DEFAULT_JAVA_OPTS, ProfileMode::Default);
            script.push("JRUBY_OPTS", DEFAULT_JRUBY_OPTS, ProfileMode::Default);
            script.push("JAVA_HOME", "$HOME/vendor/jvm", ProfileMode::Default);
        }
        script
    }
}

/// Removes a process environment variable until dropped
///
/// The previous value is restored on drop, including during unwinding.
#[derive(Debug)]
pub struct ScopedEnvRemoval {
    key: String,
    saved: Option<OsString>,
}

impl ScopedEnvRemoval {
    pub fn remove(key: &str) -> Self {
        let saved = std::env::var_os(key);
        if saved.is_some() {
            debug!("Unsetting {} for the duration of a command", key);
            std::env::remove_var(key);
        }
        Self {
            key: key.to_string(),
            saved,
        }
    }
}

impl Drop for ScopedEnvRemoval {
    fn drop(&mut self) {
        if let Some(value) = self.saved.take() {
            std::env::set_var(&self.key, value);
        }
    }
}
