//! End-to-end pipeline tests against fake artifact sources and a fake Bundler

use async_trait::async_trait;
use rbpack::cache::{CacheDecision, PurgeReason};
use rbpack::config::Config;
use rbpack::env::BuildEnvironment;
use rbpack::error::{RbpackError, RbpackResult};
use rbpack::exec::{CommandOutput, CommandRunner, CommandSpec};
use rbpack::fetch::{FetchOutcome, Fetcher};
use rbpack::layout::BuildLayout;
use rbpack::lockfile::BuildPlatform;
use rbpack::pipeline::{BuildReport, Collaborators, Pipeline};
use rbpack::store::{keys, DirCacheStore, DirMetadataStore, METADATA_DIR};
use rbpack::version::{VersionSource, CATALOG_NAME};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const CATALOG: &str = r#"["ruby-1.8.7-p374", "ruby-1.9.2", "ruby-2.7.8", "ruby-3.2.4",
    "ruby-2.5.7-jruby-9.2.13.0"]"#;

const LINUX_LOCKFILE: &str = "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (3.0.8)\n\n\
PLATFORMS\n  ruby\n  x86_64-linux\n\nDEPENDENCIES\n  rack\n\n\
RUBY VERSION\n   ruby 3.2.4p170\n\nBUNDLED WITH\n   2.5.11\n";

type Calls = Arc<Mutex<Vec<String>>>;

/// Serves the catalog and unpacks fake artifacts with a `bin/` dir
struct FakeFetcher {
    calls: Calls,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, name: &str) -> RbpackResult<Vec<u8>> {
        self.calls.lock().unwrap().push(name.to_string());
        match name {
            CATALOG_NAME => Ok(CATALOG.as_bytes().to_vec()),
            other => Err(RbpackError::Internal(format!("unexpected fetch of {}", other))),
        }
    }

    async fn fetch_and_unpack(&self, name: &str, dest: &Path) -> RbpackResult<FetchOutcome> {
        self.calls.lock().unwrap().push(name.to_string());
        if let Some(bundler) = name.strip_prefix("bundler/") {
            let version = bundler.trim_end_matches(".tgz");
            std::fs::create_dir_all(dest.join("gems").join(version)).unwrap();
        } else if name.contains("libyaml") {
            std::fs::create_dir_all(dest.join("include")).unwrap();
            std::fs::create_dir_all(dest.join("lib")).unwrap();
        } else if name.starts_with("openjdk") {
            std::fs::create_dir_all(dest.join("bin")).unwrap();
            std::fs::write(dest.join("bin/java"), "").unwrap();
        } else {
            std::fs::create_dir_all(dest.join("bin")).unwrap();
            let executable = if name.contains("jruby") { "jruby" } else { "ruby" };
            std::fs::write(dest.join("bin").join(executable), "").unwrap();
            std::fs::write(dest.join("bin/irb"), "").unwrap();
        }
        Ok(FetchOutcome::Unpacked)
    }

    fn source_name(&self) -> String {
        "fake".to_string()
    }
}

/// Answers runtime probes and plays Bundler
struct FakeRunner {
    specs: Arc<Mutex<Vec<CommandSpec>>>,
    install_failure: Option<String>,
}

impl FakeRunner {
    /// `ruby -v` without the install path, like the real interpreter
    fn describe(program: &str) -> String {
        let runtime = Path::new(program)
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{} (fake)", runtime)
    }

    fn bundle_install(&self, spec: &CommandSpec) -> CommandOutput {
        if let Some(ref output) = self.install_failure {
            return CommandOutput::failed(5, output.clone());
        }
        let app = spec.cwd.clone().unwrap();
        std::fs::create_dir_all(app.join("vendor/bundle/ruby/3.2.0/gems/rack-3.0.8")).unwrap();
        let lockfile = app.join("Gemfile.lock");
        if !lockfile.exists() {
            std::fs::write(
                &lockfile,
                "GEM\n  specs:\n    rack (3.0.8)\n\nPLATFORMS\n  x86_64-linux\n\nBUNDLED WITH\n   2.5.11\n",
            )
            .unwrap();
        }
        CommandOutput::ok("Bundle complete! 1 Gemfile dependency, 1 gem now installed.\n")
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> RbpackResult<CommandOutput> {
        self.specs.lock().unwrap().push(spec.clone());
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        Ok(match (spec.program.as_str(), args.as_slice()) {
            ("bundle", ["install", ..]) => self.bundle_install(spec),
            ("bundle", ["clean"]) => CommandOutput::ok(""),
            (program, ["-v"]) => CommandOutput::ok(Self::describe(program)),
            (_, ["-S", "gem", "--version"]) => CommandOutput::ok("3.4.19\n"),
            (program, _) => CommandOutput::failed(127, format!("{}: not found", program)),
        })
    }

    async fn run_streaming(&self, spec: &CommandSpec) -> RbpackResult<CommandOutput> {
        self.run(spec).await
    }
}

/// One application with its cache, built any number of times
struct App {
    dir: TempDir,
    fetches: Calls,
    jvm_fetches: Calls,
    specs: Arc<Mutex<Vec<CommandSpec>>>,
    install_failure: Option<String>,
    env: BuildEnvironment,
}

impl App {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        std::fs::create_dir_all(dir.path().join("cache")).unwrap();
        std::fs::write(dir.path().join("build/Gemfile"), "source 'https://rubygems.org'\ngem 'rack'\n")
            .unwrap();
        Self {
            dir,
            fetches: Calls::default(),
            jvm_fetches: Calls::default(),
            specs: Arc::default(),
            install_failure: None,
            env: BuildEnvironment::from_vars([("PATH", "/usr/local/bin:/usr/bin:/bin")]),
        }
    }

    fn with_lockfile(self, contents: &str) -> Self {
        std::fs::write(self.build_dir().join("Gemfile.lock"), contents).unwrap();
        self
    }

    fn build_dir(&self) -> PathBuf {
        self.dir.path().join("build")
    }

    fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn scratch_dir(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    fn fetched(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    fn bundle_installs(&self) -> Vec<CommandSpec> {
        self.specs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.program == "bundle" && s.args.first().map(String::as_str) == Some("install"))
            .cloned()
            .collect()
    }

    async fn build(&self) -> RbpackResult<BuildReport> {
        let layout = BuildLayout::with_scratch_dir(self.build_dir(), self.cache_dir(), self.scratch_dir());
        let collaborators = Collaborators {
            runtime_fetcher: Box::new(FakeFetcher {
                calls: self.fetches.clone(),
            }),
            vm_fetcher: Box::new(FakeFetcher {
                calls: self.jvm_fetches.clone(),
            }),
            runner: Box::new(FakeRunner {
                specs: self.specs.clone(),
                install_failure: self.install_failure.clone(),
            }),
            cache: Box::new(DirCacheStore::new(layout.build_dir(), layout.cache_dir())),
            metadata: Box::new(DirMetadataStore::new(layout.metadata_dir())),
        };
        Pipeline::new(Config::default(), layout, self.env.clone(), collaborators)
            .with_platform(BuildPlatform::new("x86_64", "linux"))
            .run()
            .await
    }
}

mod manifest {
    use super::*;

    #[tokio::test]
    async fn missing_lockfile_aborts_before_any_fetch() {
        let app = App::new();

        let err = app.build().await.unwrap_err();

        assert!(matches!(err, RbpackError::MissingManifest));
        assert!(err.to_string().contains("Gemfile.lock required"));
        assert!(app.fetched().is_empty());
        assert!(app.jvm_fetches.lock().unwrap().is_empty());
        assert!(!app.build_dir().join("vendor").exists());
    }

    #[tokio::test]
    async fn foreign_platform_lockfile_is_regenerated() {
        let app = App::new().with_lockfile(
            "GEM\n  specs:\n    rack (3.0.8)\n\nPLATFORMS\n  x64-mingw32\n\nRUBY VERSION\n   ruby 3.2.4p170\n",
        );

        let report = app.build().await.unwrap();

        assert!(!report.deployment);
        assert!(report.lockfile_regenerated);
        let installs = app.bundle_installs();
        assert_eq!(installs.len(), 1);
        assert!(!installs[0].args.contains(&"--deployment".to_string()));

        let lockfile = std::fs::read_to_string(app.build_dir().join("Gemfile.lock")).unwrap();
        assert!(lockfile.contains("x86_64-linux"));
        assert!(!lockfile.contains("mingw"));
        assert!(report.warnings.iter().any(|w| w.contains("regenerated")));
    }

    #[tokio::test]
    async fn compatible_lockfile_installs_in_deployment_mode() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);

        let report = app.build().await.unwrap();

        assert!(report.deployment);
        assert!(!report.lockfile_regenerated);
        assert_eq!(report.bundled_with.as_deref(), Some("2.5.11"));
        assert!(app.bundle_installs()[0].args.contains(&"--deployment".to_string()));
        let cleaned = app
            .specs
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.program == "bundle" && s.args == ["clean"]);
        assert!(cleaned);
    }
}

mod versions {
    use super::*;

    #[tokio::test]
    async fn declared_version_is_installed_and_linked() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);

        let report = app.build().await.unwrap();

        assert_eq!(report.ruby_version, "ruby-3.2.4");
        assert_eq!(report.source, VersionSource::ExplicitDeclaration);
        assert_eq!(report.bootstrap_version, None);
        assert!(report.fetched.contains(&"heroku-22/ruby-3.2.4.tgz".to_string()));

        let link = std::fs::read_link(app.build_dir().join("bin/ruby")).unwrap();
        assert_eq!(link, PathBuf::from("../vendor/ruby-3.2.4/bin/ruby"));
    }

    #[tokio::test]
    async fn undeclared_version_falls_back_to_default_quietly() {
        let app = App::new().with_lockfile("GEM\n  specs:\n\nPLATFORMS\n  ruby\n");

        let report = app.build().await.unwrap();

        assert_eq!(report.ruby_version, "ruby-3.2.4");
        assert_eq!(report.source, VersionSource::Default);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn undeclared_version_keeps_previous_build() {
        let app = App::new().with_lockfile("GEM\n  specs:\n\nPLATFORMS\n  ruby\n");
        app.build().await.unwrap();

        let report = app.build().await.unwrap();

        assert_eq!(report.source, VersionSource::LegacyFile);
        assert_eq!(report.ruby_version, "ruby-3.2.4");
        assert!(report.warnings.iter().any(|w| w.contains("previous build")));
    }

    #[tokio::test]
    async fn environment_override_beats_lockfile() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.env = app.env.with("RUBY_VERSION", "ruby-2.7.8");

        let report = app.build().await.unwrap();

        assert_eq!(report.ruby_version, "ruby-2.7.8");
        assert_eq!(report.source, VersionSource::EnvironmentOverride);
        assert!(report.warnings.iter().any(|w| w.contains("deprecated")));
    }

    #[tokio::test]
    async fn unpublished_version_lists_valid_ones() {
        let app = App::new().with_lockfile("GEM\n  specs:\n\nRUBY VERSION\n   ruby 9.9.9p0\n");

        let err = app.build().await.unwrap_err();

        assert!(matches!(err, RbpackError::InvalidVersion { .. }));
        assert!(err.to_string().contains("ruby-9.9.9"));
        assert!(err.to_string().contains("ruby-3.2.4"));
    }

    #[tokio::test]
    async fn unprefixed_override_lists_valid_ones() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.env = app.env.with("RUBY_VERSION", "2.7.8");

        let err = app.build().await.unwrap_err();

        match &err {
            RbpackError::InvalidVersion { version, valid } => {
                assert_eq!(version, "2.7.8");
                assert!(valid.contains(&"ruby-2.7.8".to_string()));
            }
            other => panic!("expected invalid version, got {:?}", other),
        }
        assert!(err.hint().is_some());
        assert!(app.bundle_installs().is_empty());
    }

    #[tokio::test]
    async fn corrupt_recorded_version_lists_valid_ones() {
        let app = App::new().with_lockfile("GEM\n  specs:\n\nPLATFORMS\n  x86_64-linux\n");
        let meta = app.cache_dir().join(METADATA_DIR);
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(meta.join(keys::RUBY_VERSION), "ruby-two\n").unwrap();

        let err = app.build().await.unwrap_err();

        assert!(matches!(err, RbpackError::InvalidVersion { ref version, .. } if version == "ruby-two"));
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn legacy_runtime_builds_with_bootstrap() {
        let app = App::new().with_lockfile("GEM\n  specs:\n\nRUBY VERSION\n   ruby 1.8.7p374\n");

        let report = app.build().await.unwrap();

        assert_eq!(report.ruby_version, "ruby-1.8.7-p374");
        assert_eq!(report.bootstrap_version.as_deref(), Some("ruby-1.9.2"));
        assert_eq!(
            report.fetched,
            vec![
                "heroku-22/ruby-1.9.2.tgz".to_string(),
                "heroku-22/ruby-1.8.7-p374.tgz".to_string(),
            ]
        );

        // Bootstrap tools are reachable but never shadow the app's runtime
        let install = &app.bundle_installs()[0];
        let path = install.env.get("PATH").unwrap();
        assert!(path.ends_with(&format!("{}/ruby-1.9.2/bin", app.scratch_dir().display())));
        let link = std::fs::read_link(app.build_dir().join("bin/ruby")).unwrap();
        assert_eq!(link, PathBuf::from("../vendor/ruby-1.8.7-p374/bin/ruby"));

        assert!(!app.scratch_dir().exists());
    }

    #[tokio::test]
    async fn jruby_installs_jvm_from_its_own_source() {
        let app = App::new().with_lockfile(
            "GEM\n  specs:\n\nPLATFORMS\n  java\n\nRUBY VERSION\n   ruby 2.5.7p0 (jruby 9.2.13.0)\n",
        );

        let report = app.build().await.unwrap();

        assert_eq!(report.ruby_version, "ruby-2.5.7-jruby-9.2.13.0");
        assert!(report.deployment);
        assert_eq!(
            *app.jvm_fetches.lock().unwrap(),
            vec!["openjdk1.8.tar.gz".to_string()]
        );
        assert!(app.build_dir().join("vendor/jvm/bin/java").exists());

        let profile = std::fs::read_to_string(&report.profile_script).unwrap();
        assert!(profile.contains("JAVA_OPTS"));
        assert!(profile.contains("vendor/jvm/bin"));
    }
}

mod environment {
    use super::*;

    #[tokio::test]
    async fn profile_script_describes_runtime_environment() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);

        let report = app.build().await.unwrap();

        assert_eq!(report.profile_script, app.build_dir().join(".profile.d/ruby.sh"));
        let profile = std::fs::read_to_string(&report.profile_script).unwrap();
        assert!(profile.contains("export GEM_PATH="));
        assert!(profile.contains("export LANG=\"${LANG:-en_US.UTF-8}\""));
        assert!(profile.contains("$HOME/vendor/bundle/bin"));
        // Build-time absolute paths never leak into the runtime environment
        assert!(!profile.contains(&app.build_dir().display().to_string()));
    }

    #[tokio::test]
    async fn bundler_runs_with_explicit_environment() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.env = app.env.with("BUNDLE_WITHOUT", "development:test:ci");

        app.build().await.unwrap();

        let install = &app.bundle_installs()[0];
        let without = install.args.iter().position(|a| a == "--without").unwrap();
        assert_eq!(install.args[without + 1], "development:test:ci");
        assert!(install.env.contains_key("GEM_HOME"));
        assert!(install.env.get("CPATH").unwrap().contains("libyaml/include"));
        assert!(!install.env.contains_key("GIT_DIR"));
        assert_eq!(install.cwd.as_deref(), Some(app.build_dir().as_path()));
    }
}

mod cache {
    use super::*;

    fn fingerprint_path(app: &App) -> PathBuf {
        app.cache_dir().join(METADATA_DIR).join(keys::FINGERPRINT)
    }

    #[tokio::test]
    async fn second_identical_build_keeps_cache_without_refetching() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);
        let first = app.build().await.unwrap();
        assert_eq!(first.cache, CacheDecision::Kept);
        app.fetches.lock().unwrap().clear();

        let second = app.build().await.unwrap();

        assert_eq!(second.cache, CacheDecision::Kept);
        assert!(second.fetched.is_empty());
        let unpacked: Vec<String> = app
            .fetched()
            .into_iter()
            .filter(|name| name != CATALOG_NAME)
            .collect();
        // Only the per-build libyaml helper is unpacked again
        assert_eq!(unpacked, vec!["heroku-22/libyaml-0.1.7.tgz".to_string()]);
    }

    #[tokio::test]
    async fn successful_build_persists_bundle_and_fingerprint() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);

        app.build().await.unwrap();

        assert!(app.cache_dir().join("vendor/bundle/ruby/3.2.0/gems/rack-3.0.8").is_dir());
        assert!(fingerprint_path(&app).is_file());
        let meta = app.cache_dir().join(METADATA_DIR);
        assert_eq!(
            std::fs::read_to_string(meta.join(keys::BUNDLER_VERSION)).unwrap(),
            "2.5.11"
        );
        assert!(meta.join(keys::BUILD_MARKER).is_file());
    }

    #[tokio::test]
    async fn fresh_build_dir_restores_cached_gems() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.build().await.unwrap();

        std::fs::remove_dir_all(app.build_dir().join("vendor")).unwrap();
        let report = app.build().await.unwrap();

        assert_eq!(report.cache, CacheDecision::Kept);
        assert!(app.build_dir().join("vendor/bundle/ruby/3.2.0/gems/rack-3.0.8").is_dir());
    }

    #[tokio::test]
    async fn runtime_change_purges_cached_gems() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.build().await.unwrap();
        std::fs::write(app.build_dir().join("vendor/bundle/stale.gem"), "old").unwrap();
        std::fs::write(app.cache_dir().join("vendor/bundle/stale.gem"), "old").unwrap();

        std::fs::write(
            app.build_dir().join("Gemfile.lock"),
            LINUX_LOCKFILE.replace("ruby 3.2.4p170", "ruby 2.7.8p225"),
        )
        .unwrap();
        let report = app.build().await.unwrap();

        match &report.cache {
            CacheDecision::Purged(PurgeReason::RuntimesChanged { previous, current }) => {
                assert_eq!(previous, &vec!["ruby-3.2.4 (fake)".to_string()]);
                assert_eq!(current, &vec!["ruby-2.7.8 (fake)".to_string()]);
            }
            other => panic!("expected purge, got {:?}", other),
        }
        assert!(!app.build_dir().join("vendor/bundle/stale.gem").exists());
        assert!(!app.cache_dir().join("vendor/bundle/stale.gem").exists());
        assert!(report.warnings.iter().any(|w| w.contains("Purged cached gems")));
    }

    #[tokio::test]
    async fn first_build_keeps_app_shipped_bundle() {
        let app = App::new().with_lockfile(LINUX_LOCKFILE);
        let vendored = app.build_dir().join("vendor/bundle/ruby/3.2.0/gems/mygem-1.0");
        std::fs::create_dir_all(&vendored).unwrap();

        let report = app.build().await.unwrap();

        assert_eq!(report.cache, CacheDecision::Kept);
        assert!(vendored.is_dir());
        assert!(!report.warnings.iter().any(|w| w.contains("Purged")));
    }

    #[tokio::test]
    async fn failed_install_leaves_previous_fingerprint() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.build().await.unwrap();
        let before = std::fs::read(fingerprint_path(&app)).unwrap();

        app.install_failure = Some("Could not reach rubygems.org".to_string());
        std::fs::write(
            app.build_dir().join("Gemfile.lock"),
            LINUX_LOCKFILE.replace("ruby 3.2.4p170", "ruby 2.7.8p225"),
        )
        .unwrap();
        assert!(app.build().await.is_err());

        assert_eq!(std::fs::read(fingerprint_path(&app)).unwrap(), before);
        assert!(!app.scratch_dir().exists());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn disallowed_native_extension_gets_remediation() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.install_failure = Some(
            "Installing sqlite3 1.4.2 with native extensions\n\
             An error occurred while installing sqlite3 (1.4.2), and Bundler cannot continue."
                .to_string(),
        );

        let err = app.build().await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("An error occurred while installing sqlite3 (1.4.2)"));
        assert!(message.contains("Detected sqlite3 gem which is not supported"));
        assert!(err.hint().is_some());
    }

    #[tokio::test]
    async fn long_install_output_is_reported_whole() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        let mut output = String::from("Fetching gem metadata from https://rubygems.org/\n");
        for i in 0..80 {
            output.push_str(&format!("Installing gem-{} 1.0.{}\n", i, i));
        }
        output.push_str("Could not find gem 'rails'\n");
        app.install_failure = Some(output);

        let err = app.build().await.unwrap_err();

        match err {
            RbpackError::DependencyInstall { output, .. } => {
                assert_eq!(output.lines().count(), 82);
                assert!(output.starts_with("Fetching gem metadata"));
                assert!(output.ends_with("Could not find gem 'rails'"));
            }
            other => panic!("expected dependency install error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn plain_install_failure_has_no_remediation() {
        let mut app = App::new().with_lockfile(LINUX_LOCKFILE);
        app.install_failure = Some("Could not find gem 'rails'".to_string());

        let err = app.build().await.unwrap_err();

        match err {
            RbpackError::DependencyInstall { output, remediation } => {
                assert!(output.contains("Could not find gem 'rails'"));
                assert!(remediation.is_none());
            }
            other => panic!("expected dependency install error, got {:?}", other),
        }
    }
}
