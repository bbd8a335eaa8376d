//! Integration tests for the rbpack binary

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn rbpack() -> Command {
        let mut cmd = cargo_bin_cmd!("rbpack");
        cmd.env_remove("RBPACK_CONFIG")
            .env_remove("RUST_LOG")
            .env_remove("STACK")
            .env("CI", "1");
        cmd
    }

    fn app(lockfile: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Gemfile"), "source 'https://rubygems.org'\n").unwrap();
        if lockfile {
            std::fs::write(dir.path().join("Gemfile.lock"), "GEM\n  specs:\n").unwrap();
        }
        dir
    }

    #[test]
    fn help_displays() {
        rbpack()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Ruby application build pipeline"));
    }

    #[test]
    fn version_displays() {
        rbpack()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rbpack"));
    }

    #[test]
    fn detect_ruby_app() {
        let dir = app(false);
        rbpack()
            .args(["detect"])
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::diff("Ruby\n"));
    }

    #[test]
    fn detect_rejects_other_apps() {
        let dir = TempDir::new().unwrap();
        rbpack()
            .args(["detect"])
            .arg(dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("No Gemfile found"));
    }

    #[test]
    fn build_without_lockfile_fails_with_hint() {
        let dir = app(false);
        let cache = TempDir::new().unwrap();
        rbpack()
            .arg("build")
            .arg(dir.path())
            .arg(cache.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Gemfile.lock required"))
            .stderr(predicate::str::contains("Hint:"));
        assert!(!dir.path().join("vendor").exists());
    }

    #[test]
    fn build_rejects_invalid_app_config() {
        let dir = app(true);
        std::fs::write(dir.path().join("rbpack.toml"), "[runtime\n").unwrap();
        let cache = TempDir::new().unwrap();
        rbpack()
            .arg("build")
            .arg(dir.path())
            .arg(cache.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn build_missing_dir() {
        let cache = TempDir::new().unwrap();
        rbpack()
            .args(["build", "/nonexistent/rbpack-app"])
            .arg(cache.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn config_path() {
        rbpack()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_path_honors_env() {
        rbpack()
            .env("RBPACK_CONFIG", "/etc/rbpack/custom.toml")
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/etc/rbpack/custom.toml"));
    }

    #[test]
    fn config_show_includes_app_config() {
        let dir = app(true);
        std::fs::write(
            dir.path().join("rbpack.toml"),
            "[bundler]\nwithout = \"development:test:ci\"\n",
        )
        .unwrap();
        rbpack()
            .args(["config", "show", "--build-dir"])
            .arg(dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("[runtime]"))
            .stdout(predicate::str::contains("development:test:ci"));
    }

    #[test]
    fn cache_info_empty() {
        let cache = TempDir::new().unwrap();
        rbpack()
            .args(["cache", "info"])
            .arg(cache.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("No build has been cached here yet"));
    }

    #[test]
    fn cache_info_json() {
        let cache = TempDir::new().unwrap();
        let output = rbpack()
            .args(["cache", "info", "--format", "json"])
            .arg(cache.path())
            .output()
            .unwrap();
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(value["fingerprint"].is_null());
        assert_eq!(value["paths"][0]["path"], "vendor/bundle");
    }

    #[test]
    fn cache_clear_yes() {
        let cache = TempDir::new().unwrap();
        std::fs::create_dir_all(cache.path().join("vendor/bundle/ruby")).unwrap();
        std::fs::create_dir_all(cache.path().join("vendor/heroku")).unwrap();
        std::fs::write(cache.path().join("vendor/heroku/ruby_version"), "ruby-3.2.4").unwrap();

        rbpack()
            .args(["cache", "clear", "--yes"])
            .arg(cache.path())
            .assert()
            .success();

        assert!(!cache.path().join("vendor/bundle").exists());
        assert!(!cache.path().join("vendor/heroku").exists());
    }

    #[test]
    fn cache_clear_without_confirmation_keeps_cache() {
        let cache = TempDir::new().unwrap();
        std::fs::create_dir_all(cache.path().join("vendor/bundle")).unwrap();

        rbpack()
            .args(["cache", "clear"])
            .arg(cache.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted"));

        assert!(cache.path().join("vendor/bundle").exists());
    }

    #[test]
    fn completions_bash() {
        rbpack()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("rbpack"));
    }
}
