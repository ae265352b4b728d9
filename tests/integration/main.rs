//! Integration tests for Offcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Binary isolated from the user's real config and state
    fn offcache(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("offcache");
        cmd.env("HOME", home)
            .env("XDG_CONFIG_HOME", home.join("config"))
            .env("XDG_STATE_HOME", home.join("state"))
            .env_remove("OFFCACHE_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Config for a site on a port nothing listens on
    fn write_config(home: &Path) -> PathBuf {
        let path = home.join("offcache.toml");
        let content = format!(
            r#"
[general]
audit_log = false

[worker]
cache_name = "portfolio-v1.0.0"
scope = "http://127.0.0.1:9/"
offline_url = "/"

[manifest]
urls = ["/", "/static/css/style.css"]

[network]
timeout_secs = 5

[storage]
dir = "{}"
"#,
            home.join("caches").display()
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        offcache(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("offline cache manager"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        offcache(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("offcache"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        offcache(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        offcache(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[worker]"))
            .stdout(predicate::str::contains("cache_name"));
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("fresh.toml");
        let path_arg = path.to_str().unwrap();

        offcache(home.path())
            .args(["--config", path_arg, "config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(path.exists());

        offcache(home.path())
            .args(["--config", path_arg, "config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn generations_empty() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "generations"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache generations found"));
    }

    #[test]
    fn fetch_before_install_passes_through() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "fetch", "/"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Not intercepted"));
    }

    #[test]
    fn install_fails_when_site_unreachable() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());
        let config_arg = config.to_str().unwrap();

        offcache(home.path())
            .args(["--config", config_arg, "install"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Install of generation portfolio-v1.0.0 failed"));

        offcache(home.path())
            .args(["--config", config_arg, "generations", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn activate_without_install_fails() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "activate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not installed"));
    }

    #[test]
    fn unknown_message_is_ignored() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "message", r#"{"type":"PING"}"#])
            .assert()
            .success()
            .stdout(predicate::str::contains("Message ignored"));
    }

    #[test]
    fn invalid_message_json_fails() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "message", "not json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not valid JSON"));
    }

    #[test]
    fn push_shows_default_body() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "push"])
            .assert()
            .success()
            .stdout(predicate::str::contains("New update available!"));
    }

    #[test]
    fn explore_click_focuses_open_root() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "click", "explore", "--open", "/"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Notification closed"))
            .stdout(predicate::str::contains("Window focused"));
    }

    #[test]
    fn explore_click_opens_root_window() {
        let home = TempDir::new().unwrap();
        let config = write_config(home.path());

        offcache(home.path())
            .args(["--config", config.to_str().unwrap(), "click", "explore"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Window opened"))
            .stdout(predicate::str::contains("http://127.0.0.1:9/"));
    }

    #[test]
    fn completions_generate() {
        let home = TempDir::new().unwrap();
        offcache(home.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("offcache"));
    }
}
