//! End-to-end configuration layering: defaults < preferences < environment < CLI

use std::env;
use std::fs;

use bootkit_core::types::RunConfig;
use bootkit_core::{ConfigLoader, RunOverrides};
use camino::Utf8PathBuf;
use serial_test::serial;
use tempfile::TempDir;

const PREFS: &str = r#"
ManifestURL: https://prefs.example.com/bootstrap.json
AuthorizationHeader: Basic cHJlZnM=
RetainCache: true
network:
  download_timeout_secs: 300
dialog:
  DialogTitle: Welcome to Example Corp
"#;

fn prefs_file(temp: &TempDir) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(temp.path().join("com.github.bootkit.yaml")).unwrap();
    fs::write(&path, PREFS).unwrap();
    path
}

#[test]
#[serial]
fn test_each_layer_overrides_the_one_below() {
    env::remove_var("BOOTKIT_MANIFEST_URL");
    let temp = TempDir::new().unwrap();
    let loader = ConfigLoader::with_preferences(prefs_file(&temp));

    env::set_var("BOOTKIT_AUTH_HEADER", "Bearer env-token");
    let resolved = loader.load();
    env::remove_var("BOOTKIT_AUTH_HEADER");
    let resolved = resolved.unwrap();

    // preferences over defaults
    assert_eq!(
        resolved.manifest_url.as_deref(),
        Some("https://prefs.example.com/bootstrap.json")
    );
    assert!(resolved.retain_cache);
    assert_eq!(resolved.network.download_timeout_secs, 300);
    assert_eq!(resolved.network.manifest_timeout_secs, 60);
    assert_eq!(resolved.dialog.title, "Welcome to Example Corp");

    // environment over preferences
    assert_eq!(resolved.auth_header.as_deref(), Some("Bearer env-token"));

    // CLI over everything
    let cli = RunOverrides {
        manifest_url: Some("https://cli.example.com/bootstrap.json".to_string()),
        silent: true,
        ..Default::default()
    };
    let config = cli.apply(resolved);
    assert_eq!(
        config.require_manifest_url().unwrap(),
        "https://cli.example.com/bootstrap.json"
    );
    assert!(!config.dialog.enabled);
    assert_eq!(config.base_dir, RunConfig::default().base_dir);
}

#[test]
#[serial]
fn test_no_source_is_configuration_error() {
    env::remove_var("BOOTKIT_MANIFEST_URL");
    let config = ConfigLoader::with_preferences("/nonexistent/bootkit.yaml")
        .load()
        .unwrap();

    let err = config.require_manifest_url().unwrap_err();
    assert!(err.is_configuration_error());
}
