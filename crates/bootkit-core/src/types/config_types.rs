//! Resolved run configuration

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::{
    DEFAULT_AGENT_IDENTIFIER, DEFAULT_BASE_DIR, DEFAULT_DAEMON_IDENTIFIER, DEFAULT_INSTALL_PATH,
};

/// The configuration object the orchestrator consumes
///
/// Managed preference files deserialize straight into this type. Historical
/// key spellings are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunConfig {
    #[serde(alias = "url", alias = "jsonurl", alias = "JsonUrl", alias = "ManifestURL")]
    pub manifest_url: Option<String>,

    #[serde(alias = "headers", alias = "AuthorizationHeader")]
    pub auth_header: Option<String>,

    #[serde(alias = "followRedirects", alias = "FollowRedirects")]
    pub follow_redirects: bool,

    #[serde(alias = "dryRun", alias = "DryRun")]
    pub dry_run: bool,

    #[serde(alias = "Reboot")]
    pub reboot: bool,

    #[serde(alias = "userscript", alias = "userScriptOnly")]
    pub userscript_only: bool,

    #[serde(alias = "retainCache", alias = "RetainCache")]
    pub retain_cache: bool,

    pub silent: bool,

    pub verbose: bool,

    #[serde(alias = "baseDir", alias = "InstallPath")]
    pub base_dir: Utf8PathBuf,

    /// Where the bootkit binary lives, used for service registration
    pub install_path: Utf8PathBuf,

    #[serde(alias = "LaunchDaemonIdentifier")]
    pub daemon_identifier: String,

    #[serde(alias = "LaunchAgentIdentifier")]
    pub agent_identifier: String,

    pub reboot_delay_secs: u64,

    /// Skip the userland phase when setup assistant items failed
    pub block_userland_on_setup_failure: bool,

    /// Run userland scripts through `launchctl asuser` as the console user
    pub userscripts_as_console_user: bool,

    pub network: NetworkConfig,

    pub dialog: DialogConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            manifest_url: None,
            auth_header: None,
            follow_redirects: false,
            dry_run: false,
            reboot: false,
            userscript_only: false,
            retain_cache: false,
            silent: false,
            verbose: false,
            base_dir: Utf8PathBuf::from(DEFAULT_BASE_DIR),
            install_path: Utf8PathBuf::from(DEFAULT_INSTALL_PATH),
            daemon_identifier: DEFAULT_DAEMON_IDENTIFIER.to_string(),
            agent_identifier: DEFAULT_AGENT_IDENTIFIER.to_string(),
            reboot_delay_secs: 5,
            block_userland_on_setup_failure: true,
            userscripts_as_console_user: false,
            network: NetworkConfig::default(),
            dialog: DialogConfig::default(),
        }
    }
}

impl RunConfig {
    /// The manifest URL, or a configuration error when none was resolved
    pub fn require_manifest_url(&self) -> Result<&str> {
        match self.manifest_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(Error::NoManifestSource),
        }
    }

    pub fn has_manifest_url(&self) -> bool {
        self.require_manifest_url().is_ok()
    }
}

/// Network timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NetworkConfig {
    pub manifest_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            manifest_timeout_secs: 60,
            download_timeout_secs: 120,
        }
    }
}

/// Progress dialog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DialogConfig {
    pub enabled: bool,
    pub binary: Utf8PathBuf,
    pub command_file: Utf8PathBuf,
    #[serde(alias = "DialogTitle")]
    pub title: String,
    #[serde(alias = "DialogMessage")]
    pub message: String,
    pub icon: Option<String>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: Utf8PathBuf::from("/usr/local/bin/dialog"),
            command_file: Utf8PathBuf::from("/var/tmp/dialog.log"),
            title: "Setting up your Mac".to_string(),
            message: "Please wait while required software is installed.".to_string(),
            icon: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.base_dir, DEFAULT_BASE_DIR);
        assert_eq!(config.network.manifest_timeout_secs, 60);
        assert_eq!(config.network.download_timeout_secs, 120);
        assert!(config.block_userland_on_setup_failure);
        assert!(!config.userscripts_as_console_user);
        assert!(config.dialog.enabled);
    }

    #[test]
    fn test_historical_keys_are_accepted() {
        let yaml = "JsonUrl: https://mdm.example.com/bootstrap.json\nheaders: Basic abc\nfollowRedirects: true\nRetainCache: true\n";
        let config: RunConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(
            config.manifest_url.as_deref(),
            Some("https://mdm.example.com/bootstrap.json")
        );
        assert_eq!(config.auth_header.as_deref(), Some("Basic abc"));
        assert!(config.follow_redirects);
        assert!(config.retain_cache);
        assert_eq!(config.reboot_delay_secs, 5);
    }

    #[test]
    fn test_require_manifest_url() {
        let mut config = RunConfig::default();
        assert!(matches!(
            config.require_manifest_url(),
            Err(Error::NoManifestSource)
        ));

        config.manifest_url = Some("   ".to_string());
        assert!(!config.has_manifest_url());

        config.manifest_url = Some("https://x/m.json".to_string());
        assert_eq!(config.require_manifest_url().unwrap(), "https://x/m.json");
    }
}
