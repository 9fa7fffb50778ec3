//! Layered configuration loader
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. Managed preference file (YAML)
//! 3. Environment variables (BOOTKIT_* prefix)
//! 4. CLI flags (applied by the caller through [`RunOverrides`])

use std::env;
use std::fs;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{Error, Result};
use crate::paths::DEFAULT_PREFERENCES_PATH;
use crate::types::RunConfig;

/// Loads [`RunConfig`] from defaults, the managed preference file and the
/// environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    preferences_path: Utf8PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_preferences(DEFAULT_PREFERENCES_PATH)
    }

    /// Use a specific managed preference file
    pub fn with_preferences(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            preferences_path: path.into(),
        }
    }

    pub fn preferences_path(&self) -> &Utf8Path {
        &self.preferences_path
    }

    /// Resolve configuration from every layer below the CLI
    pub fn load(&self) -> Result<RunConfig> {
        let config = match self.load_preferences()? {
            Some(config) => config,
            None => RunConfig::default(),
        };
        apply_env_overrides(config)
    }

    /// Read the managed preference file, if present
    pub fn load_preferences(&self) -> Result<Option<RunConfig>> {
        if !self.preferences_path.exists() {
            tracing::debug!("No managed preferences at {}", self.preferences_path);
            return Ok(None);
        }

        let content = fs::read_to_string(&self.preferences_path)?;
        if content.trim().is_empty() {
            return Ok(Some(RunConfig::default()));
        }

        let config: RunConfig = serde_yaml_ng::from_str(&content).map_err(|e| {
            Error::invalid_config(format!("Failed to parse {}: {}", self.preferences_path, e))
        })?;
        tracing::debug!("Loaded managed preferences from {}", self.preferences_path);
        Ok(Some(config))
    }

    /// Re-read configuration until a manifest URL appears or `timeout` passes
    ///
    /// Returns `None` on timeout. A preference file that fails to parse is
    /// treated like one that has not arrived yet.
    pub async fn wait_for_managed_config(
        &self,
        timeout: Duration,
        interval: Duration,
    ) -> Option<RunConfig> {
        let start = Instant::now();
        loop {
            match self.load() {
                Ok(config) if config.has_manifest_url() => return Some(config),
                Ok(_) => {}
                Err(e) => tracing::debug!("Managed preferences not usable yet: {}", e),
            }

            if start.elapsed() >= timeout {
                tracing::warn!(
                    "No manifest URL from managed preferences after {}s",
                    timeout.as_secs()
                );
                return None;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `BOOTKIT_*` environment variable overrides
pub fn apply_env_overrides(mut config: RunConfig) -> Result<RunConfig> {
    if let Ok(val) = env::var("BOOTKIT_MANIFEST_URL") {
        config.manifest_url = Some(val);
    }

    if let Ok(val) = env::var("BOOTKIT_AUTH_HEADER") {
        config.auth_header = Some(val);
    }

    if let Ok(val) = env::var("BOOTKIT_BASE_DIR") {
        config.base_dir = Utf8PathBuf::from(val);
    }

    if let Ok(val) = env::var("BOOTKIT_FOLLOW_REDIRECTS") {
        config.follow_redirects = parse_bool("BOOTKIT_FOLLOW_REDIRECTS", &val)?;
    }

    if let Ok(val) = env::var("BOOTKIT_DRY_RUN") {
        config.dry_run = parse_bool("BOOTKIT_DRY_RUN", &val)?;
    }

    if let Ok(val) = env::var("BOOTKIT_REBOOT") {
        config.reboot = parse_bool("BOOTKIT_REBOOT", &val)?;
    }

    if let Ok(val) = env::var("BOOTKIT_RETAIN_CACHE") {
        config.retain_cache = parse_bool("BOOTKIT_RETAIN_CACHE", &val)?;
    }

    if let Ok(val) = env::var("BOOTKIT_MANIFEST_TIMEOUT_SECS") {
        config.network.manifest_timeout_secs = val.parse().map_err(|_| {
            Error::invalid_config("BOOTKIT_MANIFEST_TIMEOUT_SECS must be a valid number")
        })?;
    }

    if let Ok(val) = env::var("BOOTKIT_DOWNLOAD_TIMEOUT_SECS") {
        config.network.download_timeout_secs = val.parse().map_err(|_| {
            Error::invalid_config("BOOTKIT_DOWNLOAD_TIMEOUT_SECS must be a valid number")
        })?;
    }

    Ok(config)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::invalid_config(format!(
            "{} must be a boolean (true/false)",
            name
        ))),
    }
}

/// Values supplied on the command line
///
/// Boolean flags can only switch a setting on; `None` leaves lower layers
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub manifest_url: Option<String>,
    pub auth_header: Option<String>,
    pub base_dir: Option<Utf8PathBuf>,
    pub follow_redirects: bool,
    pub dry_run: bool,
    pub reboot: bool,
    pub userscript_only: bool,
    pub retain_cache: bool,
    pub silent: bool,
    pub verbose: bool,
    pub no_dialog: bool,
    pub dialog_title: Option<String>,
    pub dialog_message: Option<String>,
}

impl RunOverrides {
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(url) = &self.manifest_url {
            config.manifest_url = Some(url.clone());
        }
        if let Some(header) = &self.auth_header {
            config.auth_header = Some(header.clone());
        }
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        config.follow_redirects |= self.follow_redirects;
        config.dry_run |= self.dry_run;
        config.reboot |= self.reboot;
        config.userscript_only |= self.userscript_only;
        config.retain_cache |= self.retain_cache;
        config.silent |= self.silent;
        config.verbose |= self.verbose;
        if self.no_dialog || config.silent {
            config.dialog.enabled = false;
        }
        if let Some(title) = &self.dialog_title {
            config.dialog.title = title.clone();
        }
        if let Some(message) = &self.dialog_message {
            config.dialog.message = message.clone();
        }
        config
    }
}
