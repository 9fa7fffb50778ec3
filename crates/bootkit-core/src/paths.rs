//! On-disk layout under the bootkit base directory

use camino::{Utf8Path, Utf8PathBuf};

pub const DEFAULT_BASE_DIR: &str = "/Library/Managed Bootstrap";
pub const DEFAULT_PREFERENCES_PATH: &str = "/Library/Managed Preferences/com.github.bootkit.yaml";
pub const DEFAULT_INSTALL_PATH: &str = "/usr/local/bin/bootkit";
pub const DEFAULT_DAEMON_IDENTIFIER: &str = "com.github.bootkit";
pub const DEFAULT_AGENT_IDENTIFIER: &str = "com.github.bootkit.agent";

/// Text format for timestamps in status records and the completion marker
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Paths derived from the base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base: Utf8PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<Utf8PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    pub fn logs_dir(&self) -> Utf8PathBuf {
        self.base.join("logs")
    }

    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.base.join("cache")
    }

    /// Structured status record
    pub fn status_file(&self) -> Utf8PathBuf {
        self.base.join("status.yaml")
    }

    /// Machine-readable status companion
    pub fn status_json_file(&self) -> Utf8PathBuf {
        self.base.join("status.json")
    }

    pub fn completion_marker(&self) -> Utf8PathBuf {
        self.base.join("last_run.yaml")
    }

    /// Log file for a session started at `stamp` (`yyyy-MM-dd-HHmmss`)
    pub fn session_log_file(&self, stamp: &str) -> Utf8PathBuf {
        self.logs_dir().join(format!("{}.log", stamp))
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}
