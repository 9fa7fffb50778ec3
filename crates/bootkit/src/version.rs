//! Build identity reported by `bootkit version` and recorded in status

use bootkit_core::Architecture;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    /// Short commit hash, when the build exported `GIT_SHA`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Architecture tag as written to status records
    pub architecture: String,
    pub os: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: bootkit_core::VERSION.to_string(),
            commit: option_env!("GIT_SHA").map(str::to_string),
            architecture: Architecture::current().status_tag().to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bootkit {}", self.version)?;
        if let Some(commit) = &self.commit {
            write!(f, " ({})", commit)?;
        }
        write!(f, " {}/{}", self.os, self.architecture)
    }
}
