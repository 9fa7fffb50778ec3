//! Host architecture class and the manifest `skip_if` policy

use std::fmt;

use serde::{Deserialize, Serialize};

/// Architecture class of the running machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Arm64,
    X86_64,
}

impl Architecture {
    /// Detect the architecture this binary runs on
    pub fn current() -> Self {
        Self::from_target(std::env::consts::ARCH)
    }

    pub fn from_target(arch: &str) -> Self {
        match arch {
            "aarch64" | "arm64" | "arm" => Architecture::Arm64,
            _ => Architecture::X86_64,
        }
    }

    /// Tag written to status records and the completion marker
    pub fn status_tag(&self) -> &'static str {
        match self {
            Architecture::Arm64 => "ARM64",
            Architecture::X86_64 => "X64",
        }
    }

    /// Whether an item tagged `skip_if = tag` is excluded on this host
    ///
    /// Matching is a case-insensitive substring check against the host's
    /// class: "arm"/"apple_silicon" for Arm64, "x86_64"/"intel" for X86_64.
    pub fn matches_skip_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return false;
        }
        let needles: &[&str] = match self {
            Architecture::Arm64 => &["arm", "apple_silicon"],
            Architecture::X86_64 => &["x86_64", "intel"],
        };
        needles.iter().any(|needle| tag.contains(needle))
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
        }
    }
}
