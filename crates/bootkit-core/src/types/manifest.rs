//! Manifest document and item types

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attempts made for an item that does not set `retries`
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Seconds slept between attempts for an item that does not set `retrywait`
pub const DEFAULT_RETRY_DELAY_SECS: u32 = 5;

/// A provisioning phase, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preflight,
    #[serde(alias = "setup")]
    SetupAssistant,
    Userland,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Preflight, Phase::SetupAssistant, Phase::Userland];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preflight => "preflight",
            Phase::SetupAssistant => "setupassistant",
            Phase::Userland => "userland",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an item is and how it gets executed
///
/// Unknown `type` strings decode into `Unsupported` so that a single bad
/// item is reported as an item failure instead of rejecting the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    Package,
    RootScript,
    UserScript,
    Unsupported(String),
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::Package => "package",
            ItemKind::RootScript => "rootscript",
            ItemKind::UserScript => "userscript",
            ItemKind::Unsupported(other) => other,
        }
    }
}

impl From<String> for ItemKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "package" => ItemKind::Package,
            "rootscript" => ItemKind::RootScript,
            "userscript" => ItemKind::UserScript,
            _ => ItemKind::Unsupported(value),
        }
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work in a manifest phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestItem {
    /// Destination path of the downloaded payload
    pub file: Utf8PathBuf,

    /// Expected SHA-256 hex digest of the payload
    pub hash: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub kind: ItemKind,

    #[serde(
        rename = "packageid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub package_id: Option<String>,

    /// Minimum installed version that satisfies a package item
    #[serde(rename = "version", default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_lenient_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub retries: Option<u32>,

    #[serde(
        rename = "retrywait",
        default,
        deserialize_with = "deserialize_lenient_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_wait: Option<u32>,

    /// Architecture class this item is excluded from ("arm", "intel", ...)
    #[serde(alias = "skipIf", default, skip_serializing_if = "Option::is_none")]
    pub skip_if: Option<String>,

    #[serde(
        alias = "followRedirects",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub follow_redirects: Option<bool>,

    /// Launch detached and report success once spawned
    #[serde(rename = "donotwait", default, skip_serializing_if = "is_false")]
    pub run_async: bool,
}

impl ManifestItem {
    /// Create an item with only the required fields set
    pub fn new(
        file: impl Into<Utf8PathBuf>,
        url: impl Into<String>,
        hash: impl Into<String>,
        kind: ItemKind,
    ) -> Self {
        Self {
            file: file.into(),
            hash: hash.into(),
            url: url.into(),
            name: None,
            kind,
            package_id: None,
            min_version: None,
            retries: None,
            retry_wait: None,
            skip_if: None,
            follow_redirects: None,
            run_async: false,
        }
    }

    /// The label used in logs and progress output
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.file
            .file_name()
            .map_or_else(|| self.file.to_string(), str::to_string)
    }

    /// Number of fetch-and-verify attempts, never less than one
    pub fn retry_count(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRY_COUNT).max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.retry_wait.unwrap_or(DEFAULT_RETRY_DELAY_SECS)))
    }
}

/// The fetched manifest, partitioned by phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preflight: Vec<ManifestItem>,

    #[serde(
        rename = "setupassistant",
        alias = "setup",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub setup: Vec<ManifestItem>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub userland: Vec<ManifestItem>,
}

impl Manifest {
    /// Decode a JSON manifest payload
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::manifest_decode(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Items of a phase in manifest order
    pub fn items(&self, phase: Phase) -> &[ManifestItem] {
        match phase {
            Phase::Preflight => &self.preflight,
            Phase::SetupAssistant => &self.setup,
            Phase::Userland => &self.userland,
        }
    }

    pub fn total_items(&self) -> usize {
        self.preflight.len() + self.setup.len() + self.userland.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

/// Accepts `3` as well as `"3"`
fn deserialize_lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => u32::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("number out of range: {}", n))),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got \"{}\"", s))),
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
