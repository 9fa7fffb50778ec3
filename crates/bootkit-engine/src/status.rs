//! Persisted phase status and the completion marker
//!
//! The status document is one in-memory model written to two files: a YAML
//! record and a JSON companion for external tooling. Both are rewritten in
//! full on every transition through a temp file and rename.

use std::fs;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use bootkit_core::paths::TIMESTAMP_FORMAT;
use bootkit_core::types::Phase;
use bootkit_core::{Architecture, Paths};
use camino::Utf8Path;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle stage of a phase record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Starting,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Starting => "starting",
            Stage::Running => "running",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
            Stage::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one phase in the most recent run that reached it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub stage: Stage,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub completion_time: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub version: String,
    pub architecture: String,
    #[serde(default)]
    pub bootstrap_url: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub run_id: String,
}

/// The full status collection, keyed by phase name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight: Option<PhaseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setupassistant: Option<PhaseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userland: Option<PhaseRecord>,
}

impl StatusDocument {
    pub fn get(&self, phase: Phase) -> Option<&PhaseRecord> {
        match phase {
            Phase::Preflight => self.preflight.as_ref(),
            Phase::SetupAssistant => self.setupassistant.as_ref(),
            Phase::Userland => self.userland.as_ref(),
        }
    }

    fn slot(&mut self, phase: Phase) -> &mut Option<PhaseRecord> {
        match phase {
            Phase::Preflight => &mut self.preflight,
            Phase::SetupAssistant => &mut self.setupassistant,
            Phase::Userland => &mut self.userland,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &PhaseRecord> {
        [&self.preflight, &self.setupassistant, &self.userland]
            .into_iter()
            .flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.records().next().is_none()
    }
}

/// Durable evidence of the last fully successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub last_run_version: String,
    pub last_updated: String,
    pub architecture: String,
}

/// Reads and writes status records for one run
pub struct StatusStore {
    paths: Paths,
    run_id: String,
    version: String,
    architecture: Architecture,
    bootstrap_url: Option<String>,
}

impl StatusStore {
    /// Create a store for a new run with a fresh run identifier
    pub fn new(paths: Paths, architecture: Architecture) -> Self {
        Self {
            paths,
            run_id: Uuid::new_v4().to_string(),
            version: bootkit_core::VERSION.to_string(),
            architecture,
            bootstrap_url: None,
        }
    }

    pub fn with_bootstrap_url(mut self, url: Option<String>) -> Self {
        self.bootstrap_url = url;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Load the persisted document; a missing file yields an empty one
    pub fn load(&self) -> Result<StatusDocument> {
        let path = self.paths.status_file();
        if !path.exists() {
            return Ok(StatusDocument::default());
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
        if content.trim().is_empty() {
            return Ok(StatusDocument::default());
        }
        serde_yaml_ng::from_str(&content).with_context(|| format!("Failed to parse {}", path))
    }

    /// Record a phase transition
    ///
    /// Write failures are logged and otherwise ignored.
    pub fn record_transition(
        &self,
        phase: Phase,
        stage: Stage,
        exit_code: Option<i32>,
        error: Option<&str>,
    ) {
        if let Err(e) = self.try_record_transition(phase, stage, exit_code, error) {
            warn!("Failed to record {} {} status: {:#}", phase, stage, e);
        }
    }

    /// Record a phase transition, surfacing write failures
    pub fn try_record_transition(
        &self,
        phase: Phase,
        stage: Stage,
        exit_code: Option<i32>,
        error: Option<&str>,
    ) -> Result<()> {
        let mut document = self.load().unwrap_or_else(|e| {
            warn!("Discarding unreadable status record: {:#}", e);
            StatusDocument::default()
        });

        let now = timestamp();
        let previous_start = document
            .get(phase)
            .filter(|r| r.run_id == self.run_id)
            .and_then(|r| r.start_time.clone());

        let (start_time, completion_time) = if stage.is_terminal() {
            (previous_start.or_else(|| Some(now.clone())), Some(now))
        } else {
            (previous_start.or(Some(now)), None)
        };

        *document.slot(phase) = Some(PhaseRecord {
            phase,
            stage,
            start_time,
            completion_time,
            exit_code,
            version: self.version.clone(),
            architecture: self.architecture.status_tag().to_string(),
            bootstrap_url: self.bootstrap_url.clone(),
            last_error: error.map(str::to_string),
            run_id: self.run_id.clone(),
        });

        debug!("Recording {} -> {}", phase, stage);
        self.save(&document)
    }

    /// Write both representations of `document`
    ///
    /// Each file is attempted even when the other fails.
    pub fn save(&self, document: &StatusDocument) -> Result<()> {
        let yaml = serde_yaml_ng::to_string(document).context("Failed to serialize status")?;
        let json = serde_json::to_string_pretty(document).context("Failed to serialize status")?;

        let yaml_result = write_atomic(&self.paths.status_file(), yaml.as_bytes());
        let json_result = write_atomic(&self.paths.status_json_file(), json.as_bytes());

        if let Err(e) = &json_result {
            warn!("Failed to write {}: {:#}", self.paths.status_json_file(), e);
        }
        yaml_result.and(json_result)
    }

    /// Read the completion marker, if one was written
    pub fn completion_marker(&self) -> Option<CompletionMarker> {
        let path = self.paths.completion_marker();
        let content = fs::read_to_string(&path).ok()?;
        match serde_yaml_ng::from_str(&content) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!("Ignoring unreadable completion marker {}: {}", path, e);
                None
            }
        }
    }

    /// Version recorded by the last fully successful run
    pub fn last_successful_run_marker(&self) -> Option<String> {
        self.completion_marker().map(|m| m.last_run_version)
    }

    /// Whether a run of `version` already completed successfully
    pub fn has_completed(&self, version: &str) -> bool {
        self.last_successful_run_marker()
            .is_some_and(|v| bootkit_core::version::compare_versions(&v, version).is_eq())
    }

    pub fn write_completion_marker(&self) -> Result<()> {
        let marker = CompletionMarker {
            last_run_version: self.version.clone(),
            last_updated: timestamp(),
            architecture: self.architecture.status_tag().to_string(),
        };
        let yaml = serde_yaml_ng::to_string(&marker).context("Failed to serialize marker")?;
        write_atomic(&self.paths.completion_marker(), yaml.as_bytes())
    }

    /// Remove finished phase records completed more than `age` ago
    ///
    /// Returns the number of records removed.
    pub fn cleanup_older_than(&self, age: Duration) -> Result<usize> {
        let mut document = self.load()?;
        let age = chrono::Duration::from_std(age).context("Retention age out of range")?;
        let cutoff = Local::now().naive_local() - age;

        let mut removed = 0;
        for phase in Phase::ALL {
            let slot = document.slot(phase);
            let expired = slot.as_ref().is_some_and(|record| {
                record.stage != Stage::Running
                    && record
                        .completion_time
                        .as_deref()
                        .and_then(parse_timestamp)
                        .is_some_and(|completed| completed < cutoff)
            });
            if expired {
                *slot = None;
                removed += 1;
            }
        }

        if removed > 0 {
            self.save(&document)?;
        }
        Ok(removed)
    }
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent))?;

    let mut file =
        NamedTempFile::new_in(parent).with_context(|| format!("Failed to stage {}", path))?;
    file.write_all(contents)
        .with_context(|| format!("Failed to write {}", path))?;
    file.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", path))?;
    file.persist(path)
        .with_context(|| format!("Failed to replace {}", path))?;
    Ok(())
}
