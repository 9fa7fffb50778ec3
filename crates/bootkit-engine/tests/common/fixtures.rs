//! A temporary provisioning environment

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bootkit_core::types::{ItemKind, ManifestItem};
use bootkit_core::{Architecture, Paths};
use bootkit_engine::{
    ExecutionEngine, OrchestratorOptions, PhaseOrchestrator, SessionWaiter, StatusStore,
    SystemTools,
};
use camino::Utf8PathBuf;
use tempfile::TempDir;

use super::builders::ItemBuilder;
use super::constants::*;
use super::mocks::*;

pub const PAYLOAD_BASE_URL: &str = "https://cdn.example.com";

/// Base directory, fake system tools and recording collaborators
pub struct Harness {
    pub temp: TempDir,
    pub paths: Paths,
    pub fetcher: Arc<MockFetcher>,
    pub reporter: Arc<RecordingReporter>,
    pub registrar: Arc<CountingRegistrar>,
    pub architecture: Architecture,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().join("base")).unwrap();
        std::fs::create_dir_all(&base).unwrap();
        std::fs::create_dir_all(temp.path().join("tools")).unwrap();

        let harness = Self {
            paths: Paths::new(base),
            temp,
            fetcher: Arc::new(MockFetcher::new()),
            reporter: Arc::new(RecordingReporter::new()),
            registrar: Arc::new(CountingRegistrar::default()),
            architecture: Architecture::Arm64,
        };
        harness.write_tool(
            "installer",
            &format!(
                "echo \"$2\" >> {}\ncase \"$2\" in *broken*) exit 1;; esac\nexit 0",
                harness.installer_log().display()
            ),
        );
        harness.write_tool("pkgutil", "exit 1");
        harness
    }

    pub fn payload_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.temp.path().join("payloads")).unwrap()
    }

    /// Every package path handed to the fake installer, one per line
    pub fn installer_log(&self) -> PathBuf {
        self.temp.path().join("installer.log")
    }

    pub fn installed_packages(&self) -> Vec<String> {
        std::fs::read_to_string(self.installer_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn write_tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.temp.path().join("tools").join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn tools(&self) -> SystemTools {
        let dir = self.temp.path().join("tools");
        SystemTools {
            installer: dir.join("installer"),
            pkgutil: dir.join("pkgutil"),
            launchctl: PathBuf::from("false"),
        }
    }

    /// A script item served by the mock fetcher that exits with `code`
    pub fn script(&self, kind: ItemKind, file_name: &str, code: i32) -> ItemBuilder {
        let body = script_body(code);
        let url = format!("{}/scripts/{}", PAYLOAD_BASE_URL, file_name);
        self.fetcher.serve(&url, body.clone().into_bytes());
        ItemBuilder::new(kind, self.payload_dir().join(file_name), &url, body.as_bytes())
            .retries(1, 0)
    }

    /// A package item served by the mock fetcher
    pub fn package(&self, file_name: &str) -> ItemBuilder {
        let builder =
            ItemBuilder::package(&self.payload_dir(), file_name, PAYLOAD_BASE_URL, PACKAGE_PAYLOAD)
                .retries(1, 0);
        let item = builder.clone().build();
        self.fetcher.serve(&item.url, PACKAGE_PAYLOAD);
        builder
    }

    pub fn status_store(&self) -> StatusStore {
        StatusStore::new(self.paths.clone(), self.architecture)
    }

    pub fn orchestrator(&self, options: OrchestratorOptions) -> PhaseOrchestrator {
        PhaseOrchestrator::new(
            self.fetcher.clone(),
            self.status_store(),
            self.architecture,
            options,
        )
        .with_engine(ExecutionEngine::new().with_tools(self.tools()))
        .with_reporter(self.reporter.clone())
        .with_registrar(self.registrar.clone())
        .with_session(
            SessionWaiter::with_source(FixedConsole(Some(CONSOLE_USER)))
                .with_interval(Duration::from_millis(5)),
        )
    }
}

pub fn items(builders: Vec<ItemBuilder>) -> Vec<ManifestItem> {
    builders.into_iter().map(ItemBuilder::build).collect()
}
