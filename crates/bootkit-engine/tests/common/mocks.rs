//! In-memory collaborators for orchestrator tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use bootkit_core::types::Phase;
use bootkit_engine::{
    ArtifactFetcher, ConsoleUser, ConsoleUserSource, FetchError, FetchRequest, ItemStatus,
    ProgressReporter, ServiceRegistrar,
};
use bytes::Bytes;

/// Serves registered payloads by URL and counts every request
#[derive(Default)]
pub struct MockFetcher {
    payloads: Mutex<HashMap<String, Bytes>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, payload: impl Into<Bytes>) {
        self.payloads
            .lock()
            .unwrap()
            .insert(url.to_string(), payload.into());
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    fn lookup(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        self.requests.lock().unwrap().push(request.url.clone());
        self.payloads
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: request.url.clone(),
                status: 404,
            })
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch_bytes(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        self.lookup(request)
    }

    async fn fetch_to_file(
        &self,
        request: &FetchRequest,
        destination: &Path,
    ) -> Result<u64, FetchError> {
        let payload = self.lookup(request)?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FetchError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(destination, &payload).map_err(|e| FetchError::Io {
            path: destination.to_path_buf(),
            source: e,
        })?;
        Ok(payload.len() as u64)
    }
}

/// Records every notification as a short string
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Final status reported for `name`
    pub fn last_status(&self, name: &str) -> Option<String> {
        let prefix = format!("status {} ", name);
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| e.strip_prefix(&prefix).map(str::to_string))
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressReporter for RecordingReporter {
    fn phase_started(&self, phase: Phase) {
        self.push(format!("phase {}", phase));
    }

    fn item_added(&self, name: &str) {
        self.push(format!("added {}", name));
    }

    fn item_status(&self, name: &str, status: ItemStatus, _detail: &str) {
        self.push(format!("status {} {:?}", name, status));
    }

    fn progress(&self, percent: u8) {
        self.push(format!("progress {}", percent));
    }

    fn progress_text(&self, text: &str) {
        self.push(format!("text {}", text));
    }

    fn complete(&self, success: bool) {
        self.push(format!("complete {}", success));
    }

    fn close(&self) {
        self.push("close".to_string());
    }
}

/// Always reports the same console user
pub struct FixedConsole(pub Option<&'static str>);

impl ConsoleUserSource for FixedConsole {
    fn console_user(&self) -> Option<ConsoleUser> {
        self.0.map(|name| ConsoleUser {
            name: name.to_string(),
            uid: super::CONSOLE_UID,
        })
    }
}

/// Counts registrations
#[derive(Default)]
pub struct CountingRegistrar {
    calls: AtomicUsize,
}

impl CountingRegistrar {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceRegistrar for CountingRegistrar {
    async fn register(&self, _console_user: Option<&ConsoleUser>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
