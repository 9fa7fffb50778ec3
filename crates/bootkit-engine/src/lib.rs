//! Provisioning engine for bootkit
//!
//! Provides:
//! - Content verification of downloaded payloads
//! - HTTP artifact fetching with timeouts and redirect policy
//! - Download-if-needed caching with retry
//! - Package and script execution
//! - Phase orchestration with persisted status
//! - Console session detection, progress reporting and launchd registration

pub mod cache;
pub mod executor;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod session;
pub mod status;
pub mod verifier;

pub use cache::{DownloadCache, EnsureOutcome};
pub use executor::{ExecutionEngine, SystemTools, LAUNCH_FAILURE};
pub use fetcher::{ArtifactFetcher, FetchError, FetchRequest, HttpFetcher};
pub use orchestrator::{
    ItemOutcome, ItemReport, ManifestError, OrchestratorOptions, PhaseOrchestrator, PhaseOutcome,
    RunOutcome, RunState,
};
pub use progress::{DialogReporter, HeadlessReporter, ItemStatus, ProgressReporter};
pub use service::{LaunchdRegistrar, NoopRegistrar, RebootScheduler, ServiceRegistrar};
pub use session::{ConsoleUser, ConsoleUserSource, DevConsoleSource, SessionWaiter};
pub use status::{PhaseRecord, Stage, StatusDocument, StatusStore};
