//! Phase state machine driving a provisioning run
//!
//! A run moves through `Preflight`, `SetupAssistant` and `Userland` in order.
//! Every item is resolved through the [`DownloadCache`] and then handed to
//! the [`ExecutionEngine`]; phase transitions are persisted by the
//! [`StatusStore`] as they happen.

use std::sync::Arc;
use std::time::Duration;

use bootkit_core::types::{ItemKind, Manifest, ManifestItem, Phase, RunConfig};
use bootkit_core::Architecture;
use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cache::{DownloadCache, EnsureOutcome};
use crate::executor::{ExecutionEngine, LAUNCH_FAILURE};
use crate::fetcher::{ArtifactFetcher, FetchError, FetchRequest};
use crate::progress::{HeadlessReporter, ItemStatus, ProgressReporter};
use crate::service::{clean_cache, NoopRegistrar, RebootScheduler, ServiceRegistrar};
use crate::session::{ConsoleUser, SessionWaiter};
use crate::status::{Stage, StatusStore};

/// Where the state machine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Preflight,
    SetupAssistant,
    Userland,
    Completed,
    /// Preflight reported the device as already provisioned
    SkippedAll,
}

/// Aggregate result of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    NotRun,
    Skipped,
    Succeeded,
    FailedContinue,
    FailedAbort,
}

impl PhaseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PhaseOutcome::FailedContinue | PhaseOutcome::FailedAbort)
    }
}

/// What happened to a single item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    AlreadyInstalled,
    SkippedArchitecture,
    DownloadFailed(String),
    Unsupported(String),
    ExecutionFailed(i32),
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ItemOutcome::DownloadFailed(_)
                | ItemOutcome::Unsupported(_)
                | ItemOutcome::ExecutionFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub phase: Phase,
    pub name: String,
    pub outcome: ItemOutcome,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub final_state: RunState,
    pub preflight: PhaseOutcome,
    pub setup: PhaseOutcome,
    pub userland: PhaseOutcome,
    pub items: Vec<ItemReport>,
    pub success: bool,
}

impl RunOutcome {
    fn new() -> Self {
        Self {
            final_state: RunState::NotStarted,
            preflight: PhaseOutcome::NotRun,
            setup: PhaseOutcome::NotRun,
            userland: PhaseOutcome::NotRun,
            items: Vec::new(),
            success: false,
        }
    }

    pub fn phase(&self, phase: Phase) -> PhaseOutcome {
        match phase {
            Phase::Preflight => self.preflight,
            Phase::SetupAssistant => self.setup,
            Phase::Userland => self.userland,
        }
    }

    /// Items of `phase` that were dispatched, in order
    pub fn items_in(&self, phase: Phase) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(move |r| r.phase == phase)
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| r.outcome.is_failure())
    }

    /// Process exit code: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Failure to obtain a usable manifest; aborts before any phase runs
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to fetch manifest: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to decode manifest: {0}")]
    Decode(#[source] bootkit_core::Error),
}

/// Run-level switches the orchestrator consumes
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub dry_run: bool,
    pub reboot: bool,
    pub retain_cache: bool,
    pub block_userland_on_setup_failure: bool,
    pub userscripts_as_console_user: bool,
    pub follow_redirects: bool,
    pub auth_header: Option<String>,
    pub manifest_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for OrchestratorOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            reboot: config.reboot,
            retain_cache: config.retain_cache,
            block_userland_on_setup_failure: config.block_userland_on_setup_failure,
            userscripts_as_console_user: config.userscripts_as_console_user,
            follow_redirects: config.follow_redirects,
            auth_header: config.auth_header.clone(),
            manifest_timeout: Duration::from_secs(config.network.manifest_timeout_secs),
            download_timeout: Duration::from_secs(config.network.download_timeout_secs),
        }
    }
}

enum PreflightDecision {
    Continue,
    SkipBootstrap,
    Abort,
}

/// Drives one provisioning run
pub struct PhaseOrchestrator {
    fetcher: Arc<dyn ArtifactFetcher>,
    cache: DownloadCache,
    engine: ExecutionEngine,
    status: StatusStore,
    session: SessionWaiter,
    reporter: Arc<dyn ProgressReporter>,
    registrar: Arc<dyn ServiceRegistrar>,
    reboot: Option<RebootScheduler>,
    cache_dir: Option<Utf8PathBuf>,
    options: OrchestratorOptions,
    state: RunState,
    console_user: Option<ConsoleUser>,
}

impl PhaseOrchestrator {
    pub fn new(
        fetcher: Arc<dyn ArtifactFetcher>,
        status: StatusStore,
        architecture: Architecture,
        options: OrchestratorOptions,
    ) -> Self {
        let cache = DownloadCache::new(Arc::clone(&fetcher), architecture)
            .with_dry_run(options.dry_run)
            .with_download_timeout(options.download_timeout)
            .with_auth_header(options.auth_header.clone())
            .with_follow_redirects(options.follow_redirects);
        let engine = ExecutionEngine::new().with_dry_run(options.dry_run);
        let cache_dir = Some(status.paths().cache_dir());

        Self {
            fetcher,
            cache,
            engine,
            status,
            session: SessionWaiter::new(),
            reporter: Arc::new(HeadlessReporter),
            registrar: Arc::new(NoopRegistrar),
            reboot: None,
            cache_dir,
            options,
            state: RunState::NotStarted,
            console_user: None,
        }
    }

    /// Replace the execution engine, e.g. to point at different system tools
    pub fn with_engine(mut self, engine: ExecutionEngine) -> Self {
        self.engine = engine.with_dry_run(self.options.dry_run);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_session(mut self, session: SessionWaiter) -> Self {
        self.session = session;
        self
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn ServiceRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Scheduler used when the run asks for a reboot
    pub fn with_reboot_scheduler(mut self, scheduler: RebootScheduler) -> Self {
        self.reboot = Some(scheduler);
        self
    }

    /// Directory emptied after a successful run; `None` disables cleanup
    pub fn with_cache_dir(mut self, dir: Option<Utf8PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    /// Fetch and decode the manifest at `url`
    pub async fn load_manifest(&self, url: &str) -> Result<Manifest, ManifestError> {
        info!("Fetching manifest from {}", url);
        let request = FetchRequest::new(url, self.options.manifest_timeout)
            .with_redirects(self.options.follow_redirects)
            .with_auth_header(self.options.auth_header.clone());

        let bytes = self.fetcher.fetch_bytes(&request).await?;
        let manifest = Manifest::from_slice(&bytes).map_err(ManifestError::Decode)?;
        info!(
            "Manifest has {} preflight, {} setup assistant and {} userland items",
            manifest.preflight.len(),
            manifest.setup.len(),
            manifest.userland.len()
        );
        Ok(manifest)
    }

    /// Load the manifest at `url` and run every phase
    pub async fn run(&mut self, url: &str) -> Result<RunOutcome, ManifestError> {
        let manifest = match self.load_manifest(url).await {
            Ok(manifest) => manifest,
            Err(e) => {
                error!("{}", e);
                self.reporter.complete(false);
                self.reporter.close();
                return Err(e);
            }
        };
        Ok(self.execute(&manifest).await)
    }

    /// Run every phase of an already loaded manifest
    pub async fn execute(&mut self, manifest: &Manifest) -> RunOutcome {
        let mut outcome = RunOutcome::new();

        let preflight_script = manifest
            .preflight
            .iter()
            .find(|i| i.kind == ItemKind::RootScript);
        for item in preflight_script
            .into_iter()
            .chain(&manifest.setup)
            .chain(&manifest.userland)
        {
            self.reporter.item_added(&item.display_name());
        }

        self.state = RunState::Preflight;
        let decision = self.run_preflight(manifest, &mut outcome).await;

        match decision {
            PreflightDecision::SkipBootstrap => {
                info!("Preflight reports this device is already provisioned");
                outcome.success = true;
                self.finish(&mut outcome, RunState::SkippedAll).await;
                return outcome;
            }
            PreflightDecision::Abort => {
                error!("Preflight failed, aborting the run");
                outcome.success = false;
                self.finish(&mut outcome, RunState::Completed).await;
                return outcome;
            }
            PreflightDecision::Continue => {}
        }

        if !manifest.setup.is_empty() {
            self.state = RunState::SetupAssistant;
            self.enter_phase(Phase::SetupAssistant);
            outcome.setup = self
                .run_phase(Phase::SetupAssistant, &manifest.setup, &mut outcome.items)
                .await;
        }

        if !manifest.userland.is_empty() {
            self.state = RunState::Userland;
            outcome.userland = if outcome.setup.is_failure()
                && self.options.block_userland_on_setup_failure
            {
                warn!("Skipping userland because setup assistant items failed");
                self.status.record_transition(
                    Phase::Userland,
                    Stage::Skipped,
                    None,
                    Some("setup assistant phase failed"),
                );
                for item in &manifest.userland {
                    self.reporter.item_status(
                        &item.display_name(),
                        ItemStatus::Skipped,
                        "Blocked by earlier failures",
                    );
                }
                PhaseOutcome::Skipped
            } else {
                self.enter_phase(Phase::Userland);
                self.reporter.progress_text("Waiting for user to log in...");
                let user = self.session.block().await;
                self.console_user = Some(user);
                self.run_phase(Phase::Userland, &manifest.userland, &mut outcome.items)
                    .await
            };
        }

        outcome.success = !outcome.setup.is_failure() && !outcome.userland.is_failure();
        self.finish(&mut outcome, RunState::Completed).await;
        outcome
    }

    /// Run only the userland user scripts, ignoring their failures
    ///
    /// Used by the per-user agent; nothing is persisted and no session wait
    /// happens since the agent already runs inside the user's session.
    pub async fn run_userscripts_only(&mut self, manifest: &Manifest) -> RunOutcome {
        let mut outcome = RunOutcome::new();
        self.state = RunState::Userland;

        for item in manifest
            .userland
            .iter()
            .filter(|i| i.kind == ItemKind::UserScript)
        {
            let name = item.display_name();
            let result = match self.cache.ensure_detailed(item).await {
                EnsureOutcome::SkippedArchitecture => ItemOutcome::SkippedArchitecture,
                EnsureOutcome::Failed { error, .. } => ItemOutcome::DownloadFailed(error),
                _ => match self.engine.run_script(item, None).await {
                    0 => ItemOutcome::Succeeded,
                    code => ItemOutcome::ExecutionFailed(code),
                },
            };
            if result.is_failure() {
                warn!("User script {} failed: {:?}", name, result);
            }
            outcome.items.push(ItemReport {
                phase: Phase::Userland,
                name,
                outcome: result,
            });
        }

        outcome.userland = PhaseOutcome::Succeeded;
        outcome.success = true;
        outcome.final_state = RunState::Completed;
        self.state = RunState::Completed;
        outcome
    }

    async fn run_preflight(
        &self,
        manifest: &Manifest,
        outcome: &mut RunOutcome,
    ) -> PreflightDecision {
        if manifest.preflight.is_empty() {
            return PreflightDecision::Continue;
        }

        let mut root_scripts = manifest
            .preflight
            .iter()
            .filter(|i| i.kind == ItemKind::RootScript);
        let Some(item) = root_scripts.next() else {
            warn!("Preflight has no root script, continuing");
            self.status.record_transition(
                Phase::Preflight,
                Stage::Skipped,
                None,
                Some("no root script in preflight"),
            );
            outcome.preflight = PhaseOutcome::Skipped;
            return PreflightDecision::Continue;
        };
        let ignored = manifest.preflight.len() - 1;
        if ignored > 0 {
            warn!("Only the first preflight root script runs; ignoring {} other item(s)", ignored);
        }

        self.reporter.phase_started(Phase::Preflight);
        self.status
            .record_transition(Phase::Preflight, Stage::Starting, None, None);

        let name = item.display_name();
        self.reporter
            .item_status(&name, ItemStatus::Waiting, "Downloading");
        let code = match self.cache.ensure_detailed(item).await {
            EnsureOutcome::SkippedArchitecture => {
                self.reporter
                    .item_status(&name, ItemStatus::Skipped, "Not needed on this Mac");
                self.status
                    .record_transition(Phase::Preflight, Stage::Skipped, None, None);
                outcome.preflight = PhaseOutcome::Skipped;
                outcome.items.push(ItemReport {
                    phase: Phase::Preflight,
                    name,
                    outcome: ItemOutcome::SkippedArchitecture,
                });
                return PreflightDecision::Continue;
            }
            EnsureOutcome::Failed { error, .. } => {
                error!("Preflight download failed for {}: {}", name, error);
                outcome.items.push(ItemReport {
                    phase: Phase::Preflight,
                    name: name.clone(),
                    outcome: ItemOutcome::DownloadFailed(error),
                });
                LAUNCH_FAILURE
            }
            _ => {
                let code = self.engine.run_script(item, None).await;
                outcome.items.push(ItemReport {
                    phase: Phase::Preflight,
                    name: name.clone(),
                    outcome: if code < 0 {
                        ItemOutcome::ExecutionFailed(code)
                    } else {
                        ItemOutcome::Succeeded
                    },
                });
                code
            }
        };

        if code < 0 {
            self.reporter
                .item_status(&name, ItemStatus::Failed, "Could not run");
            self.status.record_transition(
                Phase::Preflight,
                Stage::Failed,
                Some(code),
                Some(&format!("preflight script {} could not be run", name)),
            );
            outcome.preflight = PhaseOutcome::FailedAbort;
            return PreflightDecision::Abort;
        }

        self.reporter.item_status(&name, ItemStatus::Succeeded, "");
        self.status
            .record_transition(Phase::Preflight, Stage::Completed, Some(code), None);
        outcome.preflight = PhaseOutcome::Succeeded;

        if self.options.dry_run {
            info!("[dry-run] Continuing past preflight");
            PreflightDecision::Continue
        } else if code == 0 {
            PreflightDecision::SkipBootstrap
        } else {
            info!("Preflight exited with {}, continuing bootstrap", code);
            PreflightDecision::Continue
        }
    }

    /// Announce a phase and persist its `starting` record
    fn enter_phase(&self, phase: Phase) {
        info!("Starting {} phase", phase);
        self.reporter.phase_started(phase);
        self.status
            .record_transition(phase, Stage::Starting, None, None);
    }

    /// Dispatch every item of a phase entered with [`Self::enter_phase`]
    async fn run_phase(
        &self,
        phase: Phase,
        items: &[ManifestItem],
        reports: &mut Vec<ItemReport>,
    ) -> PhaseOutcome {
        info!("Running {} phase with {} item(s)", phase, items.len());
        self.status
            .record_transition(phase, Stage::Running, None, None);

        let mut failed = Vec::new();
        for item in items {
            let name = item.display_name();
            let result = self.process_item(phase, item).await;
            if result.is_failure() {
                failed.push(name.clone());
            }
            reports.push(ItemReport {
                phase,
                name,
                outcome: result,
            });
        }

        if failed.is_empty() {
            info!("{} phase completed", phase);
            self.status
                .record_transition(phase, Stage::Completed, Some(0), None);
            PhaseOutcome::Succeeded
        } else {
            let message = format!(
                "{} of {} items failed: {}",
                failed.len(),
                items.len(),
                failed.join(", ")
            );
            error!("{} phase failed: {}", phase, message);
            self.status
                .record_transition(phase, Stage::Failed, Some(1), Some(&message));
            PhaseOutcome::FailedContinue
        }
    }

    async fn process_item(&self, phase: Phase, item: &ManifestItem) -> ItemOutcome {
        let name = item.display_name();

        if self.cache.is_excluded(item) {
            self.reporter
                .item_status(&name, ItemStatus::Skipped, "Not needed on this Mac");
            return ItemOutcome::SkippedArchitecture;
        }

        if let ItemKind::Unsupported(kind) = &item.kind {
            error!("{}: unsupported item type '{}'", name, kind);
            self.reporter
                .item_status(&name, ItemStatus::Failed, "Unsupported type");
            return ItemOutcome::Unsupported(kind.clone());
        }

        if item.kind == ItemKind::Package && self.engine.is_package_satisfied(item).await {
            info!("{} is already installed", name);
            self.reporter
                .item_status(&name, ItemStatus::Succeeded, "Already installed");
            return ItemOutcome::AlreadyInstalled;
        }

        self.reporter
            .item_status(&name, ItemStatus::Waiting, "Downloading");
        if let EnsureOutcome::Failed { attempts, error } = self.cache.ensure_detailed(item).await {
            error!(
                "{}: download failed after {} attempt(s): {}",
                name, attempts, error
            );
            self.reporter
                .item_status(&name, ItemStatus::Failed, "Download failed");
            return ItemOutcome::DownloadFailed(error);
        }

        let detail = if item.kind == ItemKind::Package {
            "Installing"
        } else {
            "Running"
        };
        self.reporter.item_status(&name, ItemStatus::Waiting, detail);

        let code = match item.kind {
            ItemKind::Package => self.engine.install_package(item).await,
            _ => {
                let as_user = self.script_user(phase, item);
                self.engine.run_script(item, as_user).await
            }
        };

        if code == 0 {
            self.reporter.item_status(&name, ItemStatus::Succeeded, "");
            ItemOutcome::Succeeded
        } else {
            self.reporter
                .item_status(&name, ItemStatus::Failed, &format!("Exit code {}", code));
            ItemOutcome::ExecutionFailed(code)
        }
    }

    fn script_user(&self, phase: Phase, item: &ManifestItem) -> Option<u32> {
        if phase != Phase::Userland
            || item.kind != ItemKind::UserScript
            || !self.options.userscripts_as_console_user
        {
            return None;
        }
        self.console_user.as_ref().map(|user| user.uid)
    }

    /// Completion bookkeeping, strictly before any reboot
    async fn finish(&mut self, outcome: &mut RunOutcome, state: RunState) {
        self.state = state;
        outcome.final_state = state;

        if outcome.success {
            if self.options.dry_run {
                info!("[dry-run] Not writing completion marker");
            } else if let Err(e) = self.status.write_completion_marker() {
                warn!("Failed to write completion marker: {:#}", e);
            }
        }

        self.reporter.complete(outcome.success);
        self.reporter.close();

        if outcome.success && !self.options.retain_cache && !self.options.dry_run {
            if let Some(dir) = &self.cache_dir {
                if let Err(e) = clean_cache(dir.as_std_path()) {
                    warn!("Failed to clean cache {}: {:#}", dir, e);
                }
            }
        }

        if !self.options.dry_run {
            let user = self.console_user.clone().or_else(|| self.session.current());
            if let Err(e) = self.registrar.register(user.as_ref()).await {
                warn!("Service registration failed: {:#}", e);
            }
        }

        if outcome.success && self.options.reboot {
            match (&self.reboot, self.options.dry_run) {
                (_, true) => info!("[dry-run] Not scheduling reboot"),
                (Some(scheduler), false) => {
                    if let Err(e) = scheduler.schedule() {
                        warn!("{:#}", e);
                    }
                }
                (None, false) => warn!("Reboot requested but no scheduler is configured"),
            }
        }

        if outcome.success {
            info!("Run finished successfully");
        } else {
            let failed: Vec<&str> = outcome.failed_items().map(|r| r.name.as_str()).collect();
            error!("Run finished with failures: {}", failed.join(", "));
        }
    }
}
