//! Provisioning run

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use bootkit_core::types::RunConfig;
use bootkit_core::{Architecture, Paths, RunOverrides};
use bootkit_engine::{
    DialogReporter, HeadlessReporter, HttpFetcher, LaunchdRegistrar, NoopRegistrar,
    OrchestratorOptions, PhaseOrchestrator, ProgressReporter, RebootScheduler, RunOutcome,
    ServiceRegistrar, StatusStore,
};
use camino::Utf8Path;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::commands::Context;
use crate::output;

const WRITABLE_TIMEOUT: Duration = Duration::from_secs(30);
const MANAGED_CONFIG_TIMEOUT: Duration = Duration::from_secs(300);
const PRECONDITION_INTERVAL: Duration = Duration::from_secs(1);

impl RunArgs {
    fn overrides(&self, quiet: bool, verbose: bool) -> RunOverrides {
        RunOverrides {
            manifest_url: self.url.clone(),
            auth_header: self.headers.clone(),
            base_dir: None,
            follow_redirects: self.follow_redirects,
            dry_run: self.dry_run,
            reboot: self.reboot,
            userscript_only: self.userscript,
            retain_cache: self.retain_cache,
            silent: quiet,
            verbose,
            no_dialog: self.no_dialog,
            dialog_title: self.dialog_title.clone(),
            dialog_message: self.dialog_message.clone(),
        }
    }
}

/// `quiet` and `verbose` are the global flags; quiet also hides the dialog
pub async fn run(args: RunArgs, ctx: &Context, quiet: bool, verbose: bool) -> Result<u8> {
    let overrides = args.overrides(quiet, verbose);
    let mut config = overrides.apply(ctx.load_config()?);

    wait_for_writable(&config.base_dir, WRITABLE_TIMEOUT, PRECONDITION_INTERVAL).await;

    if !config.has_manifest_url() {
        info!("No manifest URL yet, waiting for managed preferences");
        if let Some(managed) = ctx
            .loader()
            .wait_for_managed_config(MANAGED_CONFIG_TIMEOUT, PRECONDITION_INTERVAL)
            .await
        {
            let mut managed = overrides.apply(managed);
            managed.base_dir = config.base_dir.clone();
            config = managed;
        }
    }
    let url = config
        .require_manifest_url()
        .context("Cannot start provisioning")?
        .to_string();

    let architecture = Architecture::current();
    info!(
        "bootkit {} on {} using {}{}",
        bootkit_core::VERSION,
        architecture,
        url,
        if config.dry_run { " (dry run)" } else { "" }
    );

    let paths = Paths::new(config.base_dir.clone());
    let status = StatusStore::new(paths, architecture).with_bootstrap_url(Some(url.clone()));
    let fetcher = Arc::new(HttpFetcher::new()?);
    let mut orchestrator = PhaseOrchestrator::new(
        fetcher,
        status,
        architecture,
        OrchestratorOptions::from(&config),
    );

    if config.userscript_only {
        let manifest = match orchestrator.load_manifest(&url).await {
            Ok(manifest) => manifest,
            Err(e) => {
                output::error(&e.to_string());
                return Ok(1);
            }
        };
        let outcome = orchestrator.run_userscripts_only(&manifest).await;
        return Ok(outcome.exit_code() as u8);
    }

    let mut orchestrator = orchestrator
        .with_reporter(reporter(&config))
        .with_registrar(registrar(&config))
        .with_reboot_scheduler(RebootScheduler::new(Duration::from_secs(
            config.reboot_delay_secs,
        )));

    match orchestrator.run(&url).await {
        Ok(outcome) => {
            summarize(&outcome);
            Ok(outcome.exit_code() as u8)
        }
        Err(e) => {
            output::error(&e.to_string());
            Ok(1)
        }
    }
}

fn reporter(config: &RunConfig) -> Arc<dyn ProgressReporter> {
    match DialogReporter::launch(&config.dialog) {
        Some(dialog) => Arc::new(dialog),
        None => Arc::new(HeadlessReporter),
    }
}

fn registrar(config: &RunConfig) -> Arc<dyn ServiceRegistrar> {
    if cfg!(target_os = "macos") && !config.dry_run {
        Arc::new(LaunchdRegistrar::new(
            config.daemon_identifier.clone(),
            config.agent_identifier.clone(),
            config.install_path.clone(),
        ))
    } else {
        Arc::new(NoopRegistrar)
    }
}

fn summarize(outcome: &RunOutcome) {
    let failed: Vec<&str> = outcome.failed_items().map(|r| r.name.as_str()).collect();
    if outcome.success {
        output::success(&format!(
            "Provisioning finished ({} item(s) processed)",
            outcome.items.len()
        ));
    } else if failed.is_empty() {
        output::error("Provisioning failed");
    } else {
        output::error(&format!("Provisioning failed: {}", failed.join(", ")));
    }
}

/// Poll until `dir` accepts a new file, giving up after `timeout`
///
/// Returns whether the directory became writable.
async fn wait_for_writable(dir: &Utf8Path, timeout: Duration, interval: Duration) -> bool {
    let start = Instant::now();
    loop {
        let probe = std::fs::create_dir_all(dir).and_then(|_| tempfile::NamedTempFile::new_in(dir));
        match probe {
            Ok(_) => return true,
            Err(e) if start.elapsed() >= timeout => {
                warn!(
                    "{} still not writable after {}s ({}), continuing",
                    dir,
                    timeout.as_secs(),
                    e
                );
                return false;
            }
            Err(_) => tokio::time::sleep(interval).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writable_directory_is_created() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("base/nested")).unwrap();

        assert!(wait_for_writable(&dir, Duration::from_secs(1), Duration::from_millis(10)).await);
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_unwritable_directory_times_out() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let dir = Utf8PathBuf::from_path_buf(blocker.join("below")).unwrap();

        let writable =
            wait_for_writable(&dir, Duration::from_millis(30), Duration::from_millis(10)).await;
        assert!(!writable);
    }

    #[test]
    fn test_cli_flags_become_overrides() {
        let args = RunArgs {
            url: Some("https://cli.example.com/m.json".to_string()),
            userscript: true,
            no_dialog: true,
            ..Default::default()
        };
        let config = args.overrides(false, true).apply(RunConfig::default());

        assert_eq!(config.manifest_url.as_deref(), Some("https://cli.example.com/m.json"));
        assert!(config.userscript_only);
        assert!(config.verbose);
        assert!(!config.dialog.enabled);
    }

    #[test]
    fn test_quiet_run_disables_dialog() {
        let config = RunArgs::default()
            .overrides(true, false)
            .apply(RunConfig::default());

        assert!(config.silent);
        assert!(!config.dialog.enabled);
    }
}
