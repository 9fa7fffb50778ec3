//! Package installation and script execution
//!
//! Every entry point returns an `i32` exit code. Real process exit codes are
//! non-negative; [`LAUNCH_FAILURE`] means the item could not be prepared or
//! launched at all (permission change failed, spawn failed, killed by a
//! signal, unsupported item kind).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use bootkit_core::types::{ItemKind, ManifestItem};
use bootkit_core::version;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Exit code for an item that never ran
pub const LAUNCH_FAILURE: i32 = -1;

const SCRIPT_PATH_ENV: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Locations of the system tools used to install and query packages
#[derive(Debug, Clone)]
pub struct SystemTools {
    pub installer: PathBuf,
    pub pkgutil: PathBuf,
    pub launchctl: PathBuf,
}

impl Default for SystemTools {
    fn default() -> Self {
        Self {
            installer: PathBuf::from("/usr/sbin/installer"),
            pkgutil: PathBuf::from("/usr/sbin/pkgutil"),
            launchctl: PathBuf::from("/bin/launchctl"),
        }
    }
}

/// Runs manifest items as child processes
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    tools: SystemTools,
    dry_run: bool,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: SystemTools) -> Self {
        self.tools = tools;
        self
    }

    /// Log every action instead of performing it
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute an item according to its kind
    ///
    /// Package items already installed at a sufficient version return 0
    /// without invoking the installer. `as_user` only applies to scripts.
    pub async fn run(&self, item: &ManifestItem, as_user: Option<u32>) -> i32 {
        match &item.kind {
            ItemKind::Package => {
                if self.is_package_satisfied(item).await {
                    info!(
                        "{} already installed at a satisfying version, skipping",
                        item.display_name()
                    );
                    return 0;
                }
                self.install_package(item).await
            }
            ItemKind::RootScript | ItemKind::UserScript => self.run_script(item, as_user).await,
            ItemKind::Unsupported(kind) => {
                error!(
                    "Unsupported item type '{}' for {}",
                    kind,
                    item.display_name()
                );
                LAUNCH_FAILURE
            }
        }
    }

    /// Version of an installed package receipt, if any
    pub async fn installed_version(&self, package_id: &str) -> Option<String> {
        let output = Command::new(&self.tools.pkgutil)
            .arg("--pkg-info")
            .arg(package_id)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_pkg_info_version(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(_) => {
                debug!("No receipt for {}", package_id);
                None
            }
            Err(e) => {
                warn!("Failed to query receipt for {}: {}", package_id, e);
                None
            }
        }
    }

    /// Whether the package receipt is present at `version` or newer
    ///
    /// Items without a `packageid` are never considered satisfied. An item
    /// without a minimum version is satisfied by any installed receipt.
    pub async fn is_package_satisfied(&self, item: &ManifestItem) -> bool {
        let Some(package_id) = item.package_id.as_deref().filter(|p| !p.is_empty()) else {
            return false;
        };
        let Some(installed) = self.installed_version(package_id).await else {
            return false;
        };

        match item.min_version.as_deref() {
            Some(minimum) => {
                let satisfied = version::is_at_least(&installed, minimum);
                debug!(
                    "{} installed at {}, requires {}: {}",
                    package_id,
                    installed,
                    minimum,
                    if satisfied { "satisfied" } else { "upgrade needed" }
                );
                satisfied
            }
            None => true,
        }
    }

    /// Install a package payload onto the root volume
    pub async fn install_package(&self, item: &ManifestItem) -> i32 {
        let name = item.display_name();
        if self.dry_run {
            info!("[dry-run] Would install {} from {}", name, item.file);
            return 0;
        }

        info!("Installing {}", name);
        let mut cmd = Command::new(&self.tools.installer);
        cmd.arg("-pkg").arg(&item.file).arg("-target").arg("/");

        match run_to_completion(cmd).await {
            Ok(output) => {
                let code = exit_code(&output);
                log_output(&name, &output, code);
                if code == 0 {
                    info!("Installed {}", name);
                } else {
                    error!("Installer failed for {} with exit code {}", name, code);
                }
                code
            }
            Err(e) => {
                error!("Failed to launch installer for {}: {}", name, e);
                LAUNCH_FAILURE
            }
        }
    }

    /// Run a script item
    ///
    /// With `run_async` set the script is started detached and 0 is returned
    /// as soon as the spawn succeeds; its own exit status is never observed.
    pub async fn run_script(&self, item: &ManifestItem, as_user: Option<u32>) -> i32 {
        let name = item.display_name();
        if self.dry_run {
            info!("[dry-run] Would run {} ({})", name, item.file);
            return 0;
        }

        if let Err(e) = make_executable(item.file.as_std_path()) {
            error!("Failed to set permissions on {}: {}", item.file, e);
            return LAUNCH_FAILURE;
        }

        let cmd = self.script_command(item.file.as_std_path(), as_user);

        if item.run_async {
            return spawn_detached(cmd, &name);
        }

        info!("Running {}", name);
        match run_to_completion(cmd).await {
            Ok(output) => {
                let code = exit_code(&output);
                log_output(&name, &output, code);
                if code == 0 {
                    info!("{} completed", name);
                } else {
                    warn!("{} exited with code {}", name, code);
                }
                code
            }
            Err(e) => {
                error!("Failed to launch {}: {}", name, e);
                LAUNCH_FAILURE
            }
        }
    }

    fn script_command(&self, script: &Path, as_user: Option<u32>) -> Command {
        let mut cmd = match as_user {
            Some(uid) => {
                let mut c = Command::new(&self.tools.launchctl);
                c.arg("asuser").arg(uid.to_string()).arg(script);
                c
            }
            None => Command::new(script),
        };
        cmd.env("PATH", SCRIPT_PATH_ENV);
        if let Some(dir) = script.parent().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }
        cmd
    }
}

async fn run_to_completion(mut cmd: Command) -> std::io::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
}

fn spawn_detached(mut cmd: Command, name: &str) -> i32 {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match cmd.spawn() {
        Ok(child) => {
            info!(
                "Started {} in the background (pid {})",
                name,
                child.id().unwrap_or_default()
            );
            0
        }
        Err(e) => {
            error!("Failed to launch {}: {}", name, e);
            LAUNCH_FAILURE
        }
    }
}

fn make_executable(path: &Path) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(LAUNCH_FAILURE)
}

/// Captured output goes to debug, or to warn when the exit code is non-zero
fn log_output(name: &str, output: &Output, code: i32) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if code == 0 {
        stdout.lines().for_each(|line| debug!("[{}] {}", name, line));
        stderr.lines().for_each(|line| debug!("[{}] stderr: {}", name, line));
    } else {
        stdout.lines().for_each(|line| warn!("[{}] {}", name, line));
        stderr.lines().for_each(|line| warn!("[{}] stderr: {}", name, line));
    }
}

/// Extract the `version:` value from `pkgutil --pkg-info` output
pub fn parse_pkg_info_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("version:")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
