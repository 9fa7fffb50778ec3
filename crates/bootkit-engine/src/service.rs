//! Post-run housekeeping: launchd registration, cache cleanup and reboot

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use nix::unistd::{chown, Uid};
use tracing::{debug, info, warn};

use crate::session::ConsoleUser;

const DEFAULT_RESTART_COMMAND: &str =
    "/usr/bin/osascript -e 'tell application \"System Events\" to restart'";

/// Registers bootkit as a recurring OS-managed task
#[async_trait]
pub trait ServiceRegistrar: Send + Sync {
    async fn register(&self, console_user: Option<&ConsoleUser>) -> Result<()>;
}

/// Does nothing; for hosts without launchd and for tests
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistrar;

#[async_trait]
impl ServiceRegistrar for NoopRegistrar {
    async fn register(&self, _console_user: Option<&ConsoleUser>) -> Result<()> {
        debug!("Service registration disabled");
        Ok(())
    }
}

/// Writes and loads a LaunchDaemon, plus a LaunchAgent for the console user
pub struct LaunchdRegistrar {
    daemon_identifier: String,
    agent_identifier: String,
    program: Utf8PathBuf,
    daemons_dir: PathBuf,
    agents_dir: PathBuf,
    launchctl: PathBuf,
}

impl LaunchdRegistrar {
    pub fn new(
        daemon_identifier: impl Into<String>,
        agent_identifier: impl Into<String>,
        program: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            daemon_identifier: daemon_identifier.into(),
            agent_identifier: agent_identifier.into(),
            program: program.into(),
            daemons_dir: PathBuf::from("/Library/LaunchDaemons"),
            agents_dir: PathBuf::from("/Library/LaunchAgents"),
            launchctl: PathBuf::from("/bin/launchctl"),
        }
    }

    /// Override where property lists are written
    pub fn with_dirs(mut self, daemons_dir: impl Into<PathBuf>, agents_dir: impl Into<PathBuf>) -> Self {
        self.daemons_dir = daemons_dir.into();
        self.agents_dir = agents_dir.into();
        self
    }

    pub fn with_launchctl(mut self, launchctl: impl Into<PathBuf>) -> Self {
        self.launchctl = launchctl.into();
        self
    }

    pub fn daemon_plist_path(&self) -> PathBuf {
        self.daemons_dir
            .join(format!("{}.plist", self.daemon_identifier))
    }

    pub fn agent_plist_path(&self) -> PathBuf {
        self.agents_dir.join(format!("{}.plist", self.agent_identifier))
    }

    async fn load(&self, plist: &Path) -> Result<()> {
        let output = tokio::process::Command::new(&self.launchctl)
            .arg("load")
            .arg("-w")
            .arg(plist)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.launchctl.display()))?;

        if !output.status.success() {
            return Err(anyhow!(
                "launchctl load {} failed: {}",
                plist.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistrar for LaunchdRegistrar {
    async fn register(&self, console_user: Option<&ConsoleUser>) -> Result<()> {
        let daemon = self.daemon_plist_path();
        let program = self.program.as_str();
        write_plist(
            &daemon,
            &launchd_plist(&self.daemon_identifier, &[program, "run"]),
        )?;
        info!("Wrote LaunchDaemon {}", daemon.display());
        self.load(&daemon).await?;

        if let Some(user) = console_user {
            let agent = self.agent_plist_path();
            write_plist(
                &agent,
                &launchd_plist(&self.agent_identifier, &[program, "run", "--userscript"]),
            )?;
            chown(&agent, Some(Uid::from_raw(user.uid)), None)
                .with_context(|| format!("Failed to chown {} to {}", agent.display(), user.name))?;
            info!("Wrote LaunchAgent {} for {}", agent.display(), user.name);
        }
        Ok(())
    }
}

/// Render a minimal launchd property list
pub fn launchd_plist(label: &str, program_arguments: &[&str]) -> String {
    let mut args = String::new();
    for arg in program_arguments {
        args.push_str(&format!("        <string>{}</string>\n", xml_escape(arg)));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{}</string>
    <key>ProgramArguments</key>
    <array>
{}    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
</dict>
</plist>
"#,
        xml_escape(label),
        args
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn write_plist(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(())
}

/// Remove every entry in the download cache directory
///
/// Returns the number of entries removed. A missing directory is empty.
pub fn clean_cache(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    info!("Removed {} cached entries from {}", removed, dir.display());
    Ok(removed)
}

/// Schedules a restart that outlives this process
#[derive(Debug, Clone)]
pub struct RebootScheduler {
    delay: Duration,
    command: String,
}

impl RebootScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            command: DEFAULT_RESTART_COMMAND.to_string(),
        }
    }

    /// Replace the shell command that performs the restart
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Spawn a detached shell that sleeps, then restarts; not cancellable
    pub fn schedule(&self) -> Result<()> {
        let script = format!("sleep {}; {}", self.delay.as_secs(), self.command);
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to schedule reboot")?;
        info!(
            "Reboot scheduled in {}s (pid {})",
            self.delay.as_secs(),
            child.id()
        );
        Ok(())
    }
}
