//! Progress notifications for an optional UI companion

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use bootkit_core::types::{DialogConfig, Phase};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

/// Per-item state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Waiting,
    Succeeded,
    Failed,
    Skipped,
}

impl ItemStatus {
    /// Whether the item is finished and counts toward progress
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            ItemStatus::Succeeded | ItemStatus::Failed | ItemStatus::Skipped
        )
    }
}

/// Receives orchestration progress
///
/// The orchestrator behaves identically whichever implementation is used.
pub trait ProgressReporter: Send + Sync {
    fn phase_started(&self, phase: Phase);
    fn item_added(&self, name: &str);
    fn item_status(&self, name: &str, status: ItemStatus, detail: &str);
    fn progress(&self, percent: u8);
    fn progress_text(&self, text: &str);
    fn complete(&self, success: bool);
    fn close(&self);
}

/// Logs notifications at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessReporter;

impl ProgressReporter for HeadlessReporter {
    fn phase_started(&self, phase: Phase) {
        debug!("phase started: {}", phase);
    }

    fn item_added(&self, name: &str) {
        debug!("item added: {}", name);
    }

    fn item_status(&self, name: &str, status: ItemStatus, detail: &str) {
        debug!("item {}: {:?} {}", name, status, detail);
    }

    fn progress(&self, percent: u8) {
        debug!("progress: {}%", percent);
    }

    fn progress_text(&self, text: &str) {
        debug!("progress text: {}", text);
    }

    fn complete(&self, success: bool) {
        debug!("complete (success = {})", success);
    }

    fn close(&self) {}
}

#[derive(Debug, Default)]
struct Counts {
    total: u32,
    done: u32,
}

/// Drives the dialog companion through its command file
pub struct DialogReporter {
    command_file: Utf8PathBuf,
    counts: Mutex<Counts>,
}

impl DialogReporter {
    /// Launch the dialog binary, or return `None` when it is not installed
    pub fn launch(config: &DialogConfig) -> Option<Self> {
        if !config.enabled || !config.binary.is_file() {
            debug!("Dialog companion unavailable at {}", config.binary);
            return None;
        }

        let reporter = Self::with_command_file(&config.command_file);
        if let Err(e) = fs::write(&reporter.command_file, "") {
            warn!("Cannot prepare {}: {}", reporter.command_file, e);
            return None;
        }

        let mut cmd = Command::new(&config.binary);
        cmd.args(["--title", config.title.as_str()])
            .args(["--message", config.message.as_str()])
            .args(["--progress", "100"])
            .args(["--progresstext", "Preparing..."])
            .args(["--commandfile", config.command_file.as_str()])
            .args(["--button1text", "Please Wait", "--button1disabled"])
            .args(["--icon", config.icon.as_deref().unwrap_or("SF=gearshape.2.fill")])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(child) => {
                info!("Launched dialog (pid {})", child.id());
                Some(reporter)
            }
            Err(e) => {
                warn!("Failed to launch dialog: {}", e);
                None
            }
        }
    }

    /// A reporter writing to `command_file` without launching anything
    pub fn with_command_file(command_file: &Utf8Path) -> Self {
        Self {
            command_file: command_file.to_path_buf(),
            counts: Mutex::new(Counts::default()),
        }
    }

    fn send(&self, command: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.command_file)
            .and_then(|mut file| writeln!(file, "{}", command));
        if let Err(e) = result {
            debug!("Failed to write dialog command: {}", e);
        }
    }
}

fn dialog_status(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Pending => "pending",
        ItemStatus::Waiting => "wait",
        ItemStatus::Succeeded | ItemStatus::Skipped => "success",
        ItemStatus::Failed => "fail",
    }
}

impl ProgressReporter for DialogReporter {
    fn phase_started(&self, phase: Phase) {
        self.progress_text(&format!("Phase: {}", phase));
    }

    fn item_added(&self, name: &str) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.total += 1;
        }
        self.send(&format!("listitem: add, title: {}, status: pending", name));
    }

    fn item_status(&self, name: &str, status: ItemStatus, detail: &str) {
        let mut command = format!("listitem: title: {}, status: {}", name, dialog_status(status));
        if !detail.is_empty() {
            command.push_str(&format!(", statustext: {}", detail));
        }
        self.send(&command);

        if status.is_done() {
            let percent = match self.counts.lock() {
                Ok(mut counts) => {
                    counts.done += 1;
                    if counts.total > 0 {
                        (counts.done.min(counts.total) * 100 / counts.total) as u8
                    } else {
                        0
                    }
                }
                Err(_) => return,
            };
            self.progress(percent);
        }
    }

    fn progress(&self, percent: u8) {
        self.send(&format!("progress: {}", percent.min(100)));
    }

    fn progress_text(&self, text: &str) {
        self.send(&format!("progresstext: {}", text));
    }

    fn complete(&self, success: bool) {
        self.send("progress: complete");
        self.progress_text(if success {
            "Setup Complete"
        } else {
            "Setup finished with errors"
        });
        self.send("button1text: Done");
        self.send("button1: enable");
    }

    fn close(&self) {
        self.send("quit:");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reporter(temp: &TempDir) -> DialogReporter {
        let path = Utf8PathBuf::from_path_buf(temp.path().join("dialog.log")).unwrap();
        DialogReporter::with_command_file(&path)
    }

    fn commands(temp: &TempDir) -> Vec<String> {
        fs::read_to_string(temp.path().join("dialog.log"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_progress_counts_finished_items() {
        let temp = TempDir::new().unwrap();
        let dialog = reporter(&temp);

        for name in ["a", "b", "c", "d"] {
            dialog.item_added(name);
        }
        dialog.item_status("a", ItemStatus::Waiting, "Downloading");
        dialog.item_status("a", ItemStatus::Succeeded, "");
        dialog.item_status("b", ItemStatus::Failed, "exit 1");

        let lines = commands(&temp);
        assert_eq!(lines[0], "listitem: add, title: a, status: pending");
        assert!(lines.contains(&"listitem: title: a, status: wait, statustext: Downloading".to_string()));
        assert!(lines.contains(&"progress: 25".to_string()));
        assert!(lines.contains(&"listitem: title: b, status: fail, statustext: exit 1".to_string()));
        assert_eq!(lines.last().unwrap(), "progress: 50");
    }

    #[test]
    fn test_close_sends_quit() {
        let temp = TempDir::new().unwrap();
        let dialog = reporter(&temp);
        dialog.complete(true);
        dialog.close();

        let lines = commands(&temp);
        assert!(lines.contains(&"progress: complete".to_string()));
        assert_eq!(lines.last().unwrap(), "quit:");
    }

    #[test]
    fn test_missing_binary_falls_back() {
        let config = DialogConfig {
            binary: Utf8PathBuf::from("/nonexistent/dialog"),
            ..Default::default()
        };
        assert!(DialogReporter::launch(&config).is_none());
    }
}
