//! Console helpers for command summaries
//!
//! Errors and warnings go to stderr so `status --json` and
//! `version --json` stay machine readable on stdout.

use bootkit_engine::Stage;
use console::{style, StyledObject};

const KEY_WIDTH: usize = 14;

pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("•").cyan(), msg);
}

/// Section title, preceded by a blank line
pub fn header(title: &str) {
    println!("\n{}", style(title).bold().underlined());
}

/// Indented `key: value` line with keys aligned
pub fn kv(key: &str, value: impl std::fmt::Display) {
    println!(
        "  {} {}",
        style(format!("{:<width$}", format!("{key}:"), width = KEY_WIDTH)).dim(),
        value
    );
}

/// Stage name colored by outcome
pub fn stage(stage: Stage) -> StyledObject<&'static str> {
    let name = style(stage.as_str());
    match stage {
        Stage::Completed => name.green(),
        Stage::Failed => name.red().bold(),
        Stage::Skipped => name.yellow(),
        Stage::Starting | Stage::Running => name.cyan(),
    }
}
