//! Status record retention

use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::cli::CleanupArgs;
use crate::commands::Context;
use crate::output;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

pub fn run(args: CleanupArgs, ctx: &Context) -> Result<u8> {
    let store = ctx.status_store();
    output::info(&format!(
        "Removing status records completed more than {} days ago",
        args.max_age_days
    ));

    let age = Duration::from_secs(args.max_age_days.saturating_mul(SECONDS_PER_DAY));
    let removed = store
        .cleanup_older_than(age)
        .with_context(|| format!("Failed to clean {}", store.paths().status_file()))?;

    output::success(&format!("Removed {} status record(s)", removed));
    Ok(0)
}
