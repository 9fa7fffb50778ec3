//! Pre-run gate: has this version already provisioned the machine?

use anyhow::Result;
use bootkit_engine::StatusStore;

use crate::commands::Context;
use crate::output;

pub fn run(ctx: &Context) -> Result<u8> {
    Ok(check(&ctx.status_store(), bootkit_core::VERSION))
}

/// 0 when `version` already completed a run, 1 when a run is needed
fn check(store: &StatusStore, version: &str) -> u8 {
    match store.completion_marker() {
        Some(marker) if store.has_completed(version) => {
            output::info(&format!(
                "bootkit {} already completed on {} ({})",
                marker.last_run_version, marker.last_updated, marker.architecture
            ));
            0
        }
        Some(marker) => {
            output::info(&format!(
                "Last completed run was bootkit {}, a run is needed",
                marker.last_run_version
            ));
            1
        }
        None => {
            output::info("No completed run recorded, a run is needed");
            1
        }
    }
}
