//! Show persisted phase status

use anyhow::{Context as _, Result};
use bootkit_engine::{PhaseRecord, StatusDocument};
use serde::Serialize;

use crate::cli::StatusArgs;
use crate::commands::Context;
use crate::output;

#[derive(Serialize)]
struct StatusReport<'a> {
    #[serde(flatten)]
    document: &'a StatusDocument,
    last_successful_run: Option<String>,
}

pub fn run(args: StatusArgs, ctx: &Context) -> Result<u8> {
    let store = ctx.status_store();
    let document = store
        .load()
        .with_context(|| format!("Failed to read {}", store.paths().status_file()))?;
    let last_successful_run = store.last_successful_run_marker();

    if args.json {
        let report = StatusReport {
            document: &document,
            last_successful_run,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    if document.is_empty() {
        output::info("No provisioning run recorded yet");
    }
    for record in document.records() {
        print_record(record);
    }

    println!();
    match last_successful_run {
        Some(version) => output::success(&format!("Last successful run: bootkit {}", version)),
        None => output::warning("No successful run recorded"),
    }
    Ok(0)
}

fn print_record(record: &PhaseRecord) {
    output::header(record.phase.as_str());
    output::kv("Stage", output::stage(record.stage));
    if let Some(start) = &record.start_time {
        output::kv("Started", start);
    }
    if let Some(done) = &record.completion_time {
        output::kv("Completed", done);
    }
    if let Some(code) = record.exit_code {
        output::kv("Exit code", code);
    }
    output::kv("Version", &record.version);
    output::kv("Architecture", &record.architecture);
    if let Some(error) = &record.last_error {
        output::kv("Last error", error);
    }
    output::kv("Run", &record.run_id);
}
