//! bootkit - manifest-driven provisioning for freshly enrolled Macs

mod cli;
mod commands;
mod output;
mod version;

use std::process::ExitCode;

use bootkit_core::Paths;
use clap::Parser;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use commands::Context;

#[tokio::main]
async fn main() -> ExitCode {
    // reqwest's rustls backend needs a process-wide provider before the first request
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let ctx = Context::new(cli.preferences.clone(), cli.base_dir.clone());

    // Only provisioning runs keep a session log under the base directory
    let session_paths = match &cli.command {
        Commands::Run(_) => Some(ctx.paths()),
        _ => None,
    };
    let _guard = init_tracing(cli.verbose, cli.quiet, session_paths.as_ref());

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args, &ctx, cli.quiet, cli.verbose > 0).await,
        Commands::Status(args) => commands::status::run(args, &ctx),
        Commands::Gate => commands::gate::run(&ctx),
        Commands::Cleanup(args) => commands::cleanup::run(args, &ctx),
        Commands::Manifest(command) => commands::manifest::run(command),
        Commands::Version(args) => commands::version::run(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Console logging, plus a session log file for provisioning runs
///
/// When `paths` is given, a plain-text copy of every event also goes to
/// `<base>/logs/<yyyy-MM-dd-HHmmss>.log`. The returned guard flushes that
/// file on drop.
fn init_tracing(verbose: u8, quiet: bool, paths: Option<&Paths>) -> Option<WorkerGuard> {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_env("BOOTKIT_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match paths.and_then(session_log_writer) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(writer),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn session_log_writer(paths: &Paths) -> Option<(NonBlocking, WorkerGuard)> {
    let dir = paths.logs_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Session log disabled, cannot create {}: {}", dir, e);
        return None;
    }
    let stamp = chrono::Local::now().format("%Y-%m-%d-%H%M%S").to_string();
    let file = paths.session_log_file(&stamp);
    let appender = tracing_appender::rolling::never(&dir, file.file_name()?);
    Some(tracing_appender::non_blocking(appender))
}
