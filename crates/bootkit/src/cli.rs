//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// bootkit - manifest-driven provisioning for freshly enrolled Macs
#[derive(Parser, Debug)]
#[command(name = "bootkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, visible_alias = "silent")]
    pub quiet: bool,

    /// Managed preference file to read settings from
    #[arg(long, global = true, value_name = "FILE")]
    pub preferences: Option<Utf8PathBuf>,

    /// Directory holding logs, cache and status records
    #[arg(long, global = true, value_name = "DIR", env = "BOOTKIT_BASE_DIR")]
    pub base_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the manifest and run every provisioning phase
    Run(RunArgs),

    /// Show the persisted phase status
    Status(StatusArgs),

    /// Exit 0 when this version already completed a run, 1 otherwise
    Gate,

    /// Remove finished status records older than a retention window
    Cleanup(CleanupArgs),

    /// Manifest authoring tools
    #[command(subcommand)]
    Manifest(ManifestCommands),

    /// Show version information
    Version(VersionArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Manifest URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Authorization header value sent with every request
    #[arg(long, value_name = "HEADER")]
    pub headers: Option<String>,

    /// Follow HTTP redirects
    #[arg(long)]
    pub follow_redirects: bool,

    /// Log every action without downloading or executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Restart the machine after a successful run
    #[arg(long)]
    pub reboot: bool,

    /// Only run the userland user scripts (used by the per-user agent)
    #[arg(long)]
    pub userscript: bool,

    /// Keep downloaded payloads after a successful run
    #[arg(long)]
    pub retain_cache: bool,

    /// Do not launch the progress dialog
    #[arg(long)]
    pub no_dialog: bool,

    /// Progress dialog title
    #[arg(long, value_name = "TITLE")]
    pub dialog_title: Option<String>,

    /// Progress dialog message
    #[arg(long, value_name = "MESSAGE")]
    pub dialog_message: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Remove records completed more than this many days ago
    #[arg(long, default_value = "30")]
    pub max_age_days: u64,
}

#[derive(Subcommand, Debug)]
pub enum ManifestCommands {
    /// Write a manifest for local files, hashing each one
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// URL the payloads will be published under
    #[arg(long, value_name = "URL")]
    pub base_url: String,

    /// Directory items are downloaded to on the target machine
    #[arg(long, value_name = "DIR", default_value = "/Library/Managed Bootstrap/cache")]
    pub install_dir: Utf8PathBuf,

    /// Preflight root script
    #[arg(long, value_name = "FILE")]
    pub preflight: Vec<Utf8PathBuf>,

    /// Package installed during the setup assistant phase
    #[arg(long, value_name = "FILE")]
    pub package: Vec<Utf8PathBuf>,

    /// User script run in the userland phase
    #[arg(long, value_name = "FILE")]
    pub userscript: Vec<Utf8PathBuf>,

    /// Where to write the manifest
    #[arg(short, long, value_name = "FILE")]
    pub output: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
