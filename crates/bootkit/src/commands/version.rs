//! `bootkit version`

use anyhow::{Context as _, Result};

use crate::cli::VersionArgs;
use crate::version::VersionInfo;

pub fn run(args: VersionArgs) -> Result<u8> {
    println!("{}", render(&VersionInfo::current(), args.json)?);
    Ok(0)
}

fn render(info: &VersionInfo, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(info).context("Failed to serialize version info")
    } else {
        Ok(info.to_string())
    }
}
