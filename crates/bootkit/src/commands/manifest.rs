//! Manifest authoring

use anyhow::{anyhow, Context as _, Result};
use bootkit_core::types::{ItemKind, Manifest, ManifestItem};
use bootkit_engine::verifier;
use camino::{Utf8Path, Utf8PathBuf};

use crate::cli::{GenerateArgs, ManifestCommands};
use crate::output;

pub fn run(command: ManifestCommands) -> Result<u8> {
    match command {
        ManifestCommands::Generate(args) => generate(args),
    }
}

fn generate(args: GenerateArgs) -> Result<u8> {
    let manifest = build_manifest(&args)?;
    if manifest.is_empty() {
        output::warning("No files given, writing an empty manifest");
    }

    let json = manifest.to_json_pretty()?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("Failed to write {}", args.output))?;

    output::success(&format!(
        "Wrote {} item(s) to {}",
        manifest.total_items(),
        args.output
    ));
    Ok(0)
}

fn build_manifest(args: &GenerateArgs) -> Result<Manifest> {
    let base_url = args.base_url.trim_end_matches('/');
    let item = |path: &Utf8PathBuf, kind: ItemKind| {
        describe(path, kind, base_url, &args.install_dir)
    };

    Ok(Manifest {
        preflight: args
            .preflight
            .iter()
            .map(|p| item(p, ItemKind::RootScript))
            .collect::<Result<_>>()?,
        setup: args
            .package
            .iter()
            .map(|p| item(p, ItemKind::Package))
            .collect::<Result<_>>()?,
        userland: args
            .userscript
            .iter()
            .map(|p| item(p, ItemKind::UserScript))
            .collect::<Result<_>>()?,
    })
}

fn describe(
    path: &Utf8Path,
    kind: ItemKind,
    base_url: &str,
    install_dir: &Utf8Path,
) -> Result<ManifestItem> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", path))?;
    let hash = verifier::file_digest(path.as_std_path())
        .with_context(|| format!("Failed to hash {}", path))?;
    let url = format!("{}/{}/{}", base_url, kind.as_str(), file_name);

    let mut item = ManifestItem::new(install_dir.join(file_name), url, hash, kind);
    item.name = Some(file_name.to_string());
    Ok(item)
}
