use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use upk_core::info::PackageInfo;
use upk_core::object::ExportObject;
use upk_core::repository::{FileRepository, PackageRepository};

use crate::RebuildCommand;

/// Replacement files in `dir`, keyed by lowercase file stem.
fn collect_mods(dir: &Path) -> anyhow::Result<IndexMap<String, PathBuf>> {
    let mut mods = IndexMap::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(stem) = entry.path().file_stem() else {
            continue;
        };
        let stem = stem.to_string_lossy().to_lowercase();
        if let Some(previous) = mods.insert(stem, entry.path().to_path_buf()) {
            tracing::warn!(file = %previous.display(), "replacement shadowed by a later file with the same name");
        }
    }
    Ok(mods)
}

/// `<input dir>/mod/<file name>` unless given explicitly.
fn output_path(output: &Option<PathBuf>, input: &Path) -> PathBuf {
    if let Some(output) = output {
        return output.clone();
    }
    let file_name = input.file_name().map(PathBuf::from).unwrap_or_else(|| "package.upk".into());
    input.parent().unwrap_or(Path::new(".")).join("mod").join(file_name)
}

pub fn rebuild(cmd: &RebuildCommand, no_mmap: bool) -> anyhow::Result<()> {
    let repository = crate::repository(no_mmap);
    let mut package = crate::load(&repository, &cmd.input)?;
    let source_size = std::fs::metadata(&cmd.input)?.len();
    let mut info = PackageInfo::from_package(&cmd.input, source_size, &package);

    let mods = collect_mods(&cmd.mods).with_context(|| format!("Failed to read `{}`", cmd.mods.display()))?;
    let mut replacements = Vec::new();
    for (stem, path) in &mods {
        let indices = package.find_exports(stem);
        if indices.is_empty() {
            tracing::warn!(file = %path.display(), "no export named like this file");
            continue;
        }
        let data = std::fs::read(path).with_context(|| format!("Failed to read `{}`", path.display()))?;
        for &index in indices {
            let object = ExportObject::from_bytes(&package, index, data.clone())
                .with_context(|| format!("`{}` is not a valid payload for export {index}", path.display()))?;
            tracing::info!(index, file = %path.display(), "replacing export");
            replacements.push((index, object));
        }
    }
    if replacements.is_empty() {
        anyhow::bail!("No export in `{}` matches a file in `{}`", cmd.input.display(), cmd.mods.display());
    }

    let replaced = replacements.len();
    package.rebuild(replacements).context("Failed to rebuild package")?;

    let output = output_path(&cmd.output, &cmd.input);
    let writer = if cmd.no_encrypt {
        FileRepository::builder().encrypt_on_save(false).backend(repository.backend()).build()
    } else {
        repository
    };
    writer
        .save(&package, &output)
        .with_context(|| format!("Failed to write `{}`", output.display()))?;
    tracing::info!(replaced, output = %output.display(), "rebuilt package written");

    info.add_modded(PackageInfo::from_package(&output, package.data().len() as u64, &package));
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
