use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use rayon::prelude::*;
use upk_core::Package;
use upk_core::upk::ObjectRef;

use crate::ExtractCommand;

fn output_path(output: &Option<PathBuf>, input: &Path) -> PathBuf {
    if let Some(output) = output {
        // specified output directory
        output.clone()
    } else if let Some(parent) = input.parent() {
        // relative to input directory
        let dir_name = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or("output".to_string());
        parent.join(dir_name)
    } else {
        // current directory
        ".".into()
    }
}

/// `Outer.Name.Class`, with path separators replaced.
fn export_file_name(package: &Package, index: usize) -> String {
    let reference = ObjectRef::export(index);
    let path = package
        .object_path(reference)
        .unwrap_or_else(|| format!("export_{index}"));
    let class = package.class_name(index).unwrap_or_else(|_| "Unknown".to_string());
    format!("{path}.{class}").replace(['/', '\\', ':'], "_")
}

fn write_export(package: &Package, index: usize, output_path: &Path, r#override: bool) -> anyhow::Result<()> {
    let data = package.export_data(index)?;
    let filepath = output_path.join(export_file_name(package, index));

    let mut file = if r#override {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&filepath)?
    } else {
        OpenOptions::new().create_new(true).write(true).open(&filepath)?
    };
    file.write_all(data)?;
    Ok(())
}

pub fn extract(cmd: &ExtractCommand, no_mmap: bool) -> anyhow::Result<()> {
    let package = crate::load(&crate::repository(no_mmap), &cmd.input)?;

    let indices: Vec<usize> = match &cmd.name {
        Some(name) => package.find_exports(name).to_vec(),
        None => (0..package.exports().len()).collect(),
    };
    if indices.is_empty() {
        anyhow::bail!("No matching exports in `{}`", cmd.input.display());
    }

    let output_path = output_path(&cmd.output, &cmd.input);
    std::fs::create_dir_all(&output_path)?;

    let bar = ProgressBar::new(indices.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar().template("{pos}/{len} exports written {wide_bar} elapsed: {elapsed} eta: {eta}")?,
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.println(format!("Output directory: `{}`", output_path.display()));

    let errors = Mutex::new(Vec::new());
    indices.par_iter().try_for_each(|&index| -> anyhow::Result<()> {
        let result = write_export(&package, index, &output_path, cmd.r#override);
        bar.inc(1);
        match result {
            Err(e) if cmd.ignore_error => {
                bar.println(format!("Error writing export {index}: {e}"));
                errors.lock().push(index);
                Ok(())
            }
            other => other,
        }
    })?;

    bar.finish();

    let errors = errors.into_inner();
    if errors.is_empty() {
        println!("Done.");
    } else {
        println!("Done with {} errors", errors.len());
    }

    Ok(())
}
