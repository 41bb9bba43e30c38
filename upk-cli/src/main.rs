use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use upk_core::Package;
use upk_core::info::PackageInfo;
use upk_core::repository::{FileRepository, PackageRepository, ReadBackend};

mod extract;
mod rebuild;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Read packages with regular file IO instead of memory mapping
    #[arg(long, global = true)]
    no_mmap: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the package header and table summary as JSON
    Info(InfoCommand),
    /// List the exports of a package
    List(ListCommand),
    /// Write export payloads to a directory
    Extract(ExtractCommand),
    /// Replace exports with files from a mods directory and write the rebuilt package
    Rebuild(RebuildCommand),
}

#[derive(Debug, Args)]
struct InfoCommand {
    /// Input package path
    input: PathBuf,
}

#[derive(Debug, Args)]
struct ListCommand {
    /// Input package path
    input: PathBuf,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ExtractCommand {
    /// Input package path
    pub input: PathBuf,
    /// Output directory path
    pub output: Option<PathBuf>,
    /// Only extract exports with this name (case-insensitive)
    #[arg(short, long)]
    pub name: Option<String>,
    /// Override existing files
    #[arg(long, default_value_t = false)]
    pub r#override: bool,
    /// Continue extracting when an export fails
    #[arg(long, default_value_t = false)]
    pub ignore_error: bool,
}

#[derive(Debug, Args)]
pub struct RebuildCommand {
    /// Input package path
    pub input: PathBuf,
    /// Directory holding replacement payloads named after their exports
    pub mods: PathBuf,
    /// Output package path, `<input dir>/mod/<file name>` by default
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Write the package unencrypted even if the source was encrypted
    #[arg(long, default_value_t = false)]
    pub no_encrypt: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    info: PackageInfo,
    header: &'a upk_core::upk::Header,
    origin: upk_core::upk::PackageOrigin,
    names: usize,
    imports: usize,
    exports: usize,
}

#[derive(Serialize)]
struct ExportRow {
    index: usize,
    name: String,
    class: String,
    path: String,
    offset: usize,
    size: usize,
}

pub(crate) fn repository(no_mmap: bool) -> FileRepository {
    let backend = if no_mmap { ReadBackend::File } else { ReadBackend::Mmap };
    FileRepository::builder().backend(backend).build()
}

pub(crate) fn load(repository: &FileRepository, input: &PathBuf) -> anyhow::Result<Package> {
    repository
        .load(input)
        .with_context(|| format!("Failed to load package `{}`", input.display()))
}

fn info(cmd: &InfoCommand, no_mmap: bool) -> anyhow::Result<()> {
    let package = load(&repository(no_mmap), &cmd.input)?;
    let file_size = std::fs::metadata(&cmd.input)?.len();
    let summary = Summary {
        info: PackageInfo::from_package(&cmd.input, file_size, &package),
        header: package.header(),
        origin: package.origin(),
        names: package.names().len(),
        imports: package.imports().len(),
        exports: package.exports().len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn export_rows(package: &Package) -> Vec<ExportRow> {
    package
        .exports()
        .iter()
        .enumerate()
        .map(|(index, export)| {
            let reference = upk_core::upk::ObjectRef::export(index);
            ExportRow {
                index,
                name: package.object_name(reference).unwrap_or_default(),
                class: package.class_name(index).unwrap_or_else(|_| "?".to_string()),
                path: package.object_path(reference).unwrap_or_default(),
                offset: export.serial_offset(),
                size: export.serial_size(),
            }
        })
        .collect()
}

fn list(cmd: &ListCommand, no_mmap: bool) -> anyhow::Result<()> {
    let package = load(&repository(no_mmap), &cmd.input)?;
    let rows = export_rows(&package);
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in rows {
        println!(
            "{:>5} {:>10} {:>8}  {:<24} {}",
            row.index, row.offset, row.size, row.class, row.path
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Info(cmd) => info(cmd, cli.no_mmap),
        Command::List(cmd) => list(cmd, cli.no_mmap),
        Command::Extract(cmd) => extract::extract(cmd, cli.no_mmap),
        Command::Rebuild(cmd) => rebuild::rebuild(cmd, cli.no_mmap),
    }
}
