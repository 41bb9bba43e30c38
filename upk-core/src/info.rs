use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::upk::Package;

/// Metadata record of a package file, plus the modded packages rebuilt from it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageInfo {
    pub game_filename: PathBuf,
    pub file_size: u64,
    pub game_version: u16,
    pub export_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access: Option<SystemTime>,
    pub modded_files: Vec<PackageInfo>,
}

impl PackageInfo {
    pub fn from_package(path: impl AsRef<Path>, file_size: u64, package: &Package) -> Self {
        Self {
            game_filename: path.as_ref().to_path_buf(),
            file_size,
            game_version: package.header().version(),
            export_types: package.export_types(),
            notes: None,
            last_access: Some(SystemTime::now()),
            modded_files: Vec::new(),
        }
    }

    /// File name without its directory.
    pub fn filename(&self) -> Option<&str> {
        self.game_filename.file_name().and_then(|name| name.to_str())
    }

    pub fn is_modded(&self) -> bool {
        !self.modded_files.is_empty()
    }

    pub fn add_modded(&mut self, modded: PackageInfo) {
        self.modded_files.push(modded);
    }
}
