//! Loading packages from disk and writing them back.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::upk::Package;

/// Storage a package is loaded from and saved to.
pub trait PackageRepository {
    fn load(&self, path: &Path) -> Result<Package>;

    fn save(&self, package: &Package, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadBackend {
    /// Use `memmap2` memory mapping.
    #[default]
    Mmap,
    /// Use regular file IO.
    File,
}

#[derive(Debug)]
pub struct FileRepositoryBuilder {
    backend: ReadBackend,
    encrypt_on_save: bool,
}

impl Default for FileRepositoryBuilder {
    fn default() -> Self {
        Self {
            backend: ReadBackend::default(),
            encrypt_on_save: true,
        }
    }
}

impl FileRepositoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: ReadBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn mmap(mut self, enabled: bool) -> Self {
        self.backend = if enabled { ReadBackend::Mmap } else { ReadBackend::File };
        self
    }

    /// Re-encrypt packages that were encrypted when loaded. Enabled by default.
    pub fn encrypt_on_save(mut self, enabled: bool) -> Self {
        self.encrypt_on_save = enabled;
        self
    }

    pub fn build(self) -> FileRepository {
        FileRepository {
            backend: self.backend,
            encrypt_on_save: self.encrypt_on_save,
        }
    }
}

/// Package files on the local file system.
///
/// Saved packages are never recompressed: the body written is the uncompressed one held by
/// the package.
#[derive(Debug, Clone)]
pub struct FileRepository {
    backend: ReadBackend,
    encrypt_on_save: bool,
}

impl Default for FileRepository {
    fn default() -> Self {
        FileRepositoryBuilder::default().build()
    }
}

impl FileRepository {
    pub fn builder() -> FileRepositoryBuilder {
        FileRepositoryBuilder::new()
    }

    pub fn backend(&self) -> ReadBackend {
        self.backend
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UpkError::NotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(UpkError::IO(std::io::Error::new(
                    e.kind(),
                    format!("{}: {}", path.display(), e),
                )));
            }
        };

        match self.backend {
            ReadBackend::Mmap => {
                if file.metadata()?.len() == 0 {
                    return Ok(Vec::new());
                }
                // SAFETY: read-only mapping, copied out before the file is released.
                let mmap = unsafe { MmapOptions::new().map(&file)? };
                Ok(mmap.to_vec())
            }
            ReadBackend::File => {
                let mut bytes = Vec::new();
                let mut file = file;
                file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl PackageRepository for FileRepository {
    fn load(&self, path: &Path) -> Result<Package> {
        let bytes = self.read_bytes(path)?;
        tracing::debug!(path = %path.display(), size = bytes.len(), backend = ?self.backend, "loading package");
        Package::from_bytes(bytes)
    }

    fn save(&self, package: &Package, path: &Path) -> Result<()> {
        let encrypt = package.origin().encrypted && self.encrypt_on_save;
        let mut cursor = ByteCursor::new(package.data().to_vec());
        if encrypt {
            cursor.decrypt();
        }

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let temp = temp_path(path);
        let written = File::create(&temp).and_then(|mut file| {
            file.write_all(cursor.as_slice())?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| std::fs::rename(&temp, path)) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), size = cursor.len(), encrypt, "saved package");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path() {
        assert_eq!(temp_path(Path::new("dir/Startup.upk")), PathBuf::from("dir/Startup.upk.tmp"));
    }

    #[test]
    fn test_builder_defaults() {
        let repository = FileRepository::builder().build();
        assert_eq!(repository.backend(), ReadBackend::Mmap);
        assert!(repository.encrypt_on_save);

        let repository = FileRepository::builder().mmap(false).encrypt_on_save(false).build();
        assert_eq!(repository.backend(), ReadBackend::File);
        assert!(!repository.encrypt_on_save);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("upk-core-missing").join("Nothing.upk");
        let err = FileRepository::default().load(&path).unwrap_err();
        assert!(matches!(err, UpkError::NotFound(p) if p == path));
    }
}
