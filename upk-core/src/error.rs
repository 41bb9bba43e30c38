use std::path::PathBuf;

use crate::upk::CompressionFlags;

pub type Result<T> = std::result::Result<T, UpkError>;

#[derive(Debug, thiserror::Error)]
pub enum UpkError {
    #[error("Upstream IO Error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Package not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Out of bounds: offset={offset}, length={length}, buffer_size={size}")]
    OutOfBounds { offset: i64, length: usize, size: usize },
    #[error("Corrupt data: {0}")]
    CorruptData(String),
    #[error("Invalid package signature: expected 0x{expected:08X}, found 0x{found:08X}")]
    InvalidSignature { expected: u32, found: u32 },
    #[error("Unsupported compression flags: 0x{0:X}")]
    UnsupportedCompression(CompressionFlags),

    #[error("Export index out of bounds: {0}")]
    ExportIndexOutOfBounds(usize),
    #[error("Property not found: {0}")]
    PropertyNotFound(String),
}

impl UpkError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptData(message.into())
    }

    /// Whether this error describes malformed package bytes rather than an environment failure.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::CorruptData(_) | Self::InvalidSignature { .. } | Self::UnsupportedCompression(_)
        )
    }
}
