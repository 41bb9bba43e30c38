//! Fixed-layout on-disk records, read and written as plain bytes.

mod chunk;
mod import;

pub use chunk::*;
pub use import::*;
