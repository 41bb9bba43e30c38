pub mod compression;
pub mod cursor;
pub mod error;
pub mod info;
pub mod object;
pub mod read;
pub mod rebuild;
pub mod repository;
pub mod upk;

mod raw;
mod serde_util;

pub use error::{Result, UpkError};
pub use upk::Package;
