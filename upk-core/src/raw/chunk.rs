use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};

/// Header entry locating one compressed chunk of the package body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, serde::Serialize)]
#[repr(C)]
pub struct CompressedChunkRaw {
    pub uncompressed_offset: i32,
    pub uncompressed_size: i32,
    pub compressed_offset: i32,
    pub compressed_size: i32,
}

static_assertions::assert_eq_size!(CompressedChunkRaw, [u8; 16]);

impl CompressedChunkRaw {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Self::read_from_bytes(cursor.read_slice(Self::SIZE)?).map_err(|_| UpkError::corrupt("chunk record size"))
    }
}

/// Size pair preceding a chunk's blocks; the first pair summarizes the whole chunk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct BlockRaw {
    pub compressed_size: i32,
    pub uncompressed_size: i32,
}

static_assertions::assert_eq_size!(BlockRaw, [u8; 8]);

impl BlockRaw {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Self::read_from_bytes(cursor.read_slice(Self::SIZE)?).map_err(|_| UpkError::corrupt("block record size"))
    }
}
