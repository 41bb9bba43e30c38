use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};

#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ImportRaw {
    pub class_package_index: i32,
    pub class_package_number: i32,
    pub class_name_index: i32,
    pub class_name_number: i32,
    pub outer_index: i32,
    pub object_name_index: i32,
    pub object_name_number: i32,
}

static_assertions::assert_eq_size!(ImportRaw, [u8; 28]);

impl ImportRaw {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Self::read_from_bytes(cursor.read_slice(Self::SIZE)?).map_err(|_| UpkError::corrupt("import record size"))
    }
}
