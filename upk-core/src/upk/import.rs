use serde::Serialize;
use zerocopy::IntoBytes;

use crate::cursor::ByteCursor;
use crate::error::Result;
use crate::raw::ImportRaw;

use super::name::NameRef;
use super::reference::ObjectRef;

/// Reference to an object that lives in another package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    class_package: NameRef,
    class_name: NameRef,
    outer: ObjectRef,
    object_name: NameRef,
}

impl ImportEntry {
    pub const SIZE: usize = ImportRaw::SIZE;

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        ImportRaw::read(cursor).map(Self::from)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(ImportRaw::from(self.clone()).as_bytes());
        Ok(())
    }

    #[inline]
    pub fn class_package(&self) -> NameRef {
        self.class_package
    }

    #[inline]
    pub fn class_name(&self) -> NameRef {
        self.class_name
    }

    #[inline]
    pub fn outer(&self) -> ObjectRef {
        self.outer
    }

    #[inline]
    pub fn object_name(&self) -> NameRef {
        self.object_name
    }

    pub(crate) fn name_refs(&self) -> [NameRef; 3] {
        [self.class_package, self.class_name, self.object_name]
    }
}

impl From<ImportRaw> for ImportEntry {
    fn from(value: ImportRaw) -> Self {
        Self {
            class_package: NameRef::new(value.class_package_index, value.class_package_number),
            class_name: NameRef::new(value.class_name_index, value.class_name_number),
            outer: ObjectRef(value.outer_index),
            object_name: NameRef::new(value.object_name_index, value.object_name_number),
        }
    }
}

impl From<ImportEntry> for ImportRaw {
    fn from(value: ImportEntry) -> Self {
        Self {
            class_package_index: value.class_package.index,
            class_package_number: value.class_package.number,
            class_name_index: value.class_name.index,
            class_name_number: value.class_name.number,
            outer_index: value.outer.0,
            object_name_index: value.object_name.index,
            object_name_number: value.object_name.number,
        }
    }
}
