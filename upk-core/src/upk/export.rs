use byteorder::{LE, WriteBytesExt};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::object::ExportObject;
use crate::serde_util::serialize_guid;

use super::flag::{ExportFlags, ObjectFlags, PackageFlags};
use super::header::read_count;
use super::name::NameRef;
use super::reference::ObjectRef;
use super::version;

/// An object defined in this package, plus the location of its serialized payload.
///
/// The entry owns at most one parsed [`ExportObject`], filled on first access.
#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    class: ObjectRef,
    super_ref: ObjectRef,
    outer: ObjectRef,
    object_name: NameRef,
    archetype: ObjectRef,
    object_flags: ObjectFlags,
    serial_size: i32,
    serial_offset: i32,
    component_map: Vec<(NameRef, i32)>,
    export_flags: ExportFlags,
    net_objects: Vec<i32>,
    #[serde(serialize_with = "serialize_guid")]
    package_guid: [u8; 16],
    package_flags: PackageFlags,
    #[serde(skip)]
    object: OnceCell<ExportObject>,
}

impl ExportEntry {
    pub fn read(cursor: &mut ByteCursor, file_version: u16) -> Result<Self> {
        let class = ObjectRef(cursor.read_i32()?);
        let super_ref = ObjectRef(cursor.read_i32()?);
        let outer = ObjectRef(cursor.read_i32()?);
        let object_name = NameRef::read(cursor)?;
        let archetype = ObjectRef(cursor.read_i32()?);
        let object_flags = ObjectFlags::from_bits_retain(cursor.read_u64()?);
        let serial_size = cursor.read_i32()?;
        let serial_offset = cursor.read_i32()?;
        if serial_size < 0 || serial_offset < 0 {
            return Err(UpkError::corrupt(format!(
                "negative export range: offset={serial_offset}, size={serial_size}"
            )));
        }

        let mut component_map = Vec::new();
        if file_version < version::COMPONENT_MAP_REMOVED {
            let count = read_count(cursor, 12, "component map")?;
            for _ in 0..count {
                component_map.push((NameRef::read(cursor)?, cursor.read_i32()?));
            }
        }

        let export_flags = ExportFlags::from_bits_retain(cursor.read_u32()?);

        let mut net_objects = Vec::new();
        if file_version >= version::NET_OBJECT_COUNT {
            let count = read_count(cursor, 4, "net object")?;
            net_objects.reserve(count);
            for _ in 0..count {
                net_objects.push(cursor.read_i32()?);
            }
        }

        let package_guid = cursor.read_guid()?;
        let package_flags = PackageFlags::from_bits_retain(cursor.read_u32()?);

        Ok(Self {
            class,
            super_ref,
            outer,
            object_name,
            archetype,
            object_flags,
            serial_size,
            serial_offset,
            component_map,
            export_flags,
            net_objects,
            package_guid,
            package_flags,
            object: OnceCell::new(),
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>, file_version: u16) -> Result<()> {
        out.write_i32::<LE>(self.class.0)?;
        out.write_i32::<LE>(self.super_ref.0)?;
        out.write_i32::<LE>(self.outer.0)?;
        self.object_name.write_to(out)?;
        out.write_i32::<LE>(self.archetype.0)?;
        out.write_u64::<LE>(self.object_flags.bits())?;
        out.write_i32::<LE>(self.serial_size)?;
        out.write_i32::<LE>(self.serial_offset)?;

        if file_version < version::COMPONENT_MAP_REMOVED {
            out.write_i32::<LE>(self.component_map.len() as i32)?;
            for (name, index) in &self.component_map {
                name.write_to(out)?;
                out.write_i32::<LE>(*index)?;
            }
        }

        out.write_u32::<LE>(self.export_flags.bits())?;

        if file_version >= version::NET_OBJECT_COUNT {
            out.write_i32::<LE>(self.net_objects.len() as i32)?;
            for count in &self.net_objects {
                out.write_i32::<LE>(*count)?;
            }
        }

        out.extend_from_slice(&self.package_guid);
        out.write_u32::<LE>(self.package_flags.bits())?;
        Ok(())
    }

    #[inline]
    pub fn class(&self) -> ObjectRef {
        self.class
    }

    #[inline]
    pub fn super_ref(&self) -> ObjectRef {
        self.super_ref
    }

    #[inline]
    pub fn outer(&self) -> ObjectRef {
        self.outer
    }

    #[inline]
    pub fn object_name(&self) -> NameRef {
        self.object_name
    }

    #[inline]
    pub fn archetype(&self) -> ObjectRef {
        self.archetype
    }

    #[inline]
    pub fn object_flags(&self) -> ObjectFlags {
        self.object_flags
    }

    #[inline]
    pub fn serial_offset(&self) -> usize {
        self.serial_offset as usize
    }

    #[inline]
    pub fn serial_size(&self) -> usize {
        self.serial_size as usize
    }

    #[inline]
    pub fn export_flags(&self) -> ExportFlags {
        self.export_flags
    }

    pub fn net_objects(&self) -> &[i32] {
        &self.net_objects
    }

    #[inline]
    pub fn package_guid(&self) -> [u8; 16] {
        self.package_guid
    }

    /// The attached object, if this export has been parsed.
    pub fn object(&self) -> Option<&ExportObject> {
        self.object.get()
    }

    #[inline]
    pub fn is_parsed(&self) -> bool {
        self.object.get().is_some()
    }

    pub(crate) fn object_cell(&self) -> &OnceCell<ExportObject> {
        &self.object
    }

    pub(crate) fn take_object(&mut self) -> Option<ExportObject> {
        self.object.take()
    }

    pub(crate) fn references(&self) -> [ObjectRef; 4] {
        [self.class, self.super_ref, self.outer, self.archetype]
    }

    /// Copy of this entry pointing at a new payload location, without the cached object.
    pub(crate) fn relocated(&self, offset: usize, size: usize) -> Self {
        Self {
            serial_offset: offset as i32,
            serial_size: size as i32,
            component_map: self.component_map.clone(),
            net_objects: self.net_objects.clone(),
            object: OnceCell::new(),
            ..*self
        }
    }
}
