use byteorder::{LE, WriteBytesExt};
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::upk::{NameEntry, NameRef, ObjectIndex, ObjectRef, UString, version};

/// Version-dependent details of the tag encoding, captured at parse time so an object can be
/// written back without its package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropertyFormat {
    /// Bool values are stored as `u32` instead of `u8`.
    pub wide_bool: bool,
    /// Byte property tags carry the name of their enum.
    pub byte_enum_name: bool,
}

impl PropertyFormat {
    pub fn for_version(file_version: u16) -> Self {
        Self {
            wide_bool: file_version < version::BOOL_PROPERTY_BYTE,
            byte_enum_name: file_version >= version::BYTE_PROPERTY_ENUM,
        }
    }
}

/// Value of a byte property: a plain byte, or an enum entry stored as a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteValue {
    Byte(u8),
    Enum(NameRef),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Name(NameRef),
    /// Object, class, component and interface references.
    Object(ObjectRef),
    Str(UString),
    Byte {
        enum_name: Option<NameRef>,
        value: ByteValue,
    },
    Struct {
        struct_name: NameRef,
        data: Vec<u8>,
    },
    /// Arrays, maps, delegates and anything else kept as stored.
    Raw(Vec<u8>),
}

impl PropertyValue {
    /// Size recorded in the tag: the value bytes that follow the tag.
    pub fn tag_size(&self) -> usize {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Object(_) => 4,
            Self::Bool(_) => 0,
            Self::Name(_) => NameRef::SIZE,
            Self::Str(value) => value.encoded_len(),
            Self::Byte { value, .. } => match value {
                ByteValue::Byte(_) => 1,
                ByteValue::Enum(_) => NameRef::SIZE,
            },
            Self::Struct { data, .. } => data.len(),
            Self::Raw(data) => data.len(),
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    fn write_value(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Int(value) => out.write_i32::<LE>(*value)?,
            Self::Float(value) => out.write_f32::<LE>(*value)?,
            Self::Bool(_) => {}
            Self::Name(name) => name.write_to(out)?,
            Self::Object(object) => out.write_i32::<LE>(object.0)?,
            Self::Str(value) => value.write_to(out)?,
            Self::Byte { value, .. } => match value {
                ByteValue::Byte(byte) => out.push(*byte),
                ByteValue::Enum(name) => name.write_to(out)?,
            },
            Self::Struct { data, .. } | Self::Raw(data) => out.extend_from_slice(data),
        }
        Ok(())
    }
}

/// One tagged property of an export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    name: NameRef,
    type_name: NameRef,
    array_index: i32,
    value: PropertyValue,
}

impl Property {
    pub fn new(name: NameRef, type_name: NameRef, array_index: i32, value: PropertyValue) -> Self {
        Self {
            name,
            type_name,
            array_index,
            value,
        }
    }

    #[inline]
    pub fn name(&self) -> NameRef {
        self.name
    }

    #[inline]
    pub fn type_name(&self) -> NameRef {
        self.type_name
    }

    #[inline]
    pub fn array_index(&self) -> i32 {
        self.array_index
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Replace the value. The new value must be of the same kind as the old one.
    pub fn set_value(&mut self, value: PropertyValue) -> Result<()> {
        if !self.value.same_kind(&value) {
            return Err(UpkError::corrupt(format!(
                "cannot store {value:?} in a property holding {:?}",
                self.value
            )));
        }
        self.value = value;
        Ok(())
    }

    pub fn write_to(&self, out: &mut Vec<u8>, format: PropertyFormat) -> Result<()> {
        self.name.write_to(out)?;
        self.type_name.write_to(out)?;
        out.write_i32::<LE>(self.value.tag_size() as i32)?;
        out.write_i32::<LE>(self.array_index)?;

        match &self.value {
            PropertyValue::Struct { struct_name, .. } => struct_name.write_to(out)?,
            PropertyValue::Bool(value) if format.wide_bool => out.write_u32::<LE>(*value as u32)?,
            PropertyValue::Bool(value) => out.push(*value as u8),
            PropertyValue::Byte {
                enum_name: Some(enum_name),
                ..
            } => enum_name.write_to(out)?,
            _ => {}
        }

        self.value.write_value(out)
    }
}

/// Outcome of reading one tag.
pub(crate) enum NextTag {
    Property(Property),
    /// The `None` name closing the list.
    End(NameRef),
}

/// Tables a property list is resolved against.
pub(crate) struct PropertyContext<'a> {
    pub names: &'a [NameEntry],
    pub import_count: usize,
    pub export_count: usize,
    pub format: PropertyFormat,
}

impl PropertyContext<'_> {
    pub fn name(&self, name: NameRef) -> Result<&str> {
        usize::try_from(name.index)
            .ok()
            .and_then(|index| self.names.get(index))
            .map(NameEntry::name)
            .ok_or_else(|| UpkError::corrupt(format!("name index {} out of range", name.index)))
    }

    fn object(&self, object: ObjectRef) -> Result<ObjectRef> {
        let valid = match object.resolve() {
            ObjectIndex::Null => true,
            ObjectIndex::Export(index) => index < self.export_count,
            ObjectIndex::Import(index) => index < self.import_count,
        };
        if !valid {
            return Err(UpkError::corrupt(format!("object reference {} out of range", object.0)));
        }
        Ok(object)
    }

    pub fn read_property(&self, cursor: &mut ByteCursor) -> Result<NextTag> {
        let name = NameRef::read(cursor)?;
        if self.name(name)?.eq_ignore_ascii_case("None") {
            return Ok(NextTag::End(name));
        }

        let type_name = NameRef::read(cursor)?;
        let kind = self.name(type_name)?;
        let size = cursor.read_i32()?;
        let array_index = cursor.read_i32()?;
        let size =
            usize::try_from(size).map_err(|_| UpkError::corrupt(format!("{kind} tag with negative size {size}")))?;

        let value = match kind {
            "BoolProperty" => {
                let raw = if self.format.wide_bool {
                    cursor.read_u32()?
                } else {
                    cursor.read_u8()? as u32
                };
                if size != 0 || raw > 1 {
                    return Err(UpkError::corrupt(format!(
                        "bool property with size {size} and value {raw}"
                    )));
                }
                PropertyValue::Bool(raw == 1)
            }
            "StructProperty" => {
                let struct_name = NameRef::read(cursor)?;
                self.name(struct_name)?;
                PropertyValue::Struct {
                    struct_name,
                    data: cursor.read_bytes(size)?,
                }
            }
            "ByteProperty" => {
                let enum_name = if self.format.byte_enum_name {
                    let enum_name = NameRef::read(cursor)?;
                    self.name(enum_name)?;
                    Some(enum_name)
                } else {
                    None
                };
                let mut value = cursor.splice(cursor.position(), size)?;
                cursor.skip(size as i64)?;
                let value = match size {
                    1 => ByteValue::Byte(value.read_u8()?),
                    NameRef::SIZE => {
                        let name = NameRef::read(&mut value)?;
                        self.name(name)?;
                        ByteValue::Enum(name)
                    }
                    _ => return Err(UpkError::corrupt(format!("byte property with size {size}"))),
                };
                PropertyValue::Byte { enum_name, value }
            }
            _ => {
                let mut value = cursor.splice(cursor.position(), size)?;
                cursor.skip(size as i64)?;
                self.read_value(kind, &mut value)?
            }
        };

        Ok(NextTag::Property(Property {
            name,
            type_name,
            array_index,
            value,
        }))
    }

    fn read_value(&self, kind: &str, value: &mut ByteCursor) -> Result<PropertyValue> {
        let stored = value.len();
        let expect = |size: usize| {
            if stored != size {
                return Err(UpkError::corrupt(format!("{kind} holds {stored} bytes, expected {size}")));
            }
            Ok(())
        };

        let parsed = match kind {
            "IntProperty" => {
                expect(4)?;
                PropertyValue::Int(value.read_i32()?)
            }
            "FloatProperty" => {
                expect(4)?;
                PropertyValue::Float(value.read_f32()?)
            }
            "NameProperty" => {
                expect(NameRef::SIZE)?;
                let name = NameRef::read(value)?;
                self.name(name)?;
                PropertyValue::Name(name)
            }
            "ObjectProperty" | "ClassProperty" | "ComponentProperty" | "InterfaceProperty" => {
                expect(4)?;
                PropertyValue::Object(self.object(ObjectRef(value.read_i32()?))?)
            }
            "StrProperty" => {
                let string = UString::read(value)?;
                if value.remaining() != 0 {
                    return Err(UpkError::corrupt(format!(
                        "string property leaves {} bytes unread",
                        value.remaining()
                    )));
                }
                // strings that would not re-encode identically stay raw
                let mut encoded = Vec::with_capacity(value.len());
                string.write_to(&mut encoded)?;
                if encoded.as_slice() == value.as_slice() {
                    PropertyValue::Str(string)
                } else {
                    PropertyValue::Raw(value.as_slice().to_vec())
                }
            }
            _ => PropertyValue::Raw(value.as_slice().to_vec()),
        };

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use crate::upk::ObjectFlags;

    use super::*;

    const NAMES: [&str; 12] = [
        "None",
        "IntProperty",
        "Health",
        "BoolProperty",
        "bHidden",
        "StructProperty",
        "Vector",
        "Location",
        "ByteProperty",
        "Team",
        "ETeam",
        "StrProperty",
    ];

    fn names() -> Vec<NameEntry> {
        NAMES
            .iter()
            .map(|name| NameEntry::new(UString::new(*name), ObjectFlags::empty()))
            .collect()
    }

    fn name(value: &str) -> NameRef {
        NameRef::new(NAMES.iter().position(|n| *n == value).unwrap() as i32, 0)
    }

    fn context(names: &[NameEntry], file_version: u16) -> PropertyContext<'_> {
        PropertyContext {
            names,
            import_count: 2,
            export_count: 3,
            format: PropertyFormat::for_version(file_version),
        }
    }

    fn tag(out: &mut Vec<u8>, prop: &str, kind: &str, size: i32) {
        name(prop).write_to(out).unwrap();
        name(kind).write_to(out).unwrap();
        out.write_i32::<LE>(size).unwrap();
        out.write_i32::<LE>(0).unwrap();
    }

    fn read_all(bytes: Vec<u8>, file_version: u16) -> Result<Vec<Property>> {
        let names = names();
        let ctx = context(&names, file_version);
        let mut cursor = ByteCursor::new(bytes);
        let mut properties = Vec::new();
        while let NextTag::Property(property) = ctx.read_property(&mut cursor)? {
            properties.push(property);
        }
        Ok(properties)
    }

    fn write_all(properties: &[Property], file_version: u16) -> Vec<u8> {
        let mut out = Vec::new();
        for property in properties {
            property.write_to(&mut out, PropertyFormat::for_version(file_version)).unwrap();
        }
        name("None").write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_format_for_version() {
        assert_eq!(
            PropertyFormat::for_version(868),
            PropertyFormat {
                wide_bool: false,
                byte_enum_name: true
            }
        );
        assert_eq!(
            PropertyFormat::for_version(600),
            PropertyFormat {
                wide_bool: true,
                byte_enum_name: false
            }
        );
    }

    #[test]
    fn test_typed_values() {
        let mut bytes = Vec::new();
        tag(&mut bytes, "Health", "IntProperty", 4);
        bytes.write_i32::<LE>(150).unwrap();
        tag(&mut bytes, "bHidden", "BoolProperty", 0);
        bytes.push(1);
        tag(&mut bytes, "Location", "StructProperty", 12);
        name("Vector").write_to(&mut bytes).unwrap();
        bytes.extend_from_slice(&[0xAB; 12]);
        tag(&mut bytes, "Team", "ByteProperty", 8);
        name("ETeam").write_to(&mut bytes).unwrap();
        name("Health").write_to(&mut bytes).unwrap();
        name("None").write_to(&mut bytes).unwrap();

        let properties = read_all(bytes.clone(), 868).unwrap();
        assert_eq!(properties.len(), 4);
        assert_eq!(properties[0].value(), &PropertyValue::Int(150));
        assert_eq!(properties[1].value(), &PropertyValue::Bool(true));
        assert_eq!(
            properties[2].value(),
            &PropertyValue::Struct {
                struct_name: name("Vector"),
                data: vec![0xAB; 12]
            }
        );
        assert_eq!(
            properties[3].value(),
            &PropertyValue::Byte {
                enum_name: Some(name("ETeam")),
                value: ByteValue::Enum(name("Health"))
            }
        );

        assert_eq!(write_all(&properties, 868), bytes);
    }

    #[test]
    fn test_old_version_bool_and_byte() {
        let mut bytes = Vec::new();
        tag(&mut bytes, "bHidden", "BoolProperty", 0);
        bytes.write_u32::<LE>(0).unwrap();
        tag(&mut bytes, "Team", "ByteProperty", 1);
        bytes.push(3);
        name("None").write_to(&mut bytes).unwrap();

        let properties = read_all(bytes.clone(), 600).unwrap();
        assert_eq!(properties[0].value(), &PropertyValue::Bool(false));
        assert_eq!(
            properties[1].value(),
            &PropertyValue::Byte {
                enum_name: None,
                value: ByteValue::Byte(3)
            }
        );
        assert_eq!(write_all(&properties, 600), bytes);
    }

    #[test]
    fn test_size_mismatch() {
        let mut bytes = Vec::new();
        tag(&mut bytes, "Health", "IntProperty", 5);
        bytes.extend_from_slice(&[0; 5]);
        name("None").write_to(&mut bytes).unwrap();
        assert!(matches!(read_all(bytes, 868), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_bool_with_size() {
        let mut bytes = Vec::new();
        tag(&mut bytes, "bHidden", "BoolProperty", 4);
        bytes.push(1);
        assert!(matches!(read_all(bytes, 868), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_unresolved_name() {
        let mut bytes = Vec::new();
        NameRef::new(99, 0).write_to(&mut bytes).unwrap();
        assert!(matches!(read_all(bytes, 868), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_string_that_does_not_reencode_stays_raw() {
        let mut bytes = Vec::new();
        // a lone terminator decodes to the empty string, which encodes as length zero
        tag(&mut bytes, "Health", "StrProperty", 5);
        bytes.extend_from_slice(&[1, 0, 0, 0, 0]);
        name("None").write_to(&mut bytes).unwrap();

        let properties = read_all(bytes.clone(), 868).unwrap();
        assert_eq!(properties[0].value(), &PropertyValue::Raw(vec![1, 0, 0, 0, 0]));
        assert_eq!(write_all(&properties, 868), bytes);
    }

    #[test]
    fn test_set_value_kind() {
        let mut property = Property::new(name("Health"), name("IntProperty"), 0, PropertyValue::Int(1));
        property.set_value(PropertyValue::Int(7)).unwrap();
        assert_eq!(property.value(), &PropertyValue::Int(7));
        assert!(property.set_value(PropertyValue::Float(1.0)).is_err());
    }
}
