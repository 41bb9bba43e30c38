//! Typed view of an export's serialized payload.

mod property;

use byteorder::{LE, WriteBytesExt};

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::upk::{NameRef, Package};

pub use property::{ByteValue, Property, PropertyFormat, PropertyValue};
use property::{NextTag, PropertyContext};

/// Classes whose payload is script bytecode or type metadata rather than a property list.
const STRUCTURAL_CLASSES: [&str; 7] = ["Class", "Function", "State", "Enum", "Const", "ScriptStruct", "Struct"];

fn is_structural(class_name: &str) -> bool {
    STRUCTURAL_CLASSES.contains(&class_name) || class_name.ends_with("Property")
}

/// Parsed payload of one export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportObject {
    /// Payload kept exactly as stored.
    Raw(Vec<u8>),
    Tagged(TaggedObject),
}

/// Net index, tagged property list and the class-specific data that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedObject {
    net_index: i32,
    properties: Vec<Property>,
    terminator: NameRef,
    tail: Vec<u8>,
    format: PropertyFormat,
}

impl TaggedObject {
    #[inline]
    pub fn net_index(&self) -> i32 {
        self.net_index
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Vec<Property> {
        &mut self.properties
    }

    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    #[inline]
    pub fn format(&self) -> PropertyFormat {
        self.format
    }

    fn read(cursor: &mut ByteCursor, context: &PropertyContext<'_>) -> Result<Self> {
        let net_index = cursor.read_i32()?;
        let mut properties = Vec::new();
        let terminator = loop {
            match context.read_property(cursor)? {
                NextTag::Property(property) => properties.push(property),
                NextTag::End(terminator) => break terminator,
            }
        };
        let tail = cursor.read_bytes(cursor.remaining())?;

        Ok(Self {
            net_index,
            properties,
            terminator,
            tail,
            format: context.format,
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<LE>(self.net_index)?;
        for property in &self.properties {
            property.write_to(out, self.format)?;
        }
        self.terminator.write_to(out)?;
        out.extend_from_slice(&self.tail);
        Ok(())
    }
}

impl ExportObject {
    /// Parse the stored payload of export `index`.
    pub fn parse(package: &Package, index: usize) -> Result<Self> {
        let data = package.export_data(index)?.to_vec();
        Self::decode(package, index, data)
    }

    /// Build the object for export `index` from externally supplied payload bytes.
    ///
    /// The bytes go through the same parser as stored payloads, so malformed input is rejected
    /// before it can reach a rebuild.
    pub fn from_bytes(package: &Package, index: usize, data: Vec<u8>) -> Result<Self> {
        Self::decode(package, index, data)
    }

    fn decode(package: &Package, index: usize, data: Vec<u8>) -> Result<Self> {
        let class_name = package.class_name(index)?;
        if is_structural(&class_name) {
            tracing::trace!(index, class = %class_name, "keeping structural export raw");
            return Ok(Self::Raw(data));
        }

        let context = PropertyContext {
            names: package.names(),
            import_count: package.imports().len(),
            export_count: package.exports().len(),
            format: PropertyFormat::for_version(package.header().version()),
        };
        let mut cursor = ByteCursor::new(data);
        let object = TaggedObject::read(&mut cursor, &context).map_err(|e| match e {
            UpkError::OutOfBounds { .. } => UpkError::corrupt(format!("export {index} ({class_name}): {e}")),
            other => other,
        })?;

        tracing::trace!(
            index,
            class = %class_name,
            properties = object.properties.len(),
            "parsed export"
        );
        Ok(Self::Tagged(object))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Raw(data) => {
                out.extend_from_slice(data);
                Ok(())
            }
            Self::Tagged(object) => object.write_to(out),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, Self::Tagged(_))
    }

    /// Tagged properties; empty for raw objects.
    pub fn properties(&self) -> &[Property] {
        match self {
            Self::Raw(_) => &[],
            Self::Tagged(object) => object.properties(),
        }
    }

    /// First property whose name matches, ignoring case.
    pub fn find_property(&self, package: &Package, name: &str) -> Option<&Property> {
        self.properties().iter().find(|property| {
            package
                .name(property.name())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
        })
    }

    /// Replace the value of the first property named `name`.
    pub fn set_property(&mut self, package: &Package, name: &str, value: PropertyValue) -> Result<()> {
        let Self::Tagged(object) = self else {
            return Err(UpkError::PropertyNotFound(name.to_string()));
        };
        let property = object
            .properties
            .iter_mut()
            .find(|property| {
                package
                    .name(property.name())
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| UpkError::PropertyNotFound(name.to_string()))?;
        property.set_value(value)
    }

    /// Data after the property list, or the whole payload of a raw object.
    pub fn tail(&self) -> &[u8] {
        match self {
            Self::Raw(data) => data,
            Self::Tagged(object) => object.tail(),
        }
    }

    pub fn set_tail(&mut self, tail: Vec<u8>) {
        match self {
            Self::Raw(data) => *data = tail,
            Self::Tagged(object) => object.tail = tail,
        }
    }
}
