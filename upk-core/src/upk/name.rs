use byteorder::{LE, WriteBytesExt};
use serde::Serialize;

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};

use super::flag::ObjectFlags;

/// Length-prefixed engine string.
///
/// A positive length means Latin-1 bytes, a negative length means UTF-16 code units; both
/// include a trailing NUL. The encoding is kept so the string writes back unchanged, as is
/// whether an empty string was stored as a bare length of zero or as a lone NUL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UString {
    value: String,
    #[serde(skip)]
    unicode: bool,
    #[serde(skip)]
    terminated_empty: bool,
}

impl UString {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let unicode = value.chars().any(|c| c as u32 > 0xFF);
        Self {
            value,
            unicode,
            terminated_empty: false,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[inline]
    pub fn is_unicode(&self) -> bool {
        self.unicode
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        let length = cursor.read_i32()?;
        if length == 0 {
            return Ok(Self::default());
        }

        if length > 0 {
            let bytes = cursor.read_slice(length as usize)?;
            return match bytes.split_last() {
                Some((0, chars)) => Ok(Self {
                    value: chars.iter().map(|&b| b as char).collect(),
                    unicode: false,
                    terminated_empty: chars.is_empty(),
                }),
                _ => Err(UpkError::corrupt("string is missing its NUL terminator")),
            };
        }

        let units = length.unsigned_abs() as usize;
        let bytes = cursor.read_slice(units * 2)?;
        let mut wide: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        if wide.pop() != Some(0) {
            return Err(UpkError::corrupt("string is missing its NUL terminator"));
        }
        let value = String::from_utf16(&wide).map_err(|_| UpkError::corrupt("invalid UTF-16 string"))?;

        Ok(Self {
            terminated_empty: value.is_empty(),
            value,
            unicode: true,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.is_bare_empty() {
            out.write_i32::<LE>(0)?;
            return Ok(());
        }

        if self.unicode {
            let wide: Vec<u16> = self.value.encode_utf16().collect();
            out.write_i32::<LE>(-(wide.len() as i32 + 1))?;
            for unit in wide {
                out.write_u16::<LE>(unit)?;
            }
            out.write_u16::<LE>(0)?;
        } else {
            out.write_i32::<LE>(self.value.chars().count() as i32 + 1)?;
            for c in self.value.chars() {
                out.push(c as u8);
            }
            out.push(0);
        }

        Ok(())
    }

    /// Serialized length in bytes, including the length prefix.
    pub fn encoded_len(&self) -> usize {
        match (self.is_bare_empty(), self.unicode) {
            (true, _) => 4,
            (false, true) => 4 + (self.value.encode_utf16().count() + 1) * 2,
            (false, false) => 4 + self.value.chars().count() + 1,
        }
    }

    /// Empty and stored as a zero length, with no terminator.
    fn is_bare_empty(&self) -> bool {
        self.value.is_empty() && !self.terminated_empty
    }
}

impl std::fmt::Display for UString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Reference into the name table: an index plus an instance number.
///
/// A non-zero number renders as `Name_{number - 1}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct NameRef {
    pub index: i32,
    pub number: i32,
}

impl NameRef {
    pub const SIZE: usize = 8;

    pub fn new(index: i32, number: i32) -> Self {
        Self { index, number }
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            index: cursor.read_i32()?,
            number: cursor.read_i32()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<LE>(self.index)?;
        out.write_i32::<LE>(self.number)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameEntry {
    name: UString,
    flags: ObjectFlags,
}

impl NameEntry {
    pub fn new(name: UString, flags: ObjectFlags) -> Self {
        Self { name, flags }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        let name = UString::read(cursor)?;
        let flags = ObjectFlags::from_bits_retain(cursor.read_u64()?);
        Ok(Self { name, flags })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        self.name.write_to(out)?;
        out.write_u64::<LE>(self.flags.bits())?;
        Ok(())
    }
}
