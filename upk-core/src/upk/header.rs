use byteorder::{LE, WriteBytesExt};
use serde::Serialize;
use zerocopy::IntoBytes;

use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::raw::CompressedChunkRaw;
use crate::serde_util::{serialize_guid, serialize_u32_hex};

use super::flag::{CompressionFlags, PackageFlags};
use super::name::UString;
use super::version;

pub const PACKAGE_SIGNATURE: u32 = 0x9E2A83C1;

/// Package summary at the start of every package.
///
/// Fields introduced after the package's file version are absent on disk; they read as zero
/// and are never written back.
#[derive(Debug, Clone, Serialize)]
pub struct Header {
    #[serde(serialize_with = "serialize_u32_hex")]
    signature: u32,
    version: u16,
    licensee: u16,
    header_size: i32,
    folder_name: UString,
    package_flags: PackageFlags,
    name_count: i32,
    name_offset: i32,
    export_count: i32,
    export_offset: i32,
    import_count: i32,
    import_offset: i32,
    depends_offset: i32,
    import_export_guids_offset: i32,
    import_guid_count: i32,
    export_guid_count: i32,
    thumbnail_table_offset: i32,
    #[serde(serialize_with = "serialize_guid")]
    guid: [u8; 16],
    generations: Vec<Generation>,
    engine_version: u32,
    cooker_version: u32,
    compression_flags: CompressionFlags,
    compressed_chunks: Vec<CompressedChunkRaw>,
    package_source: u32,
    additional_packages: Vec<UString>,
    texture_allocations: Vec<TextureAllocation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub export_count: i32,
    pub name_count: i32,
    pub net_object_count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextureAllocation {
    pub size_x: i32,
    pub size_y: i32,
    pub num_mips: i32,
    pub format: u32,
    pub create_flags: u32,
    pub export_indices: Vec<i32>,
}

/// Reads a signed element count, rejecting negative values and counts that cannot fit in the
/// remaining bytes.
pub(crate) fn read_count(cursor: &mut ByteCursor, element_size: usize, what: &str) -> Result<usize> {
    let count = cursor.read_i32()?;
    if count < 0 || (count as usize).saturating_mul(element_size) > cursor.remaining() {
        return Err(UpkError::corrupt(format!("invalid {what} count {count}")));
    }
    Ok(count as usize)
}

impl Header {
    pub fn read(cursor: &mut ByteCursor) -> Result<Self> {
        let signature = cursor.read_u32()?;
        if signature != PACKAGE_SIGNATURE {
            return Err(UpkError::InvalidSignature {
                expected: PACKAGE_SIGNATURE,
                found: signature,
            });
        }
        let version = cursor.read_u16()?;
        let licensee = cursor.read_u16()?;
        let at_least = |v: u16| version >= v;

        let header_size = if at_least(version::TOTAL_HEADER_SIZE) { cursor.read_i32()? } else { 0 };
        let folder_name = if at_least(version::FOLDER_NAME) {
            UString::read(cursor)?
        } else {
            UString::default()
        };
        let package_flags = PackageFlags::from_bits_retain(cursor.read_u32()?);

        let name_count = cursor.read_i32()?;
        let name_offset = cursor.read_i32()?;
        let export_count = cursor.read_i32()?;
        let export_offset = cursor.read_i32()?;
        let import_count = cursor.read_i32()?;
        let import_offset = cursor.read_i32()?;
        let depends_offset = if at_least(version::DEPENDS_OFFSET) { cursor.read_i32()? } else { 0 };

        let (import_export_guids_offset, import_guid_count, export_guid_count) =
            if at_least(version::IMPORT_EXPORT_GUIDS) {
                (cursor.read_i32()?, cursor.read_i32()?, cursor.read_i32()?)
            } else {
                (0, 0, 0)
            };
        let thumbnail_table_offset = if at_least(version::THUMBNAIL_TABLE) { cursor.read_i32()? } else { 0 };

        let guid = cursor.read_guid()?;

        let generation_size = if at_least(version::NET_OBJECT_COUNT) { 12 } else { 8 };
        let generation_count = read_count(cursor, generation_size, "generation")?;
        let mut generations = Vec::with_capacity(generation_count);
        for _ in 0..generation_count {
            generations.push(Generation {
                export_count: cursor.read_i32()?,
                name_count: cursor.read_i32()?,
                net_object_count: if at_least(version::NET_OBJECT_COUNT) { cursor.read_i32()? } else { 0 },
            });
        }

        let engine_version = if at_least(version::ENGINE_VERSION) { cursor.read_u32()? } else { 0 };
        let cooker_version = if at_least(version::COOKER_VERSION) { cursor.read_u32()? } else { 0 };

        let mut compression_flags = CompressionFlags::empty();
        let mut compressed_chunks = Vec::new();
        if at_least(version::COMPRESSION) {
            compression_flags = CompressionFlags::from_bits_retain(cursor.read_u32()?);
            let chunk_count = read_count(cursor, CompressedChunkRaw::SIZE, "compressed chunk")?;
            for _ in 0..chunk_count {
                compressed_chunks.push(CompressedChunkRaw::read(cursor)?);
            }
        }

        let package_source = if at_least(version::PACKAGE_SOURCE) { cursor.read_u32()? } else { 0 };

        let mut additional_packages = Vec::new();
        if at_least(version::ADDITIONAL_PACKAGES) {
            let count = read_count(cursor, 4, "additional package")?;
            for _ in 0..count {
                additional_packages.push(UString::read(cursor)?);
            }
        }

        let mut texture_allocations = Vec::new();
        if at_least(version::TEXTURE_ALLOCATIONS) {
            let count = read_count(cursor, 24, "texture allocation")?;
            for _ in 0..count {
                let size_x = cursor.read_i32()?;
                let size_y = cursor.read_i32()?;
                let num_mips = cursor.read_i32()?;
                let format = cursor.read_u32()?;
                let create_flags = cursor.read_u32()?;
                let index_count = read_count(cursor, 4, "texture export index")?;
                let mut export_indices = Vec::with_capacity(index_count);
                for _ in 0..index_count {
                    export_indices.push(cursor.read_i32()?);
                }
                texture_allocations.push(TextureAllocation {
                    size_x,
                    size_y,
                    num_mips,
                    format,
                    create_flags,
                    export_indices,
                });
            }
        }

        Ok(Self {
            signature,
            version,
            licensee,
            header_size,
            folder_name,
            package_flags,
            name_count,
            name_offset,
            export_count,
            export_offset,
            import_count,
            import_offset,
            depends_offset,
            import_export_guids_offset,
            import_guid_count,
            export_guid_count,
            thumbnail_table_offset,
            guid,
            generations,
            engine_version,
            cooker_version,
            compression_flags,
            compressed_chunks,
            package_source,
            additional_packages,
            texture_allocations,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let at_least = |v: u16| self.version >= v;

        out.write_u32::<LE>(self.signature)?;
        out.write_u16::<LE>(self.version)?;
        out.write_u16::<LE>(self.licensee)?;
        if at_least(version::TOTAL_HEADER_SIZE) {
            out.write_i32::<LE>(self.header_size)?;
        }
        if at_least(version::FOLDER_NAME) {
            self.folder_name.write_to(out)?;
        }
        out.write_u32::<LE>(self.package_flags.bits())?;

        for value in [
            self.name_count,
            self.name_offset,
            self.export_count,
            self.export_offset,
            self.import_count,
            self.import_offset,
        ] {
            out.write_i32::<LE>(value)?;
        }
        if at_least(version::DEPENDS_OFFSET) {
            out.write_i32::<LE>(self.depends_offset)?;
        }
        if at_least(version::IMPORT_EXPORT_GUIDS) {
            out.write_i32::<LE>(self.import_export_guids_offset)?;
            out.write_i32::<LE>(self.import_guid_count)?;
            out.write_i32::<LE>(self.export_guid_count)?;
        }
        if at_least(version::THUMBNAIL_TABLE) {
            out.write_i32::<LE>(self.thumbnail_table_offset)?;
        }

        out.extend_from_slice(&self.guid);

        out.write_i32::<LE>(self.generations.len() as i32)?;
        for generation in &self.generations {
            out.write_i32::<LE>(generation.export_count)?;
            out.write_i32::<LE>(generation.name_count)?;
            if at_least(version::NET_OBJECT_COUNT) {
                out.write_i32::<LE>(generation.net_object_count)?;
            }
        }

        if at_least(version::ENGINE_VERSION) {
            out.write_u32::<LE>(self.engine_version)?;
        }
        if at_least(version::COOKER_VERSION) {
            out.write_u32::<LE>(self.cooker_version)?;
        }

        if at_least(version::COMPRESSION) {
            out.write_u32::<LE>(self.compression_flags.bits())?;
            out.write_i32::<LE>(self.compressed_chunks.len() as i32)?;
            for chunk in &self.compressed_chunks {
                out.extend_from_slice(chunk.as_bytes());
            }
        }

        if at_least(version::PACKAGE_SOURCE) {
            out.write_u32::<LE>(self.package_source)?;
        }

        if at_least(version::ADDITIONAL_PACKAGES) {
            out.write_i32::<LE>(self.additional_packages.len() as i32)?;
            for package in &self.additional_packages {
                package.write_to(out)?;
            }
        }

        if at_least(version::TEXTURE_ALLOCATIONS) {
            out.write_i32::<LE>(self.texture_allocations.len() as i32)?;
            for allocation in &self.texture_allocations {
                out.write_i32::<LE>(allocation.size_x)?;
                out.write_i32::<LE>(allocation.size_y)?;
                out.write_i32::<LE>(allocation.num_mips)?;
                out.write_u32::<LE>(allocation.format)?;
                out.write_u32::<LE>(allocation.create_flags)?;
                out.write_i32::<LE>(allocation.export_indices.len() as i32)?;
                for index in &allocation.export_indices {
                    out.write_i32::<LE>(*index)?;
                }
            }
        }

        Ok(())
    }

    /// Serialized length in bytes.
    pub fn encoded_len(&self) -> Result<usize> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out.len())
    }

    /// Rewrite every absolute byte position stored in the header.
    ///
    /// Zero marks an absent section and is left alone.
    pub(crate) fn relocate(&mut self, relocate: impl Fn(usize) -> usize) {
        for value in [
            &mut self.header_size,
            &mut self.name_offset,
            &mut self.export_offset,
            &mut self.import_offset,
            &mut self.depends_offset,
            &mut self.import_export_guids_offset,
            &mut self.thumbnail_table_offset,
        ] {
            if *value > 0 {
                *value = relocate(*value as usize) as i32;
            }
        }
    }

    /// Drop the compressed chunk table; the body that follows is stored uncompressed.
    pub(crate) fn clear_compression(&mut self) {
        self.compression_flags = CompressionFlags::empty();
        self.compressed_chunks.clear();
        self.package_flags
            .remove(PackageFlags::STORE_COMPRESSED | PackageFlags::STORE_FULLY_COMPRESSED);
    }

    #[inline]
    pub fn signature(&self) -> u32 {
        self.signature
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn licensee(&self) -> u16 {
        self.licensee
    }

    #[inline]
    pub fn header_size(&self) -> i32 {
        self.header_size
    }

    #[inline]
    pub fn folder_name(&self) -> &str {
        self.folder_name.as_str()
    }

    #[inline]
    pub fn package_flags(&self) -> PackageFlags {
        self.package_flags
    }

    #[inline]
    pub fn name_count(&self) -> i32 {
        self.name_count
    }

    #[inline]
    pub fn name_offset(&self) -> i32 {
        self.name_offset
    }

    #[inline]
    pub fn export_count(&self) -> i32 {
        self.export_count
    }

    #[inline]
    pub fn export_offset(&self) -> i32 {
        self.export_offset
    }

    #[inline]
    pub fn import_count(&self) -> i32 {
        self.import_count
    }

    #[inline]
    pub fn import_offset(&self) -> i32 {
        self.import_offset
    }

    #[inline]
    pub fn depends_offset(&self) -> i32 {
        self.depends_offset
    }

    #[inline]
    pub fn thumbnail_table_offset(&self) -> i32 {
        self.thumbnail_table_offset
    }

    #[inline]
    pub fn guid(&self) -> [u8; 16] {
        self.guid
    }

    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    #[inline]
    pub fn engine_version(&self) -> u32 {
        self.engine_version
    }

    #[inline]
    pub fn cooker_version(&self) -> u32 {
        self.cooker_version
    }

    #[inline]
    pub fn compression_flags(&self) -> CompressionFlags {
        self.compression_flags
    }

    pub fn compressed_chunks(&self) -> &[CompressedChunkRaw] {
        &self.compressed_chunks
    }

    pub fn is_compressed(&self) -> bool {
        !self.compression_flags.is_empty() && !self.compressed_chunks.is_empty()
    }

    pub fn additional_packages(&self) -> &[UString] {
        &self.additional_packages
    }

    pub fn texture_allocations(&self) -> &[TextureAllocation] {
        &self.texture_allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LE>(PACKAGE_SIGNATURE).unwrap();
        out.write_u16::<LE>(version).unwrap();
        out.write_u16::<LE>(7).unwrap();
        out.write_i32::<LE>(0x200).unwrap(); // header size
        out.extend_from_slice(&[5, 0, 0, 0, b'N', b'o', b'n', b'e', 0]);
        out.write_u32::<LE>(0x0000_0009).unwrap();
        for value in [3, 0x80, 2, 0xC0, 1, 0xA0, 0x100] {
            out.write_i32::<LE>(value).unwrap();
        }
        if version >= version::IMPORT_EXPORT_GUIDS {
            for value in [0x110, 0, 0] {
                out.write_i32::<LE>(value).unwrap();
            }
        }
        out.write_i32::<LE>(0).unwrap(); // thumbnails
        out.extend_from_slice(&[0xAB; 16]);
        out.write_i32::<LE>(1).unwrap();
        for value in [2, 3, 4] {
            out.write_i32::<LE>(value).unwrap();
        }
        out.write_u32::<LE>(8623).unwrap();
        out.write_u32::<LE>(152).unwrap();
        out.write_u32::<LE>(0).unwrap();
        out.write_i32::<LE>(0).unwrap();
        out.write_u32::<LE>(0x1234_5678).unwrap();
        out.write_i32::<LE>(1).unwrap();
        out.extend_from_slice(&[4, 0, 0, 0, b'P', b'k', b'g', 0]);
        if version >= version::TEXTURE_ALLOCATIONS {
            out.write_i32::<LE>(1).unwrap();
            for value in [256, 256, 9, 3, 0] {
                out.write_i32::<LE>(value).unwrap();
            }
            out.write_i32::<LE>(2).unwrap();
            out.write_i32::<LE>(0).unwrap();
            out.write_i32::<LE>(1).unwrap();
        }
        out
    }

    #[test]
    fn test_read_write_current() {
        let bytes = header_bytes(868);
        let mut cursor = ByteCursor::new(bytes.clone());
        let header = Header::read(&mut cursor).unwrap();
        assert_eq!(cursor.position(), bytes.len());
        assert_eq!(header.version(), 868);
        assert_eq!(header.licensee(), 7);
        assert_eq!(header.folder_name(), "None");
        assert_eq!(header.name_count(), 3);
        assert_eq!(header.export_offset(), 0xC0);
        assert_eq!(header.depends_offset(), 0x100);
        assert_eq!(header.generations()[0].net_object_count, 4);
        assert_eq!(header.additional_packages()[0].as_str(), "Pkg");
        assert_eq!(header.texture_allocations()[0].export_indices, vec![0, 1]);
        assert!(!header.is_compressed());

        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(out, bytes);
        assert_eq!(header.encoded_len().unwrap(), bytes.len());
    }

    #[test]
    fn test_read_write_older_version() {
        let bytes = header_bytes(600);
        let header = Header::read(&mut ByteCursor::new(bytes.clone())).unwrap();
        assert!(header.texture_allocations().is_empty());

        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_invalid_signature() {
        let mut bytes = header_bytes(868);
        bytes[0] = 0;
        let err = Header::read(&mut ByteCursor::new(bytes)).unwrap_err();
        assert!(matches!(err, UpkError::InvalidSignature { found: 0x9E2A8300, .. }));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = header_bytes(868);
        let err = Header::read(&mut ByteCursor::new(bytes[..40].to_vec())).unwrap_err();
        assert!(matches!(err, UpkError::OutOfBounds { .. }));
    }

    #[test]
    fn test_relocate_and_strip() {
        let mut header = Header::read(&mut ByteCursor::new(header_bytes(868))).unwrap();
        header.package_flags |= PackageFlags::STORE_COMPRESSED;
        header.compression_flags = CompressionFlags::LZO;
        header.relocate(|offset| if offset >= 0xC0 { offset + 16 } else { offset });
        header.clear_compression();

        assert_eq!(header.name_offset(), 0x80);
        assert_eq!(header.export_offset(), 0xD0);
        assert_eq!(header.header_size(), 0x210);
        assert_eq!(header.thumbnail_table_offset(), 0);
        assert!(!header.package_flags().contains(PackageFlags::STORE_COMPRESSED));
        assert!(header.compression_flags().is_empty());
    }
}
