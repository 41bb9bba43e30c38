//! In-memory package builder for integration tests.
#![allow(dead_code)]

use std::io::Write;

use byteorder::{LE, WriteBytesExt};
use upk_core::compression::lzo;

pub const SIGNATURE: u32 = 0x9E2A83C1;
pub const VERSION: u16 = 868;
const KEY: &[u8; 32] = b"qiffjdlerdoqymvketdcl0er2subioxq";

/// Header field positions in packages written by [`PackageBuilder`].
pub const PACKAGE_FLAGS_AT: usize = 21;
pub const IMPORT_OFFSET_AT: usize = 45;
pub const THUMBNAIL_TABLE_AT: usize = 65;
pub const COMPRESSION_FLAGS_AT: usize = 109;
/// First compressed chunk descriptor.
pub const CHUNK_AT: usize = 117;

/// Position of `serial_offset` inside an export entry.
pub const EXPORT_SERIAL_OFFSET_AT: usize = 36;

pub const NAMES: [&str; 17] = [
    "None",
    "Core",
    "Class",
    "Texture2D",
    "Material",
    "MyTexture",
    "MyMaterial",
    "MyClass",
    "IntProperty",
    "FloatProperty",
    "StrProperty",
    "BoolProperty",
    "Health",
    "Speed",
    "Label",
    "bEnabled",
    "Engine",
];

pub fn name(value: &str) -> i32 {
    NAMES
        .iter()
        .position(|n| *n == value)
        .unwrap_or_else(|| panic!("unknown name {value}")) as i32
}

#[derive(Debug, Clone)]
pub struct ExportSpec {
    pub class: i32,
    pub outer: i32,
    pub name: i32,
    pub number: i32,
    pub payload: Vec<u8>,
}

impl ExportSpec {
    pub fn new(class: i32, name: i32, payload: Vec<u8>) -> Self {
        Self {
            class,
            outer: 0,
            name,
            number: 0,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zlib,
    Lzo,
}

#[derive(Debug, Clone)]
pub struct PackageBuilder {
    pub names: Vec<String>,
    /// `(class package, class name, outer, object name)` name indices.
    pub imports: Vec<(i32, i32, i32, i32)>,
    pub exports: Vec<ExportSpec>,
}

/// Tagged payload: net index, properties, `None`, tail.
pub struct TaggedPayload {
    bytes: Vec<u8>,
}

impl TaggedPayload {
    pub fn new() -> Self {
        let mut bytes = Vec::new();
        bytes.write_i32::<LE>(-1).unwrap();
        Self { bytes }
    }

    fn tag(&mut self, prop: &str, kind: &str, size: i32) {
        for value in [name(prop), 0, name(kind), 0, size, 0] {
            self.bytes.write_i32::<LE>(value).unwrap();
        }
    }

    pub fn int(mut self, prop: &str, value: i32) -> Self {
        self.tag(prop, "IntProperty", 4);
        self.bytes.write_i32::<LE>(value).unwrap();
        self
    }

    pub fn float(mut self, prop: &str, value: f32) -> Self {
        self.tag(prop, "FloatProperty", 4);
        self.bytes.write_f32::<LE>(value).unwrap();
        self
    }

    pub fn string(mut self, prop: &str, value: &str) -> Self {
        self.tag(prop, "StrProperty", value.len() as i32 + 5);
        self.bytes.write_i32::<LE>(value.len() as i32 + 1).unwrap();
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self
    }

    pub fn boolean(mut self, prop: &str, value: bool) -> Self {
        self.tag(prop, "BoolProperty", 0);
        self.bytes.push(value as u8);
        self
    }

    pub fn finish(mut self, tail: &[u8]) -> Vec<u8> {
        self.bytes.write_i32::<LE>(name("None")).unwrap();
        self.bytes.write_i32::<LE>(0).unwrap();
        self.bytes.extend_from_slice(tail);
        self.bytes
    }
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self {
            names: NAMES.iter().map(|n| n.to_string()).collect(),
            imports: vec![
                (name("Core"), name("Class"), 0, name("Texture2D")),
                (name("Core"), name("Class"), 0, name("Material")),
            ],
            exports: Vec::new(),
        }
    }
}

struct Layout {
    header_len: usize,
    name_offset: usize,
    import_offset: usize,
    export_offset: usize,
    depends_offset: usize,
    payload_offset: usize,
}

pub const EXPORT_ENTRY_SIZE: usize = 68;

impl PackageBuilder {
    /// Two tagged exports and one class export with a raw payload.
    pub fn sample() -> Self {
        let mut builder = Self::default();
        builder.exports.push(ExportSpec::new(
            -1,
            name("MyTexture"),
            TaggedPayload::new().int("Health", 100).finish(&[1, 2, 3, 4, 5, 6]),
        ));
        builder.exports.push(ExportSpec::new(
            -2,
            name("MyMaterial"),
            TaggedPayload::new()
                .float("Speed", 1.5)
                .string("Label", "abc")
                .boolean("bEnabled", true)
                .finish(&[]),
        ));
        builder
            .exports
            .push(ExportSpec::new(0, name("MyClass"), (0..15).collect()));
        builder
    }

    /// Three raw class exports of 10, 20 and 15 bytes, stored back to back.
    pub fn raw_exports() -> Self {
        let mut builder = Self::default();
        for (len, fill) in [(10usize, 0xA1u8), (20, 0xB2), (15, 0xC3)] {
            builder
                .exports
                .push(ExportSpec::new(0, name("MyClass"), vec![fill; len]));
        }
        for (index, export) in builder.exports.iter_mut().enumerate() {
            export.number = index as i32;
        }
        builder
    }

    fn name_table(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for name in &self.names {
            out.write_i32::<LE>(name.len() as i32 + 1).unwrap();
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.write_u64::<LE>(0x0007_0010).unwrap();
        }
        out
    }

    fn import_table(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (package, class, outer, object) in &self.imports {
            for value in [*package, 0, *class, 0, *outer, *object, 0] {
                out.write_i32::<LE>(value).unwrap();
            }
        }
        out
    }

    fn export_table(&self, payload_offset: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut offset = payload_offset;
        for export in &self.exports {
            for value in [export.class, 0, export.outer, export.name, export.number, 0] {
                out.write_i32::<LE>(value).unwrap();
            }
            out.write_u64::<LE>(0x000F_0004).unwrap();
            out.write_i32::<LE>(export.payload.len() as i32).unwrap();
            out.write_i32::<LE>(offset as i32).unwrap();
            out.write_u32::<LE>(0).unwrap();
            out.write_i32::<LE>(0).unwrap();
            out.extend_from_slice(&[0x5A; 16]);
            out.write_u32::<LE>(0).unwrap();
            offset += export.payload.len();
        }
        out
    }

    fn header(&self, layout: &Layout, compression: u32, chunks: &[[i32; 4]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LE>(SIGNATURE).unwrap();
        out.write_u16::<LE>(VERSION).unwrap();
        out.write_u16::<LE>(0).unwrap();
        out.write_i32::<LE>(layout.payload_offset as i32).unwrap();
        out.extend_from_slice(&[5, 0, 0, 0, b'N', b'o', b'n', b'e', 0]);
        out.write_u32::<LE>(0x0000_0009).unwrap();
        for value in [
            self.names.len(),
            layout.name_offset,
            self.exports.len(),
            layout.export_offset,
            self.imports.len(),
            layout.import_offset,
            layout.depends_offset,
        ] {
            out.write_i32::<LE>(value as i32).unwrap();
        }
        // import/export guids, thumbnails
        for _ in 0..4 {
            out.write_i32::<LE>(0).unwrap();
        }
        out.extend_from_slice(&[0x42; 16]);
        out.write_i32::<LE>(1).unwrap();
        for value in [self.exports.len() as i32, self.names.len() as i32, 0] {
            out.write_i32::<LE>(value).unwrap();
        }
        out.write_u32::<LE>(8623).unwrap();
        out.write_u32::<LE>(152).unwrap();
        out.write_u32::<LE>(compression).unwrap();
        out.write_i32::<LE>(chunks.len() as i32).unwrap();
        for chunk in chunks {
            for value in chunk {
                out.write_i32::<LE>(*value).unwrap();
            }
        }
        out.write_u32::<LE>(0x1234_5678).unwrap();
        out.write_i32::<LE>(0).unwrap();
        out.write_i32::<LE>(0).unwrap();
        assert_eq!(out.len(), layout.header_len);
        out
    }

    fn layout(&self, header_len: usize) -> Layout {
        let name_offset = header_len;
        let import_offset = name_offset + self.name_table().len();
        let export_offset = import_offset + self.import_table().len();
        let depends_offset = export_offset + self.exports.len() * EXPORT_ENTRY_SIZE;
        let payload_offset = depends_offset + self.exports.len() * 4;
        Layout {
            header_len,
            name_offset,
            import_offset,
            export_offset,
            depends_offset,
            payload_offset,
        }
    }

    pub fn header_len(chunk_count: usize) -> usize {
        4 + 2 + 2 + 4 + 9 + 4 + 7 * 4 + 4 * 4 + 16 + 4 + 12 + 4 + 4 + 4 + 4 + chunk_count * 16 + 4 + 4 + 4
    }

    /// Everything after the header.
    fn body(&self, layout: &Layout) -> Vec<u8> {
        let mut out = self.name_table();
        out.extend(self.import_table());
        out.extend(self.export_table(layout.payload_offset));
        out.extend(std::iter::repeat_n(0u8, self.exports.len() * 4));
        for export in &self.exports {
            out.extend_from_slice(&export.payload);
        }
        out
    }

    pub fn name_offset(&self) -> usize {
        self.layout(Self::header_len(0)).name_offset
    }

    pub fn export_offset(&self) -> usize {
        self.layout(Self::header_len(0)).export_offset
    }

    /// Offsets at which each export payload is stored by [`Self::build`].
    pub fn payload_offsets(&self) -> Vec<usize> {
        let layout = self.layout(Self::header_len(0));
        let mut offset = layout.payload_offset;
        self.exports
            .iter()
            .map(|export| {
                let start = offset;
                offset += export.payload.len();
                start
            })
            .collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let layout = self.layout(Self::header_len(0));
        let mut out = self.header(&layout, 0, &[]);
        out.extend(self.body(&layout));
        out
    }

    /// Package whose body is stored as a single chunk of `block_size` blocks.
    pub fn build_compressed(&self, compression: Compression, block_size: usize) -> Vec<u8> {
        let layout = self.layout(Self::header_len(1));
        let body = self.body(&layout);

        let blocks: Vec<Vec<u8>> = body
            .chunks(block_size)
            .map(|block| match compression {
                Compression::Lzo => lzo::compress_stored(block),
                Compression::Zlib => {
                    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                    encoder.write_all(block).unwrap();
                    encoder.finish().unwrap()
                }
            })
            .collect();

        let mut chunk = Vec::new();
        chunk.write_u32::<LE>(SIGNATURE).unwrap();
        chunk.write_u32::<LE>(block_size as u32).unwrap();
        chunk
            .write_i32::<LE>(blocks.iter().map(Vec::len).sum::<usize>() as i32)
            .unwrap();
        chunk.write_i32::<LE>(body.len() as i32).unwrap();
        for (block, raw) in blocks.iter().zip(body.chunks(block_size)) {
            chunk.write_i32::<LE>(block.len() as i32).unwrap();
            chunk.write_i32::<LE>(raw.len() as i32).unwrap();
        }
        for block in &blocks {
            chunk.extend_from_slice(block);
        }

        let flags = match compression {
            Compression::Zlib => 1,
            Compression::Lzo => 2,
        };
        let descriptor = [
            layout.header_len as i32,
            body.len() as i32,
            layout.header_len as i32,
            chunk.len() as i32,
        ];
        let mut out = self.header(&layout, flags, &[descriptor]);
        out.extend(chunk);
        out
    }
}

pub fn patch_i32(bytes: &mut [u8], at: usize, value: i32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Length-prefixed Latin-1 string with its NUL.
pub fn fstring(out: &mut Vec<u8>, value: &str) {
    out.write_i32::<LE>(value.len() as i32 + 1).unwrap();
    out.extend_from_slice(value.as_bytes());
    out.push(0);
}

pub fn encrypt(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .enumerate()
        .map(|(i, byte)| byte ^ KEY[i % KEY.len()])
        .collect()
}

/// Unique scratch directory under the system temp dir.
pub fn scratch_dir(test: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("upk-core-{test}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
