//! Expansion of chunk-compressed package bodies.

use rayon::prelude::*;

use crate::compression::{decompress_zlib, lzo, output_buffer};
use crate::cursor::ByteCursor;
use crate::error::{Result, UpkError};
use crate::raw::{BlockRaw, CompressedChunkRaw};
use crate::upk::{CompressionFlags, Header, PACKAGE_SIGNATURE};

/// Method used for every block of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockMethod {
    Zlib,
    Lzo,
}

impl BlockMethod {
    fn from_flags(flags: CompressionFlags) -> Result<Self> {
        if flags == CompressionFlags::ZLIB {
            Ok(Self::Zlib)
        } else if flags == CompressionFlags::LZO {
            Ok(Self::Lzo)
        } else {
            Err(UpkError::UnsupportedCompression(flags))
        }
    }

    fn decompress(self, input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        match self {
            Self::Zlib => decompress_zlib(input, expected_size),
            Self::Lzo => lzo::decompress(input, expected_size),
        }
    }
}

/// Expand a compressed package into its uncompressed body.
///
/// Bytes before the first chunk's uncompressed offset (the header) are taken as stored; every
/// chunk's output is placed at its uncompressed offset.
pub fn decompress_body(cursor: &ByteCursor, header: &Header) -> Result<ByteCursor> {
    let method = BlockMethod::from_flags(header.compression_flags())?;

    let mut chunks = header.compressed_chunks().to_vec();
    for chunk in &chunks {
        if chunk.uncompressed_offset < 0
            || chunk.uncompressed_size < 0
            || chunk.compressed_offset < 0
            || chunk.compressed_size < 0
        {
            return Err(UpkError::corrupt(format!("negative compressed chunk {chunk:?}")));
        }
    }
    chunks.sort_by_key(|chunk| chunk.uncompressed_offset);

    let prefix_len = chunks
        .first()
        .map_or(cursor.len(), |chunk| chunk.uncompressed_offset as usize);
    let total_len = chunks
        .iter()
        .map(|chunk| chunk.uncompressed_offset as usize + chunk.uncompressed_size as usize)
        .max()
        .unwrap_or(prefix_len)
        .max(prefix_len);

    let mut expected_start = prefix_len;
    for chunk in &chunks {
        if chunk.uncompressed_offset as usize != expected_start {
            return Err(UpkError::corrupt(format!(
                "compressed chunk at {} leaves a gap or overlap, expected {expected_start}",
                chunk.uncompressed_offset
            )));
        }
        expected_start += chunk.uncompressed_size as usize;
    }

    let outputs = chunks
        .par_iter()
        .map(|chunk| {
            decompress_chunk(cursor, chunk, method).map_err(|e| match e {
                UpkError::OutOfBounds { .. } => UpkError::corrupt(format!("chunk at {}: {e}", chunk.compressed_offset)),
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut body = output_buffer(total_len);
    body.extend_from_slice(&cursor.read_range(0, prefix_len)?);
    for output in outputs {
        body.extend_from_slice(&output);
    }
    debug_assert_eq!(body.len(), total_len);

    tracing::debug!(
        compressed = cursor.len(),
        uncompressed = body.len(),
        "expanded package body"
    );
    Ok(ByteCursor::new(body))
}

fn decompress_chunk(cursor: &ByteCursor, chunk: &CompressedChunkRaw, method: BlockMethod) -> Result<Vec<u8>> {
    let mut reader = cursor.splice(chunk.compressed_offset as usize, chunk.compressed_size as usize)?;

    let tag = reader.read_u32()?;
    if tag != PACKAGE_SIGNATURE {
        return Err(UpkError::corrupt(format!(
            "chunk at {} has tag 0x{tag:08X}",
            chunk.compressed_offset
        )));
    }
    let block_size = reader.read_u32()? as usize;
    let summary = BlockRaw::read(&mut reader)?;
    if summary.uncompressed_size != chunk.uncompressed_size || summary.compressed_size < 0 {
        return Err(UpkError::corrupt(format!(
            "chunk summary {summary:?} disagrees with chunk {chunk:?}"
        )));
    }

    let expected = chunk.uncompressed_size as usize;
    let block_count = match (expected, block_size) {
        (0, _) => 0,
        (_, 0) => return Err(UpkError::corrupt("chunk with zero block size")),
        _ => expected.div_ceil(block_size),
    };
    if block_count.saturating_mul(BlockRaw::SIZE) > reader.remaining() {
        return Err(UpkError::corrupt(format!(
            "chunk at {} declares {block_count} blocks but holds {} bytes",
            chunk.compressed_offset,
            reader.remaining()
        )));
    }

    let mut blocks = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        let block = BlockRaw::read(&mut reader)?;
        if block.compressed_size < 0 || block.uncompressed_size < 0 {
            return Err(UpkError::corrupt(format!("negative block {block:?}")));
        }
        blocks.push(block);
    }

    let declared: usize = blocks.iter().map(|block| block.uncompressed_size as usize).sum();
    if declared != expected {
        return Err(UpkError::corrupt(format!(
            "chunk blocks declare {declared} bytes, expected {expected}"
        )));
    }

    let mut output = output_buffer(expected);
    for block in blocks {
        let input = reader.read_slice(block.compressed_size as usize)?;
        output.extend(method.decompress(input, block.uncompressed_size as usize)?);
    }

    if output.len() != expected {
        return Err(UpkError::corrupt(format!(
            "chunk expanded to {} bytes, expected {expected}",
            output.len()
        )));
    }

    tracing::trace!(
        offset = chunk.uncompressed_offset,
        size = expected,
        blocks = block_count,
        "decompressed chunk"
    );
    Ok(output)
}
