//! Block decompressors used by chunked packages.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{Result, UpkError};

pub mod lzo;

/// Upper bound on output space reserved up front. Sizes come from the file, so larger outputs
/// grow as they are produced.
pub(crate) const MAX_PREALLOC: usize = 16 << 20;

/// Buffer for an output of `expected_size` bytes, with a bounded reservation.
pub(crate) fn output_buffer(expected_size: usize) -> Vec<u8> {
    Vec::with_capacity(expected_size.min(MAX_PREALLOC))
}

/// Inflate a zlib block that must expand to exactly `expected_size` bytes.
pub fn decompress_zlib(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut output = output_buffer(expected_size);
    ZlibDecoder::new(input)
        .take((expected_size as u64).saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| UpkError::corrupt(format!("zlib block: {e}")))?;

    if output.len() != expected_size {
        return Err(UpkError::corrupt(format!(
            "zlib block expanded to {} bytes, expected {expected_size}",
            output.len()
        )));
    }

    Ok(output)
}
