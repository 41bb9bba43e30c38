//! LZO1X block codec.
//!
//! The decoder is the safe LZO1X variant: every literal copy and back-reference is checked
//! against both the input and the expected output size, so malformed streams fail instead of
//! producing short or garbled output.

use crate::error::{Result, UpkError};

/// Extra distance of an M1 match that directly follows a literal run.
const M2_MAX_OFFSET: usize = 0x0800;
/// Base distance of an M4 match.
const M4_BASE_OFFSET: usize = 0x4000;
/// A run length encoded with more zero bytes than this cannot describe a real block.
const MAX_ZERO_RUN: usize = usize::MAX / 255 - 2;

/// End-of-stream marker: an M4 match with distance zero.
const END_OF_STREAM: [u8; 3] = [0x11, 0x00, 0x00];

/// Decompress `input` into a buffer of exactly `expected_size` bytes.
pub fn decompress(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if input.len() < END_OF_STREAM.len() {
        return Err(UpkError::corrupt(format!("LZO stream too short: {} bytes", input.len())));
    }

    let mut decoder = Decoder {
        input,
        ip: 0,
        output: super::output_buffer(expected_size),
        limit: expected_size,
    };
    decoder.run()?;

    if decoder.output.len() != expected_size {
        return Err(UpkError::corrupt(format!(
            "LZO stream produced {} bytes, expected {expected_size}",
            decoder.output.len()
        )));
    }
    if decoder.ip != input.len() {
        return Err(UpkError::corrupt(format!(
            "LZO stream ended with {} unread bytes",
            input.len() - decoder.ip
        )));
    }

    Ok(decoder.output)
}

/// Encode `data` as a single literal run.
///
/// The result is a valid LZO1X stream that every decoder accepts; it trades ratio for a
/// trivially correct encoder.
pub fn compress_stored(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 255 + 8);
    match data.len() {
        0 => {}
        len @ 1..=238 => out.push((len + 17) as u8),
        len => {
            // long run: 0, zero bytes for each full 255 block, remainder
            out.push(0);
            let mut rem = len - 18;
            while rem > 255 {
                out.push(0);
                rem -= 255;
            }
            out.push(rem as u8);
        }
    }
    out.extend_from_slice(data);
    out.extend_from_slice(&END_OF_STREAM);
    out
}

struct Decoder<'a> {
    input: &'a [u8],
    ip: usize,
    output: Vec<u8>,
    limit: usize,
}

impl Decoder<'_> {
    fn overrun(&self) -> UpkError {
        UpkError::corrupt(format!("LZO input overrun at {}", self.ip))
    }

    fn byte(&mut self) -> Result<usize> {
        let value = *self.input.get(self.ip).ok_or_else(|| self.overrun())?;
        self.ip += 1;
        Ok(value as usize)
    }

    fn le16(&mut self) -> Result<usize> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        Ok(lo | (hi << 8))
    }

    /// Length continuation: each zero byte adds 255, the first non-zero byte terminates.
    fn run_length(&mut self, base: usize) -> Result<usize> {
        let mut zeros = 0usize;
        while *self.input.get(self.ip).ok_or_else(|| self.overrun())? == 0 {
            zeros += 1;
            self.ip += 1;
            if zeros > MAX_ZERO_RUN {
                return Err(UpkError::corrupt("LZO run length overflow"));
            }
        }
        Ok(zeros * 255 + base + self.byte()?)
    }

    fn copy_literals(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let end = self.ip + count;
        if end > self.input.len() {
            return Err(self.overrun());
        }
        if self.output.len() + count > self.limit {
            return Err(UpkError::corrupt("LZO output overrun"));
        }
        self.output.extend_from_slice(&self.input[self.ip..end]);
        self.ip = end;
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, length: usize) -> Result<()> {
        if distance == 0 || distance > self.output.len() {
            return Err(UpkError::corrupt(format!(
                "LZO lookbehind overrun: distance {distance} at output {}",
                self.output.len()
            )));
        }
        if self.output.len() + length > self.limit {
            return Err(UpkError::corrupt("LZO output overrun"));
        }
        // byte by byte, matches may overlap their own output
        let start = self.output.len() - distance;
        for i in 0..length {
            let byte = self.output[start + i];
            self.output.push(byte);
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        // 0 = expecting a literal run, 1..=3 = after a match with trailing literals, 4 = after a run
        let mut state = 0usize;

        if self.input[0] > 17 {
            self.ip = 1;
            let count = self.input[0] as usize - 17;
            self.copy_literals(count)?;
            state = if count < 4 { count } else { 4 };
        }

        loop {
            let t = self.byte()?;
            let (distance, length, next);

            if t < 16 {
                match state {
                    0 => {
                        let count = if t == 0 { self.run_length(15)? } else { t };
                        self.copy_literals(count + 3)?;
                        state = 4;
                        continue;
                    }
                    4 => {
                        next = t & 3;
                        distance = 1 + M2_MAX_OFFSET + (t >> 2) + (self.byte()? << 2);
                        length = 3;
                    }
                    _ => {
                        next = t & 3;
                        distance = 1 + (t >> 2) + (self.byte()? << 2);
                        length = 2;
                    }
                }
            } else if t >= 64 {
                next = t & 3;
                distance = 1 + ((t >> 2) & 7) + (self.byte()? << 3);
                length = (t >> 5) + 1;
            } else if t >= 32 {
                let count = match t & 31 {
                    0 => self.run_length(31)?,
                    n => n,
                };
                length = count + 2;
                let word = self.le16()?;
                distance = 1 + (word >> 2);
                next = word & 3;
            } else {
                let high = (t & 8) << 11;
                let count = match t & 7 {
                    0 => self.run_length(7)?,
                    n => n,
                };
                length = count + 2;
                let word = self.le16()?;
                next = word & 3;
                let offset = high + (word >> 2);
                if offset == 0 {
                    if length != 3 {
                        return Err(UpkError::corrupt("LZO malformed end of stream marker"));
                    }
                    return Ok(());
                }
                distance = offset + M4_BASE_OFFSET;
            }

            self.copy_match(distance, length)?;
            state = next;
            self.copy_literals(next)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_round_trip() {
        for len in [0usize, 1, 3, 4, 18, 19, 238, 239, 273, 274, 600, 4096] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let compressed = compress_stored(&data);
            assert_eq!(decompress(&compressed, len).unwrap(), data, "len={len}");
        }
    }

    #[test]
    fn test_matches() {
        // "abcd" literal run, M2 copy of 4 bytes at distance 4, then a 3 byte M3 copy
        // at distance 2, then end of stream
        let stream = [
            17 + 4,
            b'a',
            b'b',
            b'c',
            b'd',
            // M2: length = (t >> 5) + 1 = 4, distance = 1 + ((t >> 2) & 7) + (b << 3) = 4
            (3 << 5) | (3 << 2),
            0x00,
            // M3: length = (t & 31) + 2 = 3, distance = 1 + (word >> 2) = 2
            32 | 1,
            1 << 2,
            0x00,
            0x11,
            0x00,
            0x00,
        ];
        assert_eq!(decompress(&stream, 11).unwrap(), b"abcdabcdcdc");
    }

    #[test]
    fn test_overlapping_match() {
        // single literal then a run-length M3 repeating it
        let stream = [17 + 1, b'x', 32 | 9, 0x00, 0x00, 0x11, 0x00, 0x00];
        assert_eq!(decompress(&stream, 12).unwrap(), vec![b'x'; 12]);
    }

    #[test]
    fn test_corrupt_stream_expected_100() {
        let data = vec![0x5Au8; 100];
        let mut stream = compress_stored(&data);
        let last = stream.len() - 3;
        stream.truncate(last - 10);
        assert!(matches!(decompress(&stream, 100), Err(UpkError::CorruptData(_))));

        assert!(matches!(decompress(&[0xFF; 16], 100), Err(UpkError::CorruptData(_))));
        assert!(matches!(decompress(&[0x00, 0x00], 100), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_size_mismatch() {
        let data = vec![7u8; 50];
        let stream = compress_stored(&data);
        assert!(matches!(decompress(&stream, 100), Err(UpkError::CorruptData(_))));
        assert!(matches!(decompress(&stream, 10), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_oversized_expectation_is_corrupt() {
        let stream = compress_stored(b"abc");
        assert!(matches!(decompress(&stream, usize::MAX >> 1), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_lookbehind_overrun() {
        // M4 match with distance 0x4001 before any output exists
        let stream = [0x11, 0x04, 0x00, 0x11, 0x00, 0x00];
        assert!(matches!(decompress(&stream, 3), Err(UpkError::CorruptData(_))));
    }

    #[test]
    fn test_trailing_garbage() {
        let mut stream = compress_stored(b"abcdef");
        stream.push(0xAA);
        assert!(decompress(&stream, 6).is_err());
    }
}
