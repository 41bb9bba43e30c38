//! Random-access byte buffer with a read position.
//!
//! Every package structure is read through [`ByteCursor`]. Reads are little-endian and
//! bounds-checked; a failed read never moves the position.
//!
//! Positions range over `0..=len`. Sitting exactly at the end of the buffer is a valid state
//! that only permits zero-length reads.

use std::sync::Arc;

use byteorder::{ByteOrder, LE};

use crate::compression::lzo;
use crate::error::{Result, UpkError};
use crate::upk::{NameRef, UString};

/// Static keystream applied by [`ByteCursor::decrypt`].
pub(crate) const XOR_KEY: [u8; 32] = *b"qiffjdlerdoqymvketdcl0er2subioxq";

#[derive(Clone, derive_more::Debug)]
pub struct ByteCursor {
    #[debug("{} bytes", data.len())]
    data: Arc<Vec<u8>>,
    index: usize,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            index: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Unwraps the buffer, copying only if another cursor still shares it.
    pub fn into_inner(self) -> Vec<u8> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(self.out_of_bounds(offset as i64, length)),
        }
    }

    fn out_of_bounds(&self, offset: i64, length: usize) -> UpkError {
        UpkError::OutOfBounds {
            offset,
            length,
            size: self.data.len(),
        }
    }

    /// Borrow the next `length` bytes and advance past them.
    pub fn read_slice(&mut self, length: usize) -> Result<&[u8]> {
        self.check_range(self.index, length)?;
        let start = self.index;
        self.index += length;
        Ok(&self.data[start..start + length])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LE::read_i16(self.read_slice(2)?))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LE::read_u16(self.read_slice(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LE::read_i32(self.read_slice(4)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LE::read_u32(self.read_slice(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LE::read_i64(self.read_slice(8)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LE::read_u64(self.read_slice(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LE::read_f32(self.read_slice(4)?))
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16]> {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(self.read_slice(16)?);
        Ok(guid)
    }

    /// Length-prefixed string; a negative length marks UTF-16.
    pub fn read_fstring(&mut self) -> Result<UString> {
        UString::read(self)
    }

    pub fn read_name_ref(&mut self) -> Result<NameRef> {
        NameRef::read(self)
    }

    /// Copy `length` bytes from the current position and advance.
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        Ok(self.read_slice(length)?.to_vec())
    }

    /// Copy `length` bytes at `offset` without touching the position.
    pub fn read_range(&self, offset: usize, length: usize) -> Result<Vec<u8>> {
        self.check_range(offset, length)?;
        Ok(self.data[offset..offset + length].to_vec())
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(self.out_of_bounds(position as i64, 0));
        }
        self.index = position;
        Ok(())
    }

    pub fn skip(&mut self, delta: i64) -> Result<()> {
        let target = (self.index as i64)
            .checked_add(delta)
            .ok_or_else(|| self.out_of_bounds(i64::MAX, 0))?;
        if target < 0 || target as usize > self.data.len() {
            return Err(self.out_of_bounds(target, 0));
        }
        self.index = target as usize;
        Ok(())
    }

    /// New cursor over the same bytes, positioned at `offset`.
    pub fn branch(&self, offset: usize) -> Result<ByteCursor> {
        if offset > self.data.len() {
            return Err(self.out_of_bounds(offset as i64, 0));
        }
        Ok(Self {
            data: Arc::clone(&self.data),
            index: offset,
        })
    }

    /// New cursor over an independent copy of `[offset, offset + length)`, positioned at 0.
    pub fn splice(&self, offset: usize, length: usize) -> Result<ByteCursor> {
        Ok(Self::new(self.read_range(offset, length)?))
    }

    /// XOR the whole buffer with the static package key. Applying it twice restores the input.
    ///
    /// Buffers shorter than the key are left untouched. Other cursors sharing the buffer keep
    /// seeing the original bytes.
    pub fn decrypt(&mut self) {
        if self.data.len() < XOR_KEY.len() {
            return;
        }
        let data = Arc::make_mut(&mut self.data);
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= XOR_KEY[i % XOR_KEY.len()];
        }
    }

    /// Decompress the whole buffer as an LZO1X stream that must expand to exactly
    /// `expected_size` bytes.
    pub fn decompress(&self, expected_size: usize) -> Result<ByteCursor> {
        lzo::decompress(&self.data, expected_size).map(Self::new)
    }
}

impl From<Vec<u8>> for ByteCursor {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}
