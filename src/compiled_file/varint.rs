//! Byte cursor and unsigned LEB128 varints.
//!
//! A varint carries 7 value bits per byte, least significant group first. Bit 7
//! is set on every byte except the last. Zero encodes as a single `0x00`.
//! Integer nodes use the unbounded form (`*_big`); lengths and instruction
//! words are limited to 64 bits.

use crate::compiled_file::errors::CompiledFileError;
use num_bigint::BigUint;

/// Appends `value` as an unsigned LEB128 varint.
pub fn write_uleb128_u64(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Reads an unsigned LEB128 varint starting at `*offset`, advancing it.
///
/// Fails on truncation and on encodings that do not fit in 64 bits.
pub fn read_uleb128_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, CompiledFileError> {
    let start = *offset;
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*offset)
            .ok_or(CompiledFileError::UnexpectedEof { offset: *offset })?;
        *offset += 1;

        let bits = u64::from(byte & 0x7f);
        if (shift == 63 && bits > 1) || shift > 63 {
            return Err(CompiledFileError::InvalidVarint { offset: start });
        }
        result |= bits << shift;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Appends `value` as an unsigned LEB128 varint of any length.
pub fn write_uleb128_big(out: &mut Vec<u8>, value: &BigUint) {
    let digits = value.to_radix_le(128);
    let Some((last, rest)) = digits.split_last() else {
        out.push(0);
        return;
    };
    out.extend(rest.iter().map(|digit| digit | 0x80));
    out.push(*last);
}

/// Reads an unsigned LEB128 varint of any length starting at `*offset`, advancing it.
pub fn read_uleb128_big(bytes: &[u8], offset: &mut usize) -> Result<BigUint, CompiledFileError> {
    let start = *offset;
    let mut digits = Vec::new();
    loop {
        let byte = *bytes
            .get(*offset)
            .ok_or(CompiledFileError::UnexpectedEof { offset: *offset })?;
        *offset += 1;
        digits.push(byte & 0x7f);
        if byte & 0x80 == 0 {
            break;
        }
    }
    BigUint::from_radix_le(&digits, 128).ok_or(CompiledFileError::InvalidVarint { offset: start })
}

/// A simple byte reader with bounds checks.
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Returns the current cursor offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CompiledFileError> {
        let eof = CompiledFileError::UnexpectedEof {
            offset: self.bytes.len(),
        };
        let Some(slice) = self
            .offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(self.offset..end))
        else {
            return Err(eof);
        };
        let end = self.offset + len;
        self.offset = end;
        Ok(slice)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, CompiledFileError> {
        Ok(self.take(1)?[0])
    }

    /// Reads an unsigned LEB128 integer as `u64`.
    pub fn read_uleb128_u64(&mut self) -> Result<u64, CompiledFileError> {
        read_uleb128_u64(self.bytes, &mut self.offset)
    }

    /// Reads an unsigned LEB128 integer of any size.
    pub fn read_uleb128_big(&mut self) -> Result<BigUint, CompiledFileError> {
        read_uleb128_big(self.bytes, &mut self.offset)
    }

    /// Reads an unsigned LEB128 integer as a length or count.
    pub fn read_len(&mut self) -> Result<usize, CompiledFileError> {
        let start = self.offset;
        let v = self.read_uleb128_u64()?;
        usize::try_from(v).map_err(|_| CompiledFileError::IntegerOutOfRange { offset: start })
    }

    /// Reads `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CompiledFileError> {
        self.take(len)
    }

    /// Reads bytes up to and including the next `\n`, returning them without the newline.
    pub fn read_line(&mut self) -> Result<&'a [u8], CompiledFileError> {
        let rest = &self.bytes[self.offset..];
        let len =
            rest.iter()
                .position(|b| *b == b'\n')
                .ok_or(CompiledFileError::UnexpectedEof {
                    offset: self.bytes.len(),
                })?;
        let line = self.take(len + 1)?;
        Ok(&line[..len])
    }

    /// Unconsumed tail of the input.
    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }
}
