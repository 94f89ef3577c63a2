use crate::errors::DecodeError;
use byteorder::{ByteOrder, LE};

/// Text encodings used by fixed-width string fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// Single-byte text, trailing NUL padding stripped.
    Ascii,
    /// UTF-16 little-endian, trailing NUL padding stripped.
    Utf16Le,
}

/// Bounds-checked reader over an immutable byte buffer.
///
/// Integer reads take their byte order as a type parameter, e.g.
/// `cursor.read_u32::<LE>()`. A read that needs more bytes than remain fails
/// with [`DecodeError::TruncatedData`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn seek(&mut self, offset: u64) -> Result<(), DecodeError> {
        match usize::try_from(offset) {
            Ok(offset) if offset <= self.bytes.len() => {
                self.pos = offset;
                Ok(())
            }
            _ => Err(DecodeError::SeekOutOfRange {
                offset,
                len: self.bytes.len(),
            }),
        }
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::TruncatedData {
                offset: self.pos,
                wanted: len,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16<B: ByteOrder>(&mut self) -> Result<u16, DecodeError> {
        Ok(B::read_u16(self.take(2)?))
    }

    pub fn read_u32<B: ByteOrder>(&mut self) -> Result<u32, DecodeError> {
        Ok(B::read_u32(self.take(4)?))
    }

    pub fn read_i32<B: ByteOrder>(&mut self) -> Result<i32, DecodeError> {
        Ok(B::read_i32(self.take(4)?))
    }

    pub fn read_u64<B: ByteOrder>(&mut self) -> Result<u64, DecodeError> {
        Ok(B::read_u64(self.take(8)?))
    }

    pub fn read_i64<B: ByteOrder>(&mut self) -> Result<i64, DecodeError> {
        Ok(B::read_i64(self.take(8)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    pub fn read_len(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            1 => Ok(true),
            0 => Ok(false),
            err => Err(DecodeError::Bool(err.into())),
        }
    }

    /// Bool stored as a little-endian `u32`.
    pub fn read_bool32(&mut self) -> Result<bool, DecodeError> {
        match self.read_u32::<LE>()? {
            1 => Ok(true),
            0 => Ok(false),
            err => Err(DecodeError::Bool(err)),
        }
    }

    pub fn read_hash(&mut self) -> Result<[u8; 20], DecodeError> {
        let mut hash = [0; 20];
        hash.copy_from_slice(self.take(20)?);
        Ok(hash)
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16], DecodeError> {
        let mut guid = [0; 16];
        guid.copy_from_slice(self.take(16)?);
        Ok(guid)
    }

    /// Reads a `u32` element count followed by that many elements.
    ///
    /// Every element occupies at least one byte, so a count larger than the
    /// remaining buffer is rejected before anything is allocated.
    pub fn read_array<T>(
        &mut self,
        mut func: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let count = self.read_u32::<LE>()? as usize;
        if count > self.remaining() {
            return Err(DecodeError::TruncatedData {
                offset: self.pos,
                wanted: count,
                available: self.remaining(),
            });
        }
        let mut buf = Vec::with_capacity(count);
        for _ in 0..count {
            buf.push(func(self)?);
        }
        Ok(buf)
    }

    /// Reads a length-prefixed engine string. A negative length means the
    /// payload is UTF-16LE code units; the stored length includes the NUL.
    pub fn read_fstring(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        let size = self.read_i32::<LE>()?;
        let mut buf = if size.is_negative() {
            let units = size.unsigned_abs() as usize;
            let raw = match units.checked_mul(2) {
                Some(len) => self.take(len)?,
                None => return Err(DecodeError::InvalidString(start)),
            };
            let wide: Vec<u16> = raw.chunks_exact(2).map(LE::read_u16).collect();
            String::from_utf16(&wide).map_err(|_| DecodeError::InvalidString(start))?
        } else {
            let raw = self.take(size as usize)?;
            String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidString(start))?
        };
        // remove the null byte
        if buf.ends_with('\0') {
            buf.pop();
        }
        Ok(buf)
    }

    /// Reads a fixed-width, NUL-padded string field of `len` bytes.
    pub fn read_fixed_string(
        &mut self,
        len: usize,
        encoding: Encoding,
    ) -> Result<String, DecodeError> {
        let start = self.pos;
        let raw = self.take(len)?;
        match encoding {
            Encoding::Ascii => {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                if !raw[..end].is_ascii() {
                    return Err(DecodeError::InvalidString(start));
                }
                Ok(raw[..end].iter().map(|&b| b as char).collect())
            }
            Encoding::Utf16Le => {
                let wide: Vec<u16> = raw
                    .chunks_exact(2)
                    .map(LE::read_u16)
                    .take_while(|&unit| unit != 0)
                    .collect();
                String::from_utf16(&wide).map_err(|_| DecodeError::InvalidString(start))
            }
        }
    }
}
