use std::fmt;
use std::io::{self, Read};

use flate2::{Decompress, FlushDecompress, Status};

use crate::errors::ExtractError;

/// Largest output buffer reserved in one step. Expected sizes come from the
/// archive index and are not trusted for up-front allocation.
const PREALLOC_LIMIT: usize = 1 << 24;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    #[default]
    None,
    Zlib,
    Gzip,
    Zstd,
    /// A method this crate cannot decode, by footer name or `#slot`.
    Custom(String),
}

impl Compression {
    /// Resolves the compression flags used by versions before 8.
    pub(crate) fn from_legacy_flags(flags: u32) -> Self {
        match flags & 0x0f {
            0x00 => Compression::None,
            0x01 => Compression::Zlib,
            0x02 => Compression::Gzip,
            other => Compression::Custom(format!("#{other}")),
        }
    }

    /// Resolves a 1-based slot into the footer's compression name table.
    pub(crate) fn from_slot(slot: u32, names: &[String]) -> Self {
        if slot == 0 {
            return Compression::None;
        }
        match names.get(slot as usize - 1).map(String::as_str) {
            Some(name) if name.eq_ignore_ascii_case("zlib") => Compression::Zlib,
            Some(name) if name.eq_ignore_ascii_case("gzip") => Compression::Gzip,
            Some(name) if name.eq_ignore_ascii_case("zstd") => Compression::Zstd,
            Some(name) if !name.is_empty() => Compression::Custom(name.to_owned()),
            _ => Compression::Custom(format!("#{slot}")),
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Compression::None
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("None"),
            Compression::Zlib => f.write_str("Zlib"),
            Compression::Gzip => f.write_str("Gzip"),
            Compression::Zstd => f.write_str("Zstd"),
            Compression::Custom(name) => f.write_str(name),
        }
    }
}

/// Decompresses one block. The result must be exactly `expected` bytes long.
///
/// Blocks are independent of each other, so this may be called from any
/// number of threads at once.
pub fn decompress(
    method: &Compression,
    compressed: &[u8],
    expected: usize,
) -> Result<Vec<u8>, ExtractError> {
    let data = match method {
        Compression::None => compressed.to_vec(),
        Compression::Zlib => inflate(compressed, expected)?,
        Compression::Gzip => read_capped(flate2::read::GzDecoder::new(compressed), expected)?,
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(compressed).map_err(stream_error)?;
            read_capped(decoder, expected)?
        }
        Compression::Custom(name) => {
            return Err(ExtractError::UnsupportedCompression(name.clone()))
        }
    };

    if data.len() != expected {
        return Err(ExtractError::DecompressionSizeMismatch {
            expected: expected as u64,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

fn inflate(compressed: &[u8], expected: usize) -> Result<Vec<u8>, ExtractError> {
    let mut inflater = Decompress::new(true);
    // one spare byte so an oversized stream shows up as a size mismatch
    let mut out = Vec::with_capacity(expected.min(PREALLOC_LIMIT) + 1);
    loop {
        if out.len() == out.capacity() {
            out.reserve((expected.saturating_add(1) - out.len()).min(PREALLOC_LIMIT));
        }
        let consumed = inflater.total_in() as usize;
        let produced = out.len();
        let status = inflater
            .decompress_vec(&compressed[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| ExtractError::CorruptStream(e.to_string()))?;
        if status == Status::StreamEnd || out.len() > expected {
            return Ok(out);
        }
        if inflater.total_in() as usize == consumed && out.len() == produced {
            return Err(if consumed == compressed.len() {
                ExtractError::TruncatedData(format!(
                    "zlib stream ended after {consumed} bytes without an end marker"
                ))
            } else {
                ExtractError::CorruptStream("zlib stream made no progress".to_owned())
            });
        }
    }
}

fn read_capped<R: Read>(reader: R, expected: usize) -> Result<Vec<u8>, ExtractError> {
    let mut out = Vec::with_capacity(expected.min(PREALLOC_LIMIT));
    reader
        .take((expected as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(stream_error)?;
    Ok(out)
}

fn stream_error(err: io::Error) -> ExtractError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => ExtractError::TruncatedData(err.to_string()),
        _ => ExtractError::CorruptStream(err.to_string()),
    }
}
