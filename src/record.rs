use crate::block::{read_block, Block};
use crate::compression::Compression;
use crate::crypto::encrypted_len;
use crate::cursor::ByteCursor;
use crate::errors::DecodeError;
use crate::version::{Version, VersionMajor};
use byteorder::LE;

/// One logical file stored in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    /// Forward-slash separated path relative to the mount point.
    pub path: String,
    /// Position of the entry's in-data header.
    pub offset: u64,
    /// Stored payload size before encryption padding.
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression: Compression,
    /// SHA-1 of the stored payload. The v10+ encoded form does not carry it.
    pub hash: Option<[u8; 20]>,
    /// Present on version 1 only.
    pub timestamp: Option<u64>,
    pub is_encrypted: bool,
    pub(crate) is_deleted: bool,
    pub compression_block_size: u32,
    /// Absolute on-disk ranges, in payload order.
    pub blocks: Vec<Block>,
}

impl EntryDescriptor {
    /// On-disk ranges to read, decrypt and decompress in order. Entries
    /// without explicit blocks are stored as one range following the
    /// in-data header.
    pub(crate) fn data_blocks(&self, version: Version) -> Vec<Block> {
        if !self.blocks.is_empty() {
            return self.blocks.clone();
        }
        let start = self.offset + serialized_size(version, &self.compression, 0);
        let stored = if self.is_encrypted {
            encrypted_len(self.compressed_size)
        } else {
            self.compressed_size
        };
        vec![Block {
            start,
            end: start + stored,
        }]
    }
}

/// Size of the legacy record layout, which is also the header written in
/// front of every payload regardless of the index format.
pub(crate) fn serialized_size(
    version: Version,
    compression: &Compression,
    block_count: u32,
) -> u64 {
    let major = version.version_major();
    let mut size = 0;
    size += 8; // offset
    size += 8; // compressed
    size += 8; // uncompressed
    size += match version == Version::V8A {
        true => 1,  // 8 bit compression
        false => 4, // 32 bit compression
    };
    size += match major == VersionMajor::Initial {
        true => 8, // timestamp
        false => 0,
    };
    size += 20; // hash
    if major >= VersionMajor::CompressionEncryption {
        if !compression.is_none() {
            size += 4 + (8 + 8) * block_count as u64; // blocks
        }
        size += 1; // flags
        size += 4; // block uncompressed size
    }
    size
}

fn resolve_compression(version: Version, raw: u32, names: &[String]) -> Compression {
    if version.version_major() >= VersionMajor::FNameBasedCompression {
        Compression::from_slot(raw, names)
    } else {
        Compression::from_legacy_flags(raw)
    }
}

/// Reads a record in the legacy layout. The path is filled in by the caller.
pub(crate) fn read_record(
    reader: &mut ByteCursor<'_>,
    version: Version,
    compression_names: &[String],
) -> Result<EntryDescriptor, DecodeError> {
    let major = version.version_major();
    let offset = reader.read_u64::<LE>()?;
    let compressed_size = reader.read_u64::<LE>()?;
    let uncompressed_size = reader.read_u64::<LE>()?;
    let raw_compression = match version == Version::V8A {
        true => reader.read_u8()?.into(),
        false => reader.read_u32::<LE>()?,
    };
    let compression = resolve_compression(version, raw_compression, compression_names);

    let timestamp = match major == VersionMajor::Initial {
        true => Some(reader.read_u64::<LE>()?),
        false => None,
    };
    let hash = reader.read_hash()?;

    let mut blocks = vec![];
    let mut flags = 0;
    let mut compression_block_size = 0;
    if major >= VersionMajor::CompressionEncryption {
        if !compression.is_none() {
            blocks = reader.read_array(read_block)?;
        }
        flags = reader.read_u8()?;
        compression_block_size = reader.read_u32::<LE>()?;
    }

    if major >= VersionMajor::RelativeChunkOffsets {
        for block in &mut blocks {
            block.start = block.start.saturating_add(offset);
            block.end = block.end.saturating_add(offset);
        }
    }

    Ok(EntryDescriptor {
        path: String::new(),
        offset,
        compressed_size,
        uncompressed_size,
        compression,
        hash: Some(hash),
        timestamp,
        is_encrypted: flags & 0x01 != 0,
        is_deleted: flags & 0x02 != 0,
        compression_block_size,
        blocks,
    })
}

/// Reads a record from the bit-packed encoded entry blob of v10+ indices.
pub(crate) fn read_encoded_record(
    reader: &mut ByteCursor<'_>,
    version: Version,
    compression_names: &[String],
) -> Result<EntryDescriptor, DecodeError> {
    let bits = reader.read_u32::<LE>()?;
    let compression = Compression::from_slot((bits >> 23) & 0x3f, compression_names);

    let is_encrypted = (bits & (1 << 22)) != 0;
    let compression_block_count: u32 = (bits >> 6) & 0xffff;
    let mut block_uncompressed_size = bits & 0x3f;

    if block_uncompressed_size == 0x3f {
        block_uncompressed_size = reader.read_u32::<LE>()?;
    } else {
        block_uncompressed_size <<= 11;
    }

    let var_int = |reader: &mut ByteCursor<'_>, bit: u32| -> Result<u64, DecodeError> {
        Ok(if (bits & (1 << bit)) != 0 {
            reader.read_u32::<LE>()? as u64
        } else {
            reader.read_u64::<LE>()?
        })
    };

    let offset = var_int(reader, 31)?;
    let uncompressed_size = var_int(reader, 30)?;
    let compressed_size = match compression {
        Compression::None => uncompressed_size,
        _ => var_int(reader, 29)?,
    };

    block_uncompressed_size = if compression_block_count == 0 {
        0
    } else if uncompressed_size < block_uncompressed_size.into() {
        uncompressed_size as u32
    } else {
        block_uncompressed_size
    };

    let offset_base =
        offset.saturating_add(serialized_size(version, &compression, compression_block_count));

    let blocks = if compression_block_count == 1 && !is_encrypted {
        vec![Block {
            start: offset_base,
            end: offset_base.saturating_add(compressed_size),
        }]
    } else {
        let mut index = offset_base;
        (0..compression_block_count)
            .map(|_| {
                let block_size = reader.read_u32::<LE>()? as u64;
                let block = Block {
                    start: index,
                    end: index.saturating_add(block_size),
                };
                index = block.end;
                Ok(block)
            })
            .collect::<Result<Vec<_>, DecodeError>>()?
    };

    Ok(EntryDescriptor {
        path: String::new(),
        offset,
        compressed_size,
        uncompressed_size,
        compression,
        hash: None,
        timestamp: None,
        is_encrypted,
        is_deleted: false,
        compression_block_size: block_uncompressed_size,
        blocks,
    })
}
