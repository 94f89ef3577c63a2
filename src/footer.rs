use crate::cursor::{ByteCursor, Encoding};
use crate::errors::OpenError;
use crate::version::{Version, VersionMajor};
use byteorder::LE;

/// Trailing header of a `.pak` archive. The format stores it at the very end
/// of the file; it locates and authenticates the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Present on versions >= 7.
    pub encryption_key_guid: Option<[u8; 16]>,
    /// Present on versions >= 4.
    pub is_index_encrypted: Option<bool>,
    /// Must be `0x5A6F12E1`.
    pub magic: u32,
    pub version: Version,
    pub index_offset: u64,
    pub index_size: u64,
    /// SHA-1 of the plaintext index.
    pub index_hash: [u8; 20],
    /// Present on version 9 only.
    pub is_index_frozen: Option<bool>,
    /// Present on version 8 (4 names) or version >8 (5 names). Empty slots
    /// are kept as empty strings so slot numbers stay aligned.
    pub compression_methods: Vec<String>,
}

impl Footer {
    pub fn size(&self) -> u64 {
        self.version.footer_size()
    }

    pub fn index_encrypted(&self) -> bool {
        self.is_index_encrypted.unwrap_or(false)
    }
}

pub(crate) fn read_footer(
    reader: &mut ByteCursor<'_>,
    version_hint: Version,
) -> Result<Footer, OpenError> {
    let major = version_hint.version_major();

    let encryption_key_guid = if major >= VersionMajor::EncryptionKeyGuid {
        Some(reader.read_guid()?)
    } else {
        None
    };

    let is_index_encrypted = if major >= VersionMajor::IndexEncryption {
        Some(reader.read_bool()?)
    } else {
        None
    };

    let magic = reader.read_u32::<LE>()?;
    if magic != crate::MAGIC {
        return Err(OpenError::InvalidMagic);
    }

    let version = reader.read_u32::<LE>()?;
    match VersionMajor::from_u32(version) {
        Some(v) if v == major => {}
        Some(_) => return Err(OpenError::InvalidMagic),
        None => return Err(OpenError::UnsupportedVersion(version)),
    }

    let index_offset = reader.read_u64::<LE>()?;
    let index_size = reader.read_u64::<LE>()?;
    let index_hash = reader.read_hash()?;

    let is_index_frozen = if major == VersionMajor::FrozenIndex {
        Some(reader.read_bool()?)
    } else {
        None
    };

    let compression_methods = (0..version_hint.compression_name_count())
        .map(|_| reader.read_fixed_string(32, Encoding::Ascii))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Footer {
        encryption_key_guid,
        is_index_encrypted,
        magic,
        version: version_hint,
        index_offset,
        index_size,
        index_hash,
        is_index_frozen,
        compression_methods,
    })
}

/// Finds the footer layout of an archive by trying every known layout from
/// the newest to the oldest.
pub(crate) fn detect_footer(bytes: &[u8]) -> Result<Footer, OpenError> {
    let len = bytes.len() as u64;
    let mut unknown_version = None;

    for &version in Version::ALL.iter().rev() {
        let size = version.footer_size();
        if size > len {
            continue;
        }
        let start = len - size;
        let mut reader = ByteCursor::new(bytes);
        reader.seek(start + version.magic_offset())?;
        if reader.read_u32::<LE>()? != crate::MAGIC {
            continue;
        }
        let raw_version = reader.read_u32::<LE>()?;
        match VersionMajor::from_u32(raw_version) {
            Some(major) if major == version.version_major() => {
                reader.seek(start)?;
                let footer = read_footer(&mut reader, version)?;
                log::debug!(
                    "detected pak {:?}: index at {:#x} ({} bytes)",
                    footer.version,
                    footer.index_offset,
                    footer.index_size
                );
                return Ok(footer);
            }
            Some(_) => continue,
            None => unknown_version = Some(raw_version),
        }
    }

    match unknown_version {
        Some(version) => Err(OpenError::UnsupportedVersion(version)),
        None => Err(OpenError::InvalidMagic),
    }
}
