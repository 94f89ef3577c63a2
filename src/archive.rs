use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use sha1::{Digest, Sha1};

use crate::block::Block;
use crate::compression::decompress;
use crate::crypto::AesKey;
use crate::errors::{ExtractError, OpenError};
use crate::footer::{detect_footer, Footer};
use crate::index::PakIndex;
use crate::record::EntryDescriptor;
use crate::version::Version;

/// Upper bound on buffer space reserved up front from sizes read out of the
/// index; larger payloads grow as they are decoded.
const PREALLOC_LIMIT: u64 = 1 << 26;

/// Settings for opening an archive.
#[derive(Debug, Clone, Default)]
pub struct PakOptions {
    key: Option<AesKey>,
    strict: bool,
}

impl PakOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: AesKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn maybe_key(mut self, key: Option<AesKey>) -> Self {
        self.key = key;
        self
    }

    /// Turns hash mismatches into [`OpenError::IntegrityCheckFailed`] and
    /// [`ExtractError::IntegrityCheckFailed`] instead of warnings.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

enum Source {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Source {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Source::Mapped(map) => map,
            Source::Owned(bytes) => bytes,
        }
    }
}

/// A read-only, opened `.pak` archive.
///
/// The archive bytes and index are immutable after opening, so one archive
/// can be shared between any number of threads extracting entries at once.
pub struct PakArchive {
    source: Source,
    footer: Footer,
    index: PakIndex,
    key: Option<AesKey>,
    strict: bool,
}

impl PakArchive {
    /// Memory-maps the file at `path` and decodes its footer and index.
    pub fn open<P: AsRef<Path>>(path: P, options: PakOptions) -> Result<Self, OpenError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => OpenError::NotFound(path.to_path_buf()),
            _ => OpenError::Io(e),
        })?;
        let source = if file.metadata()?.len() == 0 {
            Source::Owned(vec![])
        } else {
            // SAFETY: the mapping is only ever read. Truncating the file from
            // another process while it is open is not supported.
            Source::Mapped(unsafe { Mmap::map(&file) }?)
        };
        log::debug!("opening {}", path.display());
        Self::from_source(source, options)
    }

    /// Decodes an archive already held in memory.
    pub fn from_bytes(bytes: Vec<u8>, options: PakOptions) -> Result<Self, OpenError> {
        Self::from_source(Source::Owned(bytes), options)
    }

    fn from_source(source: Source, options: PakOptions) -> Result<Self, OpenError> {
        let footer = detect_footer(&source)?;
        let index = PakIndex::decode(&footer, &source, options.key.as_ref(), options.strict)?;
        Ok(PakArchive {
            source,
            footer,
            index,
            key: options.key,
            strict: options.strict,
        })
    }

    pub fn version(&self) -> Version {
        self.footer.version
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn index(&self) -> &PakIndex {
        &self.index
    }

    pub fn mount_point(&self) -> &str {
        self.index.mount_point()
    }

    pub fn is_index_encrypted(&self) -> bool {
        self.footer.index_encrypted()
    }

    pub fn encryption_key_guid(&self) -> Option<[u8; 16]> {
        self.footer.encryption_key_guid
    }

    /// Total archive length in bytes.
    pub fn len(&self) -> u64 {
        self.source.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[EntryDescriptor] {
        self.index.entries()
    }

    pub fn entry(&self, path: &str) -> Option<&EntryDescriptor> {
        self.index.get(path)
    }

    /// Extracts the entry stored under `path`.
    pub fn extract(&self, path: &str) -> Result<Vec<u8>, ExtractError> {
        let entry = self
            .index
            .get(path)
            .ok_or_else(|| ExtractError::EntryNotFound(path.to_owned()))?;
        self.extract_entry(entry)
    }

    /// Reads, decrypts and decompresses every block of `entry` in order.
    pub fn extract_entry(&self, entry: &EntryDescriptor) -> Result<Vec<u8>, ExtractError> {
        let key = match entry.is_encrypted {
            true => Some(self.key.as_ref().ok_or(ExtractError::MissingKey)?),
            false => None,
        };
        let blocks = entry.data_blocks(self.version());
        let total = entry.uncompressed_size;

        let mut out = Vec::with_capacity(total.min(PREALLOC_LIMIT) as usize);
        let mut hasher = Sha1::new();
        for block in &blocks {
            let raw = self.read_range(block)?;
            let stored = match key {
                Some(key) => Cow::Owned(key.decrypt(raw)?),
                None => Cow::Borrowed(raw),
            };
            hasher.update(&stored);

            let remaining = total.saturating_sub(out.len() as u64);
            let expected = match entry.compression_block_size {
                0 => remaining,
                _ if blocks.len() == 1 => remaining,
                block_size => remaining.min(block_size.into()),
            };
            log::trace!(
                "{}: block {:#x}..{:#x} -> {expected} bytes",
                entry.path,
                block.start,
                block.end
            );
            let expected = usize::try_from(expected).map_err(|_| ExtractError::SizeMismatch {
                expected: total,
                actual: out.len() as u64,
            })?;
            out.extend(decompress(&entry.compression, &stored, expected)?);
        }

        if out.len() as u64 != total {
            return Err(ExtractError::SizeMismatch {
                expected: total,
                actual: out.len() as u64,
            });
        }

        if let Some(expected) = entry.hash.filter(|hash| hash.iter().any(|&b| b != 0)) {
            let actual: [u8; 20] = hasher.finalize().into();
            if actual != expected {
                if self.strict {
                    return Err(ExtractError::IntegrityCheckFailed(entry.path.clone()));
                }
                log::warn!("{}: content hash mismatch", entry.path);
            }
        }
        Ok(out)
    }

    fn read_range(&self, block: &Block) -> Result<&[u8], ExtractError> {
        let range = usize::try_from(block.start)
            .ok()
            .zip(usize::try_from(block.end).ok())
            .and_then(|(start, end)| self.source.get(start..end));
        range.ok_or_else(|| {
            ExtractError::TruncatedData(format!(
                "block {:#x}..{:#x} lies beyond the end of the archive ({} bytes)",
                block.start,
                block.end,
                self.source.len()
            ))
        })
    }
}

impl std::fmt::Debug for PakArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PakArchive")
            .field("version", &self.footer.version)
            .field("len", &self.source.len())
            .field("mount_point", &self.index.mount_point())
            .field("entries", &self.index.len())
            .field("strict", &self.strict)
            .finish()
    }
}
