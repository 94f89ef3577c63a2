//! Reader for Unreal-style `.pak` archives (versions 1 through 11) and a
//! structural parser for standalone `.uasset` package headers.
//!
//! ```no_run
//! let archive = kurapak::open_archive("pakchunk0.pak", None)?;
//! for entry in kurapak::list_entries(&archive) {
//!     println!("{} ({} bytes, {})", entry.path, entry.uncompressed_size, entry.compression);
//! }
//! # Ok::<(), kurapak::OpenError>(())
//! ```

mod archive;
mod block;
mod compression;
mod crypto;
mod cursor;
mod errors;
mod footer;
mod full_directory_index;
mod index;
mod path_hash_index;
mod record;
mod session;
mod uasset;
mod version;

use std::path::Path;

pub use archive::{PakArchive, PakOptions};
pub use block::Block;
pub use compression::{decompress, Compression};
pub use crypto::{AesKey, InvalidKey};
pub use cursor::{ByteCursor, Encoding};
pub use errors::{CryptoError, DecodeError, ErrorKind, ExtractError, OpenError, ParseError};
pub use footer::Footer;
pub use index::PakIndex;
pub use record::EntryDescriptor;
pub use session::{
    CancellationToken, DirectorySink, EntryFailure, EntrySink, ExtractionSession, ProgressFn,
    SessionReport,
};
pub use uasset::{
    CustomVersion, Export, FName, Import, ObjectRef, PackageIndex, UAsset, UAssetHeader,
    UAssetOptions, PACKAGE_TAG,
};
pub use version::{Version, VersionMajor};

/// Footer magic of every `.pak` archive.
pub const MAGIC: u32 = 0x5A6F12E1;

/// Summary of one entry as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub compression: Compression,
}

impl From<&EntryDescriptor> for EntryInfo {
    fn from(entry: &EntryDescriptor) -> Self {
        EntryInfo {
            path: entry.path.clone(),
            uncompressed_size: entry.uncompressed_size,
            compressed_size: entry.compressed_size,
            compression: entry.compression.clone(),
        }
    }
}

/// Opens the archive at `path`, decrypting its index with `key` if needed.
pub fn open_archive<P: AsRef<Path>>(path: P, key: Option<AesKey>) -> Result<PakArchive, OpenError> {
    PakArchive::open(path, PakOptions::new().maybe_key(key))
}

/// Every entry in index order.
pub fn list_entries(archive: &PakArchive) -> Vec<EntryInfo> {
    archive.entries().iter().map(EntryInfo::from).collect()
}

/// Extracts the live entry stored under `path`.
pub fn extract_entry(archive: &PakArchive, path: &str) -> Result<Vec<u8>, ExtractError> {
    archive.extract(path)
}

/// Extracts every live entry to `output_dir / logical path`, continuing past
/// failed entries.
pub fn extract_all<P: AsRef<Path>>(
    archive: &PakArchive,
    output_dir: P,
    progress: Option<&ProgressFn<'_>>,
) -> SessionReport {
    let sink = DirectorySink::new(output_dir.as_ref());
    let session = ExtractionSession::new(archive);
    match progress {
        Some(progress) => session.progress(progress).run(&sink),
        None => session.run(&sink),
    }
}

/// Parses a standalone `.uasset` package header.
pub fn parse_uasset(bytes: &[u8]) -> Result<UAsset, ParseError> {
    UAsset::parse(bytes)
}
