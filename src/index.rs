use std::borrow::Cow;
use std::collections::HashMap;

use byteorder::LE;
use sha1::{Digest, Sha1};

use crate::crypto::AesKey;
use crate::cursor::ByteCursor;
use crate::errors::OpenError;
use crate::footer::Footer;
use crate::full_directory_index::read_full_directory_index;
use crate::path_hash_index::read_path_hash_index;
use crate::record::{read_encoded_record, read_record, EntryDescriptor};
use crate::version::{Version, VersionMajor};

/// Decoded archive index: entries in index order plus a path lookup.
#[derive(Debug)]
pub struct PakIndex {
    mount_point: String,
    entries: Vec<EntryDescriptor>,
    by_path: HashMap<String, usize>,
}

/// Secondary index region referenced from a v10+ primary index.
struct RegionRef {
    offset: u64,
    size: u64,
    hash: [u8; 20],
}

struct IndexReader<'a> {
    archive: &'a [u8],
    key: Option<&'a AesKey>,
    encrypted: bool,
    strict: bool,
}

impl<'a> IndexReader<'a> {
    fn region(&self, offset: u64, size: u64, what: &str) -> Result<Cow<'a, [u8]>, OpenError> {
        let len = self.archive.len() as u64;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= len)
            .ok_or_else(|| {
                OpenError::IndexCorrupt(format!(
                    "{what} at {offset:#x} ({size} bytes) lies beyond the end of the archive ({len} bytes)"
                ))
            })?;
        let raw = &self.archive[offset as usize..end as usize];
        if !self.encrypted {
            return Ok(Cow::Borrowed(raw));
        }
        let key = self.key.ok_or(OpenError::MissingKey)?;
        Ok(Cow::Owned(key.decrypt(raw)?))
    }

    fn verify(&self, data: &[u8], expected: &[u8; 20], what: &'static str) -> Result<(), OpenError> {
        let actual: [u8; 20] = Sha1::digest(data).into();
        if actual == *expected {
            return Ok(());
        }
        if self.strict {
            return Err(OpenError::IntegrityCheckFailed(what));
        }
        log::warn!(
            "{what} hash mismatch: stored {}, computed {}",
            hex::encode(expected),
            hex::encode(actual)
        );
        Ok(())
    }
}

impl PakIndex {
    /// Decodes the index referenced by `footer` out of the whole archive
    /// buffer, decrypting it first when the footer says so.
    pub fn decode(
        footer: &Footer,
        archive: &[u8],
        key: Option<&AesKey>,
        strict: bool,
    ) -> Result<Self, OpenError> {
        let reader = IndexReader {
            archive,
            key,
            encrypted: footer.index_encrypted(),
            strict,
        };
        let index = reader.region(footer.index_offset, footer.index_size, "index")?;
        reader.verify(&index, &footer.index_hash, "index")?;

        let (mount_point, entries) = if footer.version.version_major() >= VersionMajor::PathHashIndex {
            read_path_hash_index_layout(&reader, &index, footer)?
        } else {
            read_legacy_layout(&index, footer)?
        };

        let archive_len = archive.len() as u64;
        let mut by_path = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            validate(entry, archive_len)?;
            if let Some(previous) = by_path.insert(entry.path.clone(), position) {
                log::debug!(
                    "{} at #{position} shadows the earlier entry #{previous}",
                    entry.path
                );
            }
        }

        log::debug!(
            "decoded index: mount point {mount_point:?}, {} entries",
            entries.len()
        );
        Ok(PakIndex {
            mount_point,
            entries,
            by_path,
        })
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// All entries in index order, including ones shadowed by a later entry
    /// with the same path.
    pub fn entries(&self) -> &[EntryDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a path; the last entry in index order wins on duplicates.
    pub fn get(&self, path: &str) -> Option<&EntryDescriptor> {
        let path = normalize_path(path);
        self.by_path
            .get(&*path)
            .map(|&position| &self.entries[position])
    }

    /// Entries that are not shadowed by a later duplicate, in index order.
    pub fn live_entries(&self) -> impl Iterator<Item = &EntryDescriptor> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(position, entry)| self.by_path.get(&entry.path) == Some(position))
            .map(|(_, entry)| entry)
    }
}

fn normalize_path(path: &str) -> Cow<'_, str> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.contains('\\') {
        Cow::Owned(trimmed.replace('\\', "/"))
    } else {
        Cow::Borrowed(trimmed)
    }
}

fn validate(entry: &EntryDescriptor, archive_len: u64) -> Result<(), OpenError> {
    let in_range = entry
        .offset
        .checked_add(entry.compressed_size)
        .is_some_and(|end| end <= archive_len)
        && entry
            .blocks
            .iter()
            .all(|block| block.start <= block.end && block.end <= archive_len);
    if in_range {
        Ok(())
    } else {
        Err(OpenError::IndexCorrupt(format!(
            "entry {} at {:#x} ({} bytes) lies beyond the end of the archive ({archive_len} bytes)",
            entry.path, entry.offset, entry.compressed_size
        )))
    }
}

fn finish_entry(mut entry: EntryDescriptor, path: &str) -> Option<EntryDescriptor> {
    entry.path = normalize_path(path).into_owned();
    if entry.is_deleted {
        log::debug!("skipping deleted record {}", entry.path);
        return None;
    }
    Some(entry)
}

fn read_legacy_layout(
    index: &[u8],
    footer: &Footer,
) -> Result<(String, Vec<EntryDescriptor>), OpenError> {
    let mut reader = ByteCursor::new(index);
    let mount_point = reader.read_fstring()?;
    let entry_count = reader.read_u32::<LE>()? as usize;

    let mut entries = Vec::with_capacity(entry_count.min(reader.remaining()));
    for _ in 0..entry_count {
        let path = reader.read_fstring()?;
        let entry = read_record(&mut reader, footer.version, &footer.compression_methods)?;
        entries.extend(finish_entry(entry, &path));
    }
    Ok((mount_point, entries))
}

fn read_region_ref(reader: &mut ByteCursor<'_>) -> Result<Option<RegionRef>, OpenError> {
    if !reader.read_bool32()? {
        return Ok(None);
    }
    Ok(Some(RegionRef {
        offset: reader.read_u64::<LE>()?,
        size: reader.read_u64::<LE>()?,
        hash: reader.read_hash()?,
    }))
}

fn read_path_hash_index_layout(
    source: &IndexReader<'_>,
    index: &[u8],
    footer: &Footer,
) -> Result<(String, Vec<EntryDescriptor>), OpenError> {
    let version: Version = footer.version;
    let names = &footer.compression_methods;

    let mut reader = ByteCursor::new(index);
    let mount_point = reader.read_fstring()?;
    let entry_count = reader.read_u32::<LE>()?;
    let path_hash_seed = reader.read_u64::<LE>()?;
    let path_hash_index = read_region_ref(&mut reader)?;
    let full_directory_index = read_region_ref(&mut reader)?;
    let encoded_size = reader.read_u32::<LE>()? as usize;
    let encoded = reader.read_bytes(encoded_size)?;
    let unencoded = reader.read_array(|reader| read_record(reader, version, names))?;

    if let Some(phi) = path_hash_index {
        let region = source.region(phi.offset, phi.size, "path hash index")?;
        source.verify(&region, &phi.hash, "path hash index")?;
        let hashes = read_path_hash_index(&mut ByteCursor::new(&region))?;
        log::debug!(
            "path hash index: {} hashes, seed {path_hash_seed:#x}",
            hashes.0.len()
        );
    }

    let fdi = full_directory_index.ok_or_else(|| {
        OpenError::IndexCorrupt("archive has no full directory index to name its entries".into())
    })?;
    let region = source.region(fdi.offset, fdi.size, "full directory index")?;
    source.verify(&region, &fdi.hash, "full directory index")?;
    let directory = read_full_directory_index(&mut ByteCursor::new(&region))?;

    let mut located =
        Vec::with_capacity((entry_count as usize).min(encoded.len() + unencoded.len()));
    let mut encoded_reader = ByteCursor::new(encoded);
    for (path, location) in directory.files() {
        let (order, entry) = if location >= 0 {
            encoded_reader.seek(location as u64)?;
            let entry = read_encoded_record(&mut encoded_reader, version, names)?;
            ((0, location as usize), entry)
        } else {
            let position = (-(location as i64) - 1) as usize;
            let entry = unencoded.get(position).cloned().ok_or_else(|| {
                OpenError::IndexCorrupt(format!(
                    "{path} refers to unencoded entry #{position} of {}",
                    unencoded.len()
                ))
            })?;
            ((1, position), entry)
        };
        if let Some(entry) = finish_entry(entry, &path) {
            located.push((order, entry));
        }
    }
    located.sort_by_key(|(order, _)| *order);

    if located.len() != entry_count as usize {
        log::warn!(
            "index announces {entry_count} entries but its directory names {}",
            located.len()
        );
    }
    Ok((mount_point, located.into_iter().map(|(_, entry)| entry).collect()))
}
