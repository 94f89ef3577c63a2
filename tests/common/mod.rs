//! Builds `.pak` archives in memory for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256Enc;
use byteorder::{WriteBytesExt, LE};
use sha1::{Digest, Sha1};

use kurapak::{AesKey, Version, VersionMajor, MAGIC};

pub const KEY: [u8; 32] = [
    0x94, 0xD2, 0x5B, 0xC3, 0xAE, 0xB4, 0x20, 0xE0, 0xBE, 0x91, 0x4E, 0xDC, 0x9D, 0x54, 0x35,
    0xA1, 0xEA, 0xAB, 0x5F, 0x28, 0x64, 0xE0, 0x9E, 0x94, 0x01, 0x9A, 0xC1, 0x05, 0xB7, 0x27,
    0xA7, 0xDE,
];

/// Footer compression names: slot 1 is zlib, slot 2 zstd.
const COMPRESSION_NAMES: [&str; 2] = ["Zlib", "Zstd"];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn key() -> AesKey {
    AesKey::from_bytes(&KEY)
}

/// Deterministic, mildly compressible sample content.
pub fn sample_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i / 7) as u8).wrapping_mul(31).wrapping_add(seed) ^ (i % 5) as u8)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    None,
    Zlib,
    Zstd,
}

#[derive(Debug, Clone)]
pub struct TestEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub method: Method,
    /// Uncompressed bytes per block; 0 keeps the payload in one block.
    pub block_size: u32,
    pub encrypted: bool,
    /// Cuts the last stored block in half after compression.
    pub truncated: bool,
}

impl TestEntry {
    pub fn new(path: &str, data: Vec<u8>) -> Self {
        Self {
            path: path.to_owned(),
            data,
            method: Method::None,
            block_size: 0,
            encrypted: false,
            truncated: false,
        }
    }

    pub fn compressed(mut self, method: Method, block_size: u32) -> Self {
        self.method = method;
        self.block_size = block_size;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }
}

pub struct PakBuilder {
    version: Version,
    mount_point: String,
    entries: Vec<TestEntry>,
    encrypt_index: bool,
}

/// An entry after compression and encryption, as laid out in the archive.
struct Written {
    path: String,
    offset: u64,
    compressed_size: u64,
    uncompressed_size: u64,
    raw_compression: u32,
    hash: [u8; 20],
    /// On-disk block ranges relative to the start of the archive.
    blocks: Vec<(u64, u64)>,
    encrypted: bool,
    block_size: u32,
}

impl PakBuilder {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            mount_point: "../../../".to_owned(),
            entries: vec![],
            encrypt_index: false,
        }
    }

    pub fn mount_point(mut self, mount_point: &str) -> Self {
        self.mount_point = mount_point.to_owned();
        self
    }

    pub fn encrypt_index(mut self) -> Self {
        self.encrypt_index = true;
        self
    }

    pub fn store(self, path: &str, data: Vec<u8>) -> Self {
        self.add(TestEntry::new(path, data))
    }

    pub fn add(mut self, entry: TestEntry) -> Self {
        self.entries.push(entry);
        self
    }

    fn major(&self) -> VersionMajor {
        self.version.version_major()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![];
        let written: Vec<Written> = self
            .entries
            .iter()
            .map(|entry| self.write_entry(&mut out, entry))
            .collect();

        let index_offset = out.len() as u64;
        let index = if self.major() >= VersionMajor::PathHashIndex {
            self.path_hash_index(&written, index_offset)
        } else {
            self.legacy_index(&written)
        };
        let index_hash: [u8; 20] = Sha1::digest(&index.primary).into();
        let primary = self.maybe_encrypt(&index.primary);
        out.extend(&primary);
        for region in &index.secondary {
            out.extend(self.maybe_encrypt(region));
        }

        self.write_footer(&mut out, index_offset, primary.len() as u64, index_hash);
        out
    }

    fn maybe_encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        if self.encrypt_index {
            encrypt(&KEY, plaintext)
        } else {
            plaintext.to_vec()
        }
    }

    fn raw_compression(&self, method: Method) -> u32 {
        let name = match method {
            Method::None => return 0,
            Method::Zlib => "Zlib",
            Method::Zstd => "Zstd",
        };
        if self.major() >= VersionMajor::FNameBasedCompression {
            COMPRESSION_NAMES
                .iter()
                .position(|&n| n == name)
                .map(|slot| slot as u32 + 1)
                .unwrap()
        } else {
            assert_eq!(method, Method::Zlib, "legacy flags only know zlib");
            0x01
        }
    }

    fn write_entry(&self, out: &mut Vec<u8>, entry: &TestEntry) -> Written {
        let offset = out.len() as u64;

        let mut chunks: Vec<Vec<u8>> = match entry.method {
            Method::None => vec![entry.data.clone()],
            method => {
                let block_size = match entry.block_size {
                    0 => entry.data.len().max(1),
                    size => size as usize,
                };
                entry
                    .data
                    .chunks(block_size)
                    .map(|chunk| compress(method, chunk))
                    .collect()
            }
        };
        if entry.truncated {
            let last = chunks.last_mut().unwrap();
            last.truncate(last.len() / 2);
        }

        let compressed_size = chunks.iter().map(|c| c.len() as u64).sum();
        let hash: [u8; 20] = {
            let mut hasher = Sha1::new();
            for chunk in &chunks {
                hasher.update(chunk);
            }
            hasher.finalize().into()
        };
        let stored: Vec<Vec<u8>> = chunks
            .iter()
            .map(|chunk| match entry.encrypted {
                true => encrypt(&KEY, chunk),
                false => chunk.clone(),
            })
            .collect();

        let compressed = entry.method != Method::None;
        let block_count = if compressed { stored.len() } else { 0 };
        let header_size = record_size(self.version, compressed, block_count);
        let mut blocks = vec![];
        let mut cursor = offset + header_size;
        if compressed {
            for chunk in &stored {
                blocks.push((cursor, cursor + chunk.len() as u64));
                cursor += chunk.len() as u64;
            }
        }

        let block_size = match (entry.method, entry.block_size) {
            (Method::None, _) => 0,
            (_, 0) => entry.data.len() as u32,
            (_, size) => size,
        };
        let written = Written {
            path: entry.path.clone(),
            offset,
            compressed_size,
            uncompressed_size: entry.data.len() as u64,
            raw_compression: self.raw_compression(entry.method),
            hash,
            blocks,
            encrypted: entry.encrypted,
            block_size,
        };

        self.write_record(out, &written, 0);
        assert_eq!(out.len() as u64, offset + header_size);
        for chunk in &stored {
            out.extend(chunk);
        }
        written
    }

    /// The in-data header uses `offset` 0, the index copy the real offset.
    fn write_record(&self, out: &mut Vec<u8>, entry: &Written, offset: u64) {
        let major = self.major();
        out.write_u64::<LE>(offset).unwrap();
        out.write_u64::<LE>(entry.compressed_size).unwrap();
        out.write_u64::<LE>(entry.uncompressed_size).unwrap();
        if self.version == Version::V8A {
            out.write_u8(entry.raw_compression as u8).unwrap();
        } else {
            out.write_u32::<LE>(entry.raw_compression).unwrap();
        }
        if major == VersionMajor::Initial {
            out.write_u64::<LE>(0).unwrap();
        }
        out.write_all(&entry.hash).unwrap();
        if major >= VersionMajor::CompressionEncryption {
            if entry.raw_compression != 0 {
                out.write_u32::<LE>(entry.blocks.len() as u32).unwrap();
                let base = match major >= VersionMajor::RelativeChunkOffsets {
                    true => entry.offset,
                    false => 0,
                };
                for (start, end) in &entry.blocks {
                    out.write_u64::<LE>(start - base).unwrap();
                    out.write_u64::<LE>(end - base).unwrap();
                }
            }
            out.write_u8(entry.encrypted as u8).unwrap();
            out.write_u32::<LE>(entry.block_size).unwrap();
        }
    }

    fn legacy_index(&self, written: &[Written]) -> Index {
        let mut index = vec![];
        write_fstring(&mut index, &self.mount_point);
        index.write_u32::<LE>(written.len() as u32).unwrap();
        for entry in written {
            write_fstring(&mut index, &entry.path);
            self.write_record(&mut index, entry, entry.offset);
        }
        Index {
            primary: index,
            secondary: vec![],
        }
    }

    fn write_encoded(&self, out: &mut Vec<u8>, entry: &Written) {
        let fits = |value: u64| value <= u32::MAX as u64;
        let block_count = entry.blocks.len() as u32;
        let explicit_block_size = block_count > 0
            && (entry.block_size % 2048 != 0 || entry.block_size >> 11 >= 0x3f);

        let mut bits = match (block_count, explicit_block_size) {
            (0, _) => 0,
            (_, true) => 0x3f,
            (_, false) => entry.block_size >> 11,
        };
        bits |= block_count << 6;
        bits |= (entry.encrypted as u32) << 22;
        bits |= entry.raw_compression << 23;
        bits |= (fits(entry.compressed_size) as u32) << 29;
        bits |= (fits(entry.uncompressed_size) as u32) << 30;
        bits |= (fits(entry.offset) as u32) << 31;
        out.write_u32::<LE>(bits).unwrap();

        if explicit_block_size {
            out.write_u32::<LE>(entry.block_size).unwrap();
        }
        let mut var_int = |value: u64| {
            if fits(value) {
                out.write_u32::<LE>(value as u32).unwrap();
            } else {
                out.write_u64::<LE>(value).unwrap();
            }
        };
        var_int(entry.offset);
        var_int(entry.uncompressed_size);
        if entry.raw_compression != 0 {
            var_int(entry.compressed_size);
        }
        if !(block_count == 1 && !entry.encrypted) {
            for (start, end) in &entry.blocks {
                out.write_u32::<LE>((end - start) as u32).unwrap();
            }
        }
    }

    fn path_hash_index(&self, written: &[Written], index_offset: u64) -> Index {
        let mut encoded = vec![];
        let mut directories: BTreeMap<String, BTreeMap<String, i32>> = BTreeMap::new();
        let mut hashes = vec![];
        for (i, entry) in written.iter().enumerate() {
            let location = encoded.len() as i32;
            self.write_encoded(&mut encoded, entry);
            let (directory, file) = match entry.path.rsplit_once('/') {
                Some((directory, file)) => (format!("/{directory}/"), file.to_owned()),
                None => ("/".to_owned(), entry.path.clone()),
            };
            directories.entry(directory).or_default().insert(file, location);
            hashes.push((0x1000 + i as u64, location));
        }

        let mut phi = vec![];
        phi.write_u32::<LE>(hashes.len() as u32).unwrap();
        for (hash, location) in hashes {
            phi.write_u64::<LE>(hash).unwrap();
            phi.write_i32::<LE>(location).unwrap();
        }

        let mut fdi = vec![];
        fdi.write_u32::<LE>(directories.len() as u32).unwrap();
        for (directory, files) in &directories {
            write_fstring(&mut fdi, directory);
            fdi.write_u32::<LE>(files.len() as u32).unwrap();
            for (file, location) in files {
                write_fstring(&mut fdi, file);
                fdi.write_i32::<LE>(*location).unwrap();
            }
        }

        let on_disk = |region: &[u8]| self.maybe_encrypt(region).len() as u64;
        let primary_size = |phi_offset: u64, fdi_offset: u64| {
            self.primary_index(written.len(), &encoded, (phi_offset, &phi), (fdi_offset, &fdi))
        };
        // the layout of the primary index does not depend on the offsets
        let primary_len = on_disk(&primary_size(0, 0));
        let phi_offset = index_offset + primary_len;
        let fdi_offset = phi_offset + on_disk(&phi);
        let primary = primary_size(phi_offset, fdi_offset);

        Index {
            primary,
            secondary: vec![phi, fdi],
        }
    }

    fn primary_index(
        &self,
        count: usize,
        encoded: &[u8],
        (phi_offset, phi): (u64, &[u8]),
        (fdi_offset, fdi): (u64, &[u8]),
    ) -> Vec<u8> {
        let mut index = vec![];
        write_fstring(&mut index, &self.mount_point);
        index.write_u32::<LE>(count as u32).unwrap();
        index.write_u64::<LE>(0x0123_4567_89AB_CDEF).unwrap();
        for (offset, region) in [(phi_offset, phi), (fdi_offset, fdi)] {
            index.write_u32::<LE>(1).unwrap();
            index.write_u64::<LE>(offset).unwrap();
            index.write_u64::<LE>(self.maybe_encrypt(region).len() as u64).unwrap();
            index.write_all(&Sha1::digest(region)).unwrap();
        }
        index.write_u32::<LE>(encoded.len() as u32).unwrap();
        index.write_all(encoded).unwrap();
        index.write_u32::<LE>(0).unwrap(); // unencoded records
        index
    }

    fn write_footer(&self, out: &mut Vec<u8>, index_offset: u64, index_size: u64, hash: [u8; 20]) {
        let major = self.major();
        if major >= VersionMajor::EncryptionKeyGuid {
            out.write_all(&[0; 16]).unwrap();
        }
        if major >= VersionMajor::IndexEncryption {
            out.write_u8(self.encrypt_index as u8).unwrap();
        }
        out.write_u32::<LE>(MAGIC).unwrap();
        out.write_u32::<LE>(major as u32).unwrap();
        out.write_u64::<LE>(index_offset).unwrap();
        out.write_u64::<LE>(index_size).unwrap();
        out.write_all(&hash).unwrap();
        if major == VersionMajor::FrozenIndex {
            out.write_u8(0).unwrap();
        }
        let name_count = match self.version {
            Version::V8A => 4,
            v if v >= Version::V8B => 5,
            _ => 0,
        };
        for slot in 0..name_count {
            let mut name = [0u8; 32];
            if let Some(n) = COMPRESSION_NAMES.get(slot) {
                name[..n.len()].copy_from_slice(n.as_bytes());
            }
            out.write_all(&name).unwrap();
        }
    }
}

struct Index {
    primary: Vec<u8>,
    secondary: Vec<Vec<u8>>,
}

/// Size of the legacy record layout, also used as the in-data header.
pub fn record_size(version: Version, compressed: bool, block_count: usize) -> u64 {
    let major = version.version_major();
    let mut size = 8 + 8 + 8 + 20;
    size += if version == Version::V8A { 1 } else { 4 };
    if major == VersionMajor::Initial {
        size += 8;
    }
    if major >= VersionMajor::CompressionEncryption {
        if compressed {
            size += 4 + 16 * block_count as u64;
        }
        size += 1 + 4;
    }
    size
}

pub fn write_fstring(out: &mut Vec<u8>, s: &str) {
    if s.is_empty() {
        out.write_i32::<LE>(0).unwrap();
        return;
    }
    out.write_i32::<LE>(s.len() as i32 + 1).unwrap();
    out.write_all(s.as_bytes()).unwrap();
    out.write_u8(0).unwrap();
}

pub fn compress(method: Method, data: &[u8]) -> Vec<u8> {
    match method {
        Method::None => data.to_vec(),
        Method::Zlib => {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Method::Zstd => zstd::stream::encode_all(data, 3).unwrap(),
    }
}

/// AES-256-CBC with a zero IV and PKCS#7 padding.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Enc::new(GenericArray::from_slice(key));
    let pad = 16 - plaintext.len() % 16;
    let mut buf = plaintext.to_vec();
    buf.resize(plaintext.len() + pad, pad as u8);
    let mut previous = [0u8; 16];
    for chunk in buf.chunks_exact_mut(16) {
        for (byte, prev) in chunk.iter_mut().zip(previous.iter()) {
            *byte ^= prev;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        previous.copy_from_slice(chunk);
    }
    buf
}

/// Overwrites the last occurrence of `value` in `bytes`, returning its position.
pub fn patch_last_u64(bytes: &mut [u8], value: u64, replacement: u64) -> usize {
    let needle = value.to_le_bytes();
    let at = bytes
        .windows(8)
        .rposition(|window| window == needle)
        .unwrap();
    bytes[at..at + 8].copy_from_slice(&replacement.to_le_bytes());
    at
}
