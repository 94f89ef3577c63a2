mod common;

use common::{init_logging, sample_data, Method, PakBuilder, TestEntry};
use kurapak::{OpenError, PakArchive, PakOptions, Version};

fn sample_pak(version: Version) -> Vec<u8> {
    let mut builder = PakBuilder::new(version).store("test.txt", b"hello pak".to_vec());
    if version.version_major() >= kurapak::VersionMajor::CompressionEncryption {
        builder = builder.add(
            TestEntry::new("directory/nested.bin", sample_data(5000, 3))
                .compressed(Method::Zlib, 0x800),
        );
    }
    builder.build()
}

/// Offset of the footer's `index_offset` field from the end of the archive.
fn index_offset_field(version: Version) -> usize {
    let magic_offset = match version.version_major() as u32 {
        1..=3 => 0,
        4..=6 => 1,
        _ => 17,
    };
    version.footer_size() as usize - magic_offset - 8
}

#[test]
fn test_detect_every_version() {
    init_logging();
    for version in Version::ALL {
        let archive = PakArchive::from_bytes(sample_pak(version), PakOptions::new())
            .unwrap_or_else(|e| panic!("{version:?}: {e}"));
        assert_eq!(archive.version(), version);
        assert_eq!(archive.footer().magic, kurapak::MAGIC);
        assert_eq!(archive.mount_point(), "../../../");
        assert_eq!(archive.extract("test.txt").unwrap(), b"hello pak");
        assert_eq!(
            archive.footer().compression_methods.len(),
            version.compression_name_count()
        );
    }
}

#[test]
fn test_footer_fields_v9() {
    let archive = PakArchive::from_bytes(sample_pak(Version::V9), PakOptions::new()).unwrap();
    let footer = archive.footer();
    assert_eq!(footer.size(), 222);
    assert_eq!(footer.is_index_frozen, Some(false));
    assert_eq!(footer.is_index_encrypted, Some(false));
    assert_eq!(archive.encryption_key_guid(), Some([0; 16]));
    assert_eq!(footer.compression_methods[..2], ["Zlib", "Zstd"]);
}

#[test]
fn test_unsupported_version() {
    let mut bytes = sample_pak(Version::V11);
    let len = bytes.len();
    let version_at = len - index_offset_field(Version::V11) - 4;
    bytes[version_at..version_at + 4].copy_from_slice(&42u32.to_le_bytes());
    assert!(matches!(
        PakArchive::from_bytes(bytes, PakOptions::new()),
        Err(OpenError::UnsupportedVersion(42))
    ));
}

#[test]
fn test_not_a_pak() {
    assert!(matches!(
        PakArchive::from_bytes(vec![0x5A; 4096], PakOptions::new()),
        Err(OpenError::InvalidMagic)
    ));
    assert!(matches!(
        PakArchive::from_bytes(vec![], PakOptions::new()),
        Err(OpenError::InvalidMagic)
    ));
}

#[test]
fn test_index_offset_beyond_end() {
    for version in [Version::V3, Version::V8A, Version::V11] {
        let mut bytes = sample_pak(version);
        let len = bytes.len();
        let at = len - index_offset_field(version);
        bytes[at..at + 8].copy_from_slice(&(len as u64 + 100).to_le_bytes());
        assert!(
            matches!(
                PakArchive::from_bytes(bytes, PakOptions::new()),
                Err(OpenError::IndexCorrupt(_))
            ),
            "{version:?}"
        );
    }
}
