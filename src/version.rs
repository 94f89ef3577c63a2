#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum VersionMajor {
    Initial = 1,               // v1 initial format
    NoTimestamps = 2,          // v2 timestamps removed
    CompressionEncryption = 3, // v3 compression and encryption support
    IndexEncryption = 4,       // v4 index encryption support
    RelativeChunkOffsets = 5,  // v5 offsets are relative to header
    DeleteRecords = 6,         // v6 record deletion support
    EncryptionKeyGuid = 7,     // v7 include key GUID
    FNameBasedCompression = 8, // v8 compression names included
    FrozenIndex = 9,           // v9 frozen index byte included
    PathHashIndex = 10,        // v10
    Fnv64BugFix = 11,          // v11
}

impl VersionMajor {
    pub fn from_u32(version: u32) -> Option<Self> {
        use VersionMajor::*;
        Some(match version {
            1 => Initial,
            2 => NoTimestamps,
            3 => CompressionEncryption,
            4 => IndexEncryption,
            5 => RelativeChunkOffsets,
            6 => DeleteRecords,
            7 => EncryptionKeyGuid,
            8 => FNameBasedCompression,
            9 => FrozenIndex,
            10 => PathHashIndex,
            11 => Fnv64BugFix,
            _ => return None,
        })
    }
}

/// Archive layout version. Major version 8 exists in two footer layouts:
/// v8a carries four compression names, v8b five.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8A,
    V8B,
    V9,
    V10,
    V11,
}

impl Version {
    /// All known layouts, oldest first.
    pub const ALL: [Version; 12] = [
        Version::V1,
        Version::V2,
        Version::V3,
        Version::V4,
        Version::V5,
        Version::V6,
        Version::V7,
        Version::V8A,
        Version::V8B,
        Version::V9,
        Version::V10,
        Version::V11,
    ];

    pub fn version_major(self) -> VersionMajor {
        use VersionMajor::*;
        match self {
            Version::V1 => Initial,
            Version::V2 => NoTimestamps,
            Version::V3 => CompressionEncryption,
            Version::V4 => IndexEncryption,
            Version::V5 => RelativeChunkOffsets,
            Version::V6 => DeleteRecords,
            Version::V7 => EncryptionKeyGuid,
            Version::V8A | Version::V8B => FNameBasedCompression,
            Version::V9 => FrozenIndex,
            Version::V10 => PathHashIndex,
            Version::V11 => Fnv64BugFix,
        }
    }

    /// Number of 32-byte compression method names stored in the footer.
    pub fn compression_name_count(self) -> usize {
        match self {
            v if v >= Version::V8B => 5,
            Version::V8A => 4,
            _ => 0,
        }
    }

    /// Offset of the magic field from the start of the footer.
    pub(crate) fn magic_offset(self) -> u64 {
        let mut offset = 0;
        if self.version_major() >= VersionMajor::EncryptionKeyGuid {
            // encryption key guid: u128
            offset += 16;
        }
        if self.version_major() >= VersionMajor::IndexEncryption {
            // encrypted: bool
            offset += 1;
        }
        offset
    }

    pub fn footer_size(self) -> u64 {
        // (magic + version): u32 + (offset + size): u64 + hash: [u8; 20]
        let mut size = self.magic_offset() + 4 + 4 + 8 + 8 + 20;
        if self.version_major() == VersionMajor::FrozenIndex {
            // frozen index: bool
            size += 1;
        }
        size + 32 * self.compression_name_count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_sizes() {
        assert_eq!(Version::V1.footer_size(), 44);
        assert_eq!(Version::V5.footer_size(), 45);
        assert_eq!(Version::V7.footer_size(), 61);
        assert_eq!(Version::V8A.footer_size(), 189);
        assert_eq!(Version::V8B.footer_size(), 221);
        assert_eq!(Version::V9.footer_size(), 222);
        assert_eq!(Version::V11.footer_size(), 221);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::V8B > Version::V8A);
        assert!(Version::V10.version_major() >= VersionMajor::RelativeChunkOffsets);
        assert_eq!(VersionMajor::from_u32(12), None);
        assert_eq!(VersionMajor::from_u32(11), Some(VersionMajor::Fnv64BugFix));
    }
}
