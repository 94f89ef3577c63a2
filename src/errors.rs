use std::path::PathBuf;
use thiserror::Error;

/// Low-level failures raised by [`ByteCursor`](crate::ByteCursor) reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated data: wanted {wanted} bytes at offset {offset} but only {available} remain")]
    TruncatedData {
        offset: usize,
        wanted: usize,
        available: usize,
    },
    #[error("found invalid bool representation {0}")]
    Bool(u32),
    #[error("invalid string encoding at offset {0}")]
    InvalidString(usize),
    #[error("cannot seek to {offset} in a buffer of {len} bytes")]
    SeekOutOfRange { offset: u64, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("padding validation failed (wrong key?)")]
    PaddingValidationFailed,
    #[error("ciphertext length {0} is not a non-zero multiple of the AES block size")]
    UnalignedCiphertext(usize),
}

/// Errors that prevent an archive from being opened. No partial archive is
/// ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("archive not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a pak archive: footer magic not found")]
    InvalidMagic,
    #[error("version {0} is not a supported version")]
    UnsupportedVersion(u32),
    #[error("index is corrupt: {0}")]
    IndexCorrupt(String),
    #[error("missing key to decrypt encrypted index")]
    MissingKey,
    #[error("index decryption failed: padding validation failed (wrong key?)")]
    PaddingValidationFailed,
    #[error("integrity check failed for {0}")]
    IntegrityCheckFailed(&'static str),
}

impl From<DecodeError> for OpenError {
    fn from(err: DecodeError) -> Self {
        OpenError::IndexCorrupt(err.to_string())
    }
}

impl From<CryptoError> for OpenError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::PaddingValidationFailed => OpenError::PaddingValidationFailed,
            e @ CryptoError::UnalignedCiphertext(_) => OpenError::IndexCorrupt(e.to_string()),
        }
    }
}

/// Errors raised while extracting a single entry.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("decompressed {actual} bytes but expected {expected}")]
    DecompressionSizeMismatch { expected: u64, actual: u64 },
    #[error("unsupported compression method {0}")]
    UnsupportedCompression(String),
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),
    #[error("missing key to decrypt encrypted entry")]
    MissingKey,
    #[error("entry decryption failed: padding validation failed (wrong key?)")]
    PaddingValidationFailed,
    #[error("extracted {actual} bytes but the index records {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("truncated data: {0}")]
    TruncatedData(String),
    #[error("integrity check failed for {0}")]
    IntegrityCheckFailed(String),
    #[error("refusing to write outside the output directory: {0}")]
    UnsafePath(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DecodeError> for ExtractError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::TruncatedData { .. } => ExtractError::TruncatedData(err.to_string()),
            other => ExtractError::CorruptStream(other.to_string()),
        }
    }
}

impl From<CryptoError> for ExtractError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::PaddingValidationFailed => ExtractError::PaddingValidationFailed,
            e @ CryptoError::UnalignedCiphertext(_) => ExtractError::TruncatedData(e.to_string()),
        }
    }
}

/// Discriminant of an [`ExtractError`], used in session reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EntryNotFound,
    DecompressionSizeMismatch,
    UnsupportedCompression,
    CorruptStream,
    MissingKey,
    PaddingValidationFailed,
    SizeMismatch,
    TruncatedData,
    IntegrityCheckFailed,
    UnsafePath,
    Io,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::EntryNotFound(_) => ErrorKind::EntryNotFound,
            ExtractError::DecompressionSizeMismatch { .. } => ErrorKind::DecompressionSizeMismatch,
            ExtractError::UnsupportedCompression(_) => ErrorKind::UnsupportedCompression,
            ExtractError::CorruptStream(_) => ErrorKind::CorruptStream,
            ExtractError::MissingKey => ErrorKind::MissingKey,
            ExtractError::PaddingValidationFailed => ErrorKind::PaddingValidationFailed,
            ExtractError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            ExtractError::TruncatedData(_) => ErrorKind::TruncatedData,
            ExtractError::IntegrityCheckFailed(_) => ErrorKind::IntegrityCheckFailed,
            ExtractError::UnsafePath(_) => ErrorKind::UnsafePath,
            ExtractError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Errors raised by the standalone package parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed asset: {0}")]
    MalformedAsset(String),
    #[error("legacy file version {0} is not supported")]
    UnsupportedVersion(i32),
    #[error("truncated data: {0}")]
    TruncatedData(String),
}

impl From<DecodeError> for ParseError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::TruncatedData { .. } => ParseError::TruncatedData(err.to_string()),
            other => ParseError::MalformedAsset(other.to_string()),
        }
    }
}
