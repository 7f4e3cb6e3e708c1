//! Error types for PHAR decoding.

use thiserror::Error;

use super::structures::{SignatureAlgorithm, Signature};

/// Convenience return type.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can stop an archive from parsing.
///
/// Each message is prefixed with the phase that failed.
#[derive(Error, Debug)]
pub enum Error {
    /// The byte source itself failed.
    #[error("phar: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No `__HALT_COMPILER(); ?>` before the end of the source.
    #[error("phar stub: `__HALT_COMPILER(); ?>` marker not found")]
    MarkerNotFound,

    /// The marker was found but the source ends right after it.
    #[error("phar stub: unexpected end of file after marker at offset {offset}")]
    UnexpectedEnd { offset: u64 },

    /// A fixed or length-prefixed field runs past the end of the source.
    #[error(
        "phar {field}: truncated at offset {offset}: need {needed} bytes, {available} available"
    )]
    TruncatedHeader {
        field: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("phar signature: invalid signature algorithm {0:#06x}")]
    InvalidSignatureAlgorithm(u32),

    #[error("phar signature: bad trailer magic {0:#010x}, expected \"GBMB\"")]
    BadTrailerMagic(u32),

    /// An OpenSSL signature blob length outside `1..=max`.
    #[error("phar signature: invalid signature length {len}, expected 1 to {max} bytes")]
    InvalidSignatureLength { len: u32, max: u32 },

    /// Stored digest does not match the archive contents.
    #[error("phar signature: {algorithm} digest mismatch")]
    BadSignature { algorithm: SignatureAlgorithm },

    /// The signature was parsed but cannot be checked here.
    #[error("phar signature: {} signatures cannot be verified", signature.algorithm)]
    UnsupportedSignatureAlgorithm { signature: Signature },

    #[error("phar entry {entry}: invalid compression flags {flags:#010x}")]
    InvalidCompression { entry: String, flags: u32 },

    #[error("phar payload {entry}: {len} bytes at offset {offset} extend past the end of the source")]
    PayloadOutOfBounds { entry: String, offset: u64, len: u64 },

    #[error("phar payload {entry}: bad CRC, expected {expected:#010x}, got {actual:#010x}")]
    BadCrc {
        entry: String,
        expected: u32,
        actual: u32,
    },

    #[error("phar payload {entry}: size mismatch, expected {expected} bytes, got {actual}")]
    SizeMismatch {
        entry: String,
        expected: u64,
        actual: u64,
    },

    #[error("phar payload {entry}: corrupt data: {source}")]
    CorruptEntryPayload {
        entry: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Entry named by this error, if any.
    pub fn entry(&self) -> Option<&str> {
        match self {
            Error::InvalidCompression { entry, .. }
            | Error::PayloadOutOfBounds { entry, .. }
            | Error::BadCrc { entry, .. }
            | Error::SizeMismatch { entry, .. }
            | Error::CorruptEntryPayload { entry, .. } => Some(entry),
            _ => None,
        }
    }
}
