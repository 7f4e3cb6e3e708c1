//! Whole-archive signature.
//!
//! A signed archive ends with:
//!
//! ```text
//! ... payloads | signature bytes | [u32 sig len] | u32 algorithm | "GBMB"
//! ```
//!
//! For hash algorithms the signature is a fixed-size digest of every byte
//! before it. OpenSSL signatures carry a 4-byte length before the trailer;
//! they are read but never verified here.

use digest::DynDigest;
use std::io::Read;
use tracing::debug;

use crate::io::{ReadAt, ReadAtStream, StreamError};

use super::error::{Error, Result};
use super::structures::*;

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Source of hashers for signature verification.
///
/// Returning `None` makes verification fail with
/// [`Error::UnsupportedSignatureAlgorithm`]; it never counts as a pass.
pub trait DigestProvider: Send + Sync {
    fn hasher(&self, algorithm: SignatureAlgorithm) -> Option<Box<dyn DynDigest + Send>>;
}

/// Pure-Rust hashers for MD5, SHA-1, SHA-256 and SHA-512.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareDigests;

impl DigestProvider for SoftwareDigests {
    fn hasher(&self, algorithm: SignatureAlgorithm) -> Option<Box<dyn DynDigest + Send>> {
        match algorithm {
            SignatureAlgorithm::Md5 => Some(Box::new(md5::Md5::default())),
            SignatureAlgorithm::Sha1 => Some(Box::new(sha1::Sha1::default())),
            SignatureAlgorithm::Sha256 => Some(Box::new(sha2::Sha256::default())),
            SignatureAlgorithm::Sha512 => Some(Box::new(sha2::Sha512::default())),
            SignatureAlgorithm::OpenSsl
            | SignatureAlgorithm::OpenSslSha256
            | SignatureAlgorithm::OpenSslSha512 => None,
        }
    }
}

/// Read the signature block at the end of `source`.
///
/// Only the trailer and the stored bytes are decoded; nothing is hashed.
pub fn read_signature<R: ReadAt + ?Sized>(source: &R, max_blob_len: u32) -> Result<Signature> {
    let size = source.size();
    let trailer = read_tail(source, size, SIGNATURE_TRAILER_SIZE, "signature trailer")?;

    let id = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let magic = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    if magic != SIGNATURE_MAGIC {
        return Err(Error::BadTrailerMagic(magic));
    }

    let algorithm = SignatureAlgorithm::from_id(id).ok_or(Error::InvalidSignatureAlgorithm(id))?;

    let bytes = match algorithm.kind() {
        SignatureKind::Digest { len } => {
            read_tail(source, size, len as u64 + SIGNATURE_TRAILER_SIZE, "signature digest")?
                [..len]
                .to_vec()
        }
        SignatureKind::Asymmetric => {
            let raw = read_tail(source, size, SIGNATURE_TRAILER_SIZE + 4, "signature length")?;
            let blob_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            if blob_len == 0 || blob_len > max_blob_len {
                return Err(Error::InvalidSignatureLength {
                    len: blob_len,
                    max: max_blob_len,
                });
            }
            let span = blob_len as u64 + SIGNATURE_TRAILER_SIZE + 4;
            read_tail(source, size, span, "signature blob")?[..blob_len as usize].to_vec()
        }
    };

    debug!(%algorithm, len = bytes.len(), "read signature");
    Ok(Signature { algorithm, bytes })
}

/// Check `signature` against the archive contents.
///
/// Hashes `[0, size - 8 - digest_len)` and compares it to the stored digest.
pub fn verify_signature<R: ReadAt + ?Sized>(
    source: &R,
    signature: &Signature,
    digests: &dyn DigestProvider,
) -> Result<()> {
    let unsupported = || Error::UnsupportedSignatureAlgorithm {
        signature: signature.clone(),
    };

    let SignatureKind::Digest { len } = signature.algorithm.kind() else {
        return Err(unsupported());
    };
    let mut hasher = digests.hasher(signature.algorithm).ok_or_else(unsupported)?;

    let signed_len = source
        .size()
        .checked_sub(len as u64 + SIGNATURE_TRAILER_SIZE)
        .ok_or(Error::TruncatedHeader {
            field: "signature digest",
            offset: 0,
            needed: len as u64 + SIGNATURE_TRAILER_SIZE,
            available: source.size(),
        })?;

    let mut stream = ReadAtStream::new(source, 0, signed_len);
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(StreamError::classify(e).into_inner())),
        };
        hasher.update(&buf[..n]);
    }

    let actual = hasher.finalize();
    if actual[..] != signature.bytes[..] {
        return Err(Error::BadSignature {
            algorithm: signature.algorithm,
        });
    }

    debug!(algorithm = %signature.algorithm, signed_len, "signature verified");
    Ok(())
}

/// Read the last `len` bytes of the source.
fn read_tail<R: ReadAt + ?Sized>(
    source: &R,
    size: u64,
    len: u64,
    field: &'static str,
) -> Result<Vec<u8>> {
    let offset = size.checked_sub(len).ok_or(Error::TruncatedHeader {
        field,
        offset: 0,
        needed: len,
        available: size,
    })?;
    let mut buf = vec![0u8; len as usize];
    source.read_exact_at(offset, &mut buf)?;
    Ok(buf)
}
