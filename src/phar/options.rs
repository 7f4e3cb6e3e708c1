use std::fmt;
use std::sync::Arc;

use super::signature::{DigestProvider, SoftwareDigests};
use super::stub::DEFAULT_SCAN_WINDOW;
use super::structures::MAX_SIGNATURE_LEN;

/// Tunables for [`Archive::parse_with`](super::Archive::parse_with).
#[derive(Clone)]
pub struct ParseOptions {
    /// Bytes read per step while looking for the stub terminator.
    pub scan_window: usize,
    /// Largest OpenSSL signature blob accepted, in bytes.
    pub max_signature_len: u32,
    /// Hashers used to verify digest signatures.
    pub digests: Arc<dyn DigestProvider>,
}

impl ParseOptions {
    pub fn with_scan_window(mut self, scan_window: usize) -> Self {
        self.scan_window = scan_window;
        self
    }

    pub fn with_max_signature_len(mut self, max_signature_len: u32) -> Self {
        self.max_signature_len = max_signature_len;
        self
    }

    /// Swap in another hashing backend.
    pub fn with_digest_provider(mut self, digests: Arc<dyn DigestProvider>) -> Self {
        self.digests = digests;
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            scan_window: DEFAULT_SCAN_WINDOW,
            max_signature_len: MAX_SIGNATURE_LEN,
            digests: Arc::new(SoftwareDigests),
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("scan_window", &self.scan_window)
            .field("max_signature_len", &self.max_signature_len)
            .finish_non_exhaustive()
    }
}
