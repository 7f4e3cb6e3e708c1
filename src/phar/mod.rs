//! PHAR archive parsing and extraction.
//!
//! ## Architecture
//!
//! - `stub`: finds the end of the PHP bootstrap stub
//! - `parser`: decodes the manifest and the entry table
//! - `signature`: reads and verifies the trailing signature
//! - `payload`: decompressing streams over entry payloads
//! - [`Archive`]: runs the phases in order and verifies every entry
//! - [`PharExtractor`]: writes entries to memory, disk or stdout
//!
//! ## PHAR Format Overview
//!
//! A PHAR file consists of:
//! 1. A PHP stub ending in `__HALT_COMPILER(); ?>`
//! 2. The manifest: global header, alias, metadata, one descriptor per entry
//! 3. The entry payloads, stored, gzip/DEFLATE or bzip2 compressed
//! 4. For signed archives, a digest (or OpenSSL signature) and a `GBMB` trailer
//!
//! Nothing in the format says where the manifest starts, so the stub is
//! scanned from the front. Payload offsets only follow from the full entry
//! table, so they are assigned after all descriptors are decoded.
//!
//! ## Limitations
//!
//! - Read-only; archives cannot be created or modified
//! - OpenSSL signatures are parsed but reported as unsupported
//! - Archive and entry metadata is returned as raw serialized bytes

mod archive;
mod error;
mod extractor;
mod options;
mod parser;
mod path;
mod payload;
mod signature;
mod structures;
mod stub;

pub use archive::Archive;
pub use error::{Error, Result};
pub use extractor::{PharExtractor, output_path};
pub use options::ParseOptions;
pub use parser::PharParser;
pub use path::{clean_path, clean_path_bytes};
pub use payload::EntryReader;
pub use signature::{DigestProvider, SoftwareDigests, read_signature, verify_signature};
pub use structures::*;
pub use stub::{DEFAULT_SCAN_WINDOW, locate_stub};
