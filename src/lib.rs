//! # runphar
//!
//! A Rust PHAR reader with HTTP URL support using Range requests.
//!
//! This library decodes PHP archives (`.phar`) from any random-access byte
//! source: a local file, a remote file served with HTTP Range support, or a
//! buffer in memory. Parsing locates the manifest behind the PHP stub,
//! decodes every entry, checks the archive signature and every entry's
//! CRC-32, and hands out lazily decompressed entry streams.
//!
//! ## Features
//!
//! - Stored, gzip/DEFLATE and bzip2 compressed entries
//! - MD5, SHA-1, SHA-256 and SHA-512 signature verification
//! - Pluggable hashing backend through [`phar::DigestProvider`]
//! - Bounds-checked decoding of every length field in the file
//! - Remote archives read with HTTP Range requests
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Read;
//! use std::path::Path;
//! use std::sync::Arc;
//! use runphar::{Archive, LocalFileReader};
//!
//! fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(LocalFileReader::new(Path::new("app.phar"))?);
//!
//!     // Parses, verifies the signature and every entry's CRC
//!     let archive = Archive::parse(reader)?;
//!
//!     for entry in archive.entries() {
//!         let mut content = String::new();
//!         archive.open(entry)?.read_to_string(&mut content)?;
//!         println!("{}: {} bytes", entry.name, content.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod logs;
pub mod phar;

pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, ReadAt, ReadAtStream, StreamError};
pub use phar::{Archive, Entry, Error, Manifest, ParseOptions, PharExtractor, Signature};
