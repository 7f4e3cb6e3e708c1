//! Low-level PHAR manifest parser.
//!
//! This module decodes the binary manifest that follows the stub, reading
//! from any source that implements the [`ReadAt`] trait.
//!
//! ## Layout
//!
//! 1. Global header (18 bytes), alias, archive metadata
//! 2. One descriptor per entry: name, fixed 24-byte block, entry metadata
//! 3. Entry payloads, back to back, in descriptor order
//! 4. Optional signature (see `signature`)
//!
//! Every length in the manifest comes from the file and is checked against
//! the bytes actually left in the source before anything is allocated.
//! Payload offsets are not known while descriptors are being decoded; the
//! [`Archive`](super::Archive) assigns them once the whole table is read.

use tracing::{debug, trace};

use crate::io::ReadAt;

use super::error::{Error, Result};
use super::path::clean_path_bytes;
use super::structures::*;

/// Smallest possible entry descriptor: name length + fixed block + metadata length.
pub(crate) const MIN_ENTRY_SIZE: u64 = 4 + EntryHeader::SIZE as u64;

/// Decoder for the manifest and entry table of one source.
pub struct PharParser<'a, R: ReadAt + ?Sized> {
    /// The underlying data source
    source: &'a R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<'a, R: ReadAt + ?Sized> PharParser<'a, R> {
    pub fn new(source: &'a R) -> Self {
        let size = source.size();
        Self { source, size }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Decode the global manifest starting at `offset`.
    ///
    /// Returns the manifest and the offset of the first entry descriptor.
    pub fn read_manifest(&self, offset: u64) -> Result<(Manifest, u64)> {
        let raw = self.read_bytes(offset, ManifestHeader::SIZE as u64, "manifest header")?;
        let header = ManifestHeader::from_bytes(&raw)?;
        let mut offset = offset + ManifestHeader::SIZE as u64;

        let alias = self.read_bytes(offset, header.alias_len as u64, "manifest alias")?;
        offset += header.alias_len as u64;

        let metadata_len = self.read_u32(offset, "manifest metadata length")?;
        offset += 4;

        let metadata = if metadata_len > 0 {
            self.read_bytes(offset, metadata_len as u64, "manifest metadata")?
        } else {
            Vec::new()
        };
        offset += metadata_len as u64;

        let manifest = Manifest {
            length: header.length,
            entry_count: header.entry_count,
            version: header.version,
            flags: header.flags,
            alias,
            metadata,
        };

        debug!(
            entries = manifest.entry_count,
            version = %manifest.version,
            flags = format_args!("{:#010x}", manifest.flags),
            signed = manifest.is_signed(),
            "decoded manifest"
        );

        Ok((manifest, offset))
    }

    /// Decode one entry descriptor starting at `offset`.
    ///
    /// Returns the entry, with its payload offset still unassigned, and the
    /// offset of the next descriptor.
    pub fn read_entry(&self, offset: u64) -> Result<(Entry, u64)> {
        let name_len = self.read_u32(offset, "entry name length")? as u64;
        let mut offset = offset + 4;

        let raw_name = self.read_bytes(offset, name_len, "entry name")?;
        offset += name_len;

        let is_directory = raw_name.ends_with(b"/");
        let path = clean_path_bytes(&raw_name);
        let name = String::from_utf8_lossy(&path).into_owned();

        let raw = self.read_bytes(offset, EntryHeader::SIZE as u64, "entry header")?;
        let header = EntryHeader::from_bytes(&raw)?;
        offset += EntryHeader::SIZE as u64;

        let metadata = if header.metadata_len > 0 {
            self.read_bytes(offset, header.metadata_len as u64, "entry metadata")?
        } else {
            Vec::new()
        };
        offset += header.metadata_len as u64;

        let compression =
            Compression::from_flags(header.flags).ok_or_else(|| Error::InvalidCompression {
                entry: name.clone(),
                flags: header.flags,
            })?;

        trace!(
            name = %name,
            size = header.uncompressed_size,
            packed = header.compressed_size,
            %compression,
            "decoded entry"
        );

        let entry = Entry {
            name,
            path,
            timestamp: header.timestamp,
            uncompressed_size: header.uncompressed_size,
            compressed_size: header.compressed_size,
            crc32: header.crc32,
            flags: header.flags,
            metadata,
            is_directory,
            compression,
            offset: 0,
        };

        Ok((entry, offset))
    }

    /// Decode `count` consecutive descriptors starting at `offset`.
    ///
    /// Returns the entries in table order and the offset right after the
    /// last descriptor, which is where the first payload starts.
    pub fn read_entries(&self, count: u32, mut offset: u64) -> Result<(Vec<Entry>, u64)> {
        // The declared count is untrusted; size the table by what could fit.
        let fits = self.remaining(offset) / MIN_ENTRY_SIZE;
        let mut entries = Vec::with_capacity((count as u64).min(fits) as usize);

        for _ in 0..count {
            let (entry, next) = self.read_entry(offset)?;
            entries.push(entry);
            offset = next;
        }

        Ok((entries, offset))
    }

    /// Bytes left in the source from `offset` on.
    pub fn remaining(&self, offset: u64) -> u64 {
        self.size.saturating_sub(offset)
    }

    fn read_u32(&self, offset: u64, field: &'static str) -> Result<u32> {
        let raw = self.read_bytes(offset, 4, field)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Read `len` bytes at `offset`, refusing lengths the source cannot hold.
    pub(crate) fn read_bytes(&self, offset: u64, len: u64, field: &'static str) -> Result<Vec<u8>> {
        let available = self.remaining(offset);
        if len > available {
            return Err(Error::TruncatedHeader {
                field,
                offset,
                needed: len,
                available,
            });
        }

        let mut buf = vec![0u8; len as usize];
        self.source.read_exact_at(offset, &mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::TruncatedHeader {
                    field,
                    offset,
                    needed: len,
                    available,
                }
            } else {
                Error::Io(e)
            }
        })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_bytes(entry_count: u32, alias: &[u8], metadata: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&entry_count.to_le_bytes());
        out.extend_from_slice(&[0x11, 0x10]);
        out.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        out.extend_from_slice(&(alias.len() as u32).to_le_bytes());
        out.extend_from_slice(alias);
        out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        out.extend_from_slice(metadata);
        out
    }

    fn entry_bytes(name: &str, size: u32, flags: u32, metadata: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&1_700_000_000u32.to_le_bytes());
        out.extend_from_slice(&(size / 2).to_le_bytes());
        out.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        out.extend_from_slice(metadata);
        out
    }

    #[test]
    fn manifest_fields_and_cursor() {
        let mut data = b"prefix".to_vec();
        data.extend(manifest_bytes(3, b"app.phar", b"a:0:{}"));
        data.extend_from_slice(b"rest");

        let parser = PharParser::new(&data);
        let (manifest, next) = parser.read_manifest(6).unwrap();
        assert_eq!(manifest.entry_count, 3);
        assert_eq!(manifest.version.to_string(), "1.1.1");
        assert!(manifest.is_signed());
        assert_eq!(manifest.alias, b"app.phar");
        assert_eq!(manifest.metadata, b"a:0:{}");
        assert_eq!(&data[next as usize..], b"rest");
    }

    #[test]
    fn huge_alias_length_is_rejected_before_allocation() {
        let mut data = manifest_bytes(0, b"", b"");
        data[14..18].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = PharParser::new(&data).read_manifest(0).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedHeader {
                field: "manifest alias",
                needed: 0xFFFF_FFFF,
                ..
            }
        ));
    }

    #[test]
    fn short_header_is_truncated() {
        let data = vec![0u8; 10];
        let err = PharParser::new(&data).read_manifest(0).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedHeader {
                field: "manifest header",
                available: 10,
                ..
            }
        ));
    }

    #[test]
    fn entry_descriptor_and_cursor() {
        let mut data = entry_bytes("./src//lib.php", 10, 0x11B6, b"m");
        data.extend(entry_bytes("docs/", 0, 0x1FF, b""));

        let parser = PharParser::new(&data);
        let (first, next) = parser.read_entry(0).unwrap();
        assert_eq!(first.name, "src/lib.php");
        assert_eq!(first.path, b"src/lib.php");
        assert_eq!(first.uncompressed_size, 10);
        assert_eq!(first.compressed_size, 5);
        assert_eq!(first.crc32, 0xDEAD_BEEF);
        assert_eq!(first.timestamp, 1_700_000_000);
        assert_eq!(first.compression(), Compression::Gzip);
        assert_eq!(first.on_disk_len(), 5);
        assert_eq!(first.permissions(), 0o666);
        assert_eq!(first.metadata, b"m");
        assert!(!first.is_directory);

        let (second, end) = parser.read_entry(next).unwrap();
        assert_eq!(second.name, "docs");
        assert!(second.is_directory);
        assert_eq!(second.on_disk_len(), 0);
        assert_eq!(end, data.len() as u64);
    }

    #[test]
    fn both_compression_bits_are_invalid() {
        let data = entry_bytes("x", 1, 0x3000, b"");
        let err = PharParser::new(&data).read_entry(0).unwrap_err();
        assert!(matches!(err, Error::InvalidCompression { ref entry, flags: 0x3000 } if entry == "x"));
    }

    #[test]
    fn lying_entry_count_runs_out_of_bytes() {
        let data = entry_bytes("only.txt", 0, 0, b"");
        let err = PharParser::new(&data)
            .read_entries(u32::MAX, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedHeader {
                field: "entry name length",
                ..
            }
        ));
    }

    #[test]
    fn truncated_entry_metadata() {
        let mut data = entry_bytes("a", 0, 0, b"");
        let len = data.len();
        data[len - 4..].copy_from_slice(&1000u32.to_le_bytes());
        let err = PharParser::new(&data).read_entry(0).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedHeader {
                field: "entry metadata",
                needed: 1000,
                available: 0,
                ..
            }
        ));
    }
}
