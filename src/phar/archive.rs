use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::io::{ReadAt, StreamError};

use super::error::{Error, Result};
use super::options::ParseOptions;
use super::parser::PharParser;
use super::path::clean_path_bytes;
use super::payload::EntryReader;
use super::signature::{read_signature, verify_signature};
use super::structures::{Entry, Manifest, Signature};
use super::stub::locate_stub;

const DRAIN_BUF_SIZE: usize = 64 * 1024;

/// A parsed PHAR archive.
///
/// Built by one of the `parse` functions and never modified afterwards.
/// Entry content is read lazily from the shared source through
/// [`open`](Self::open).
pub struct Archive<R: ReadAt + ?Sized> {
    source: Arc<R>,
    manifest: Manifest,
    signature: Option<Signature>,
    entries: Vec<Entry>,
}

impl<R: ReadAt + ?Sized> Archive<R> {
    /// Parse and fully verify an archive with default options.
    pub fn parse(source: Arc<R>) -> Result<Self> {
        Self::parse_with(source, &ParseOptions::default())
    }

    /// Parse and fully verify an archive.
    ///
    /// Fails on the first problem: the signature of a signed archive must
    /// match, and every entry must decompress to its declared size and CRC.
    pub fn parse_with(source: Arc<R>, options: &ParseOptions) -> Result<Self> {
        Self::decode(source, options, true)
    }

    /// Parse an archive without checking its signature or entry CRCs.
    ///
    /// The layout is still decoded and bounds-checked, and a signature block
    /// is still read, but nothing is hashed. Content read from the result is
    /// untrusted.
    pub fn parse_unverified(source: Arc<R>, options: &ParseOptions) -> Result<Self> {
        Self::decode(source, options, false)
    }

    #[instrument(level = "debug", skip_all, fields(size = source.size(), verify = verify))]
    fn decode(source: Arc<R>, options: &ParseOptions, verify: bool) -> Result<Self> {
        let parser = PharParser::new(&*source);

        let manifest_start = locate_stub(&*source, options.scan_window)?;
        let (manifest, cursor) = parser.read_manifest(manifest_start)?;

        let signature = if manifest.is_signed() {
            let signature = read_signature(&*source, options.max_signature_len)?;
            if verify {
                verify_signature(&*source, &signature, options.digests.as_ref())?;
            }
            Some(signature)
        } else {
            None
        };

        let (mut entries, data_start) = parser.read_entries(manifest.entry_count, cursor)?;

        let declared_end = manifest_start + 4 + manifest.length as u64;
        if declared_end != data_start {
            warn!(
                declared_end,
                data_start, "manifest length disagrees with decoded entry table"
            );
        }

        assign_offsets(&mut entries, data_start, parser.size())?;

        let archive = Self {
            source,
            manifest,
            signature,
            entries,
        };

        if verify {
            for entry in &archive.entries {
                archive.verify_entry(entry)?;
            }
        }

        debug!(
            entries = archive.entries.len(),
            signed = archive.signature.is_some(),
            "parsed archive"
        );
        Ok(archive)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Entries in manifest order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Find an entry by path; the path is cleaned the same way entry names are.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entry_by_path(name.as_bytes())
    }

    /// Like [`entry`](Self::entry), for names that are not UTF-8.
    pub fn entry_by_path(&self, path: &[u8]) -> Option<&Entry> {
        let path = clean_path_bytes(path);
        self.entries.iter().find(|e| e.path == path)
    }

    /// Open a stream over an entry's decompressed content.
    ///
    /// Each call starts from the beginning of the payload. Reading the
    /// stream fails with the source's own error if the source fails.
    pub fn open(&self, entry: &Entry) -> Result<EntryReader<R>> {
        Ok(EntryReader::new(Arc::clone(&self.source), entry)?)
    }

    /// Read an entry's whole content into memory.
    pub fn read(&self, entry: &Entry) -> Result<Vec<u8>> {
        // Capacity from the untrusted header, capped.
        let mut data = Vec::with_capacity((entry.uncompressed_size as usize).min(DRAIN_BUF_SIZE));
        let total = self.drain(entry, |chunk| data.extend_from_slice(chunk))?;
        check_size(entry, total)?;
        Ok(data)
    }

    pub fn source(&self) -> &Arc<R> {
        &self.source
    }

    fn verify_entry(&self, entry: &Entry) -> Result<()> {
        let mut hasher = crc32fast::Hasher::new();
        let total = self.drain(entry, |chunk| hasher.update(chunk))?;
        check_size(entry, total)?;

        let actual = hasher.finalize();
        if actual != entry.crc32 {
            return Err(Error::BadCrc {
                entry: entry.name.clone(),
                expected: entry.crc32,
                actual,
            });
        }
        Ok(())
    }

    /// Feed an entry's content to `sink`, stopping one byte past its
    /// declared size. Returns the number of bytes produced.
    fn drain(&self, entry: &Entry, mut sink: impl FnMut(&[u8])) -> Result<u64> {
        let limit = entry.uncompressed_size as u64 + 1;
        let mut reader = self.open(entry)?.take(limit);
        let mut buf = vec![0u8; DRAIN_BUF_SIZE];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(match StreamError::classify(e) {
                        StreamError::Source(e) => Error::Io(e),
                        StreamError::Data(source) => Error::CorruptEntryPayload {
                            entry: entry.name.clone(),
                            source,
                        },
                    });
                }
            };
            sink(&buf[..n]);
            total += n as u64;
        }

        Ok(total)
    }
}

impl<R: ReadAt + ?Sized> fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("manifest", &self.manifest)
            .field("signature", &self.signature)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

fn check_size(entry: &Entry, actual: u64) -> Result<()> {
    let expected = entry.uncompressed_size as u64;
    if actual != expected {
        return Err(Error::SizeMismatch {
            entry: entry.name.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Give each entry its payload offset: payloads follow the entry table
/// back to back, in table order.
fn assign_offsets(entries: &mut [Entry], mut offset: u64, size: u64) -> Result<()> {
    for entry in entries.iter_mut() {
        let len = entry.on_disk_len();
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or_else(|| Error::PayloadOutOfBounds {
                entry: entry.name.clone(),
                offset,
                len,
            })?;
        entry.offset = offset;
        offset = end;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phar::structures::Compression;

    fn entry(name: &str, size: u32, packed: u32, compression: Compression) -> Entry {
        Entry {
            name: name.to_string(),
            path: name.as_bytes().to_vec(),
            timestamp: 0,
            uncompressed_size: size,
            compressed_size: packed,
            crc32: 0,
            flags: 0,
            metadata: Vec::new(),
            is_directory: false,
            compression,
            offset: 0,
        }
    }

    #[test]
    fn offsets_are_a_running_sum_of_on_disk_lengths() {
        let mut entries = vec![
            entry("a", 10, 4, Compression::Gzip),
            entry("b", 7, 7, Compression::None),
            entry("c", 0, 0, Compression::None),
            entry("d", 100, 3, Compression::Bzip2),
        ];
        assign_offsets(&mut entries, 50, 1000).unwrap();

        let offsets: Vec<u64> = entries.iter().map(Entry::offset).collect();
        assert_eq!(offsets, vec![50, 54, 61, 61]);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].offset(), pair[0].offset() + pair[0].on_disk_len());
        }
    }

    #[test]
    fn payload_past_the_end_is_rejected() {
        let mut entries = vec![
            entry("fits", 10, 10, Compression::None),
            entry("overflows", 10, 10, Compression::None),
        ];
        let err = assign_offsets(&mut entries, 0, 15).unwrap_err();
        assert!(matches!(
            err,
            Error::PayloadOutOfBounds { ref entry, offset: 10, len: 10 } if entry == "overflows"
        ));
    }
}
