//! Decompressing streams over entry payloads.

use bzip2::read::BzDecoder;
use flate2::read::{DeflateDecoder, GzDecoder};
use std::io::{self, Read};
use std::sync::Arc;

use crate::io::{ReadAt, ReadAtStream};

use super::structures::{Compression, Entry};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Lazy, decompressed content of one entry.
///
/// Created by [`Archive::open`](super::Archive::open). Every reader
/// decompresses from the start of the payload on its own; dropping it
/// releases the decoder state.
pub struct EntryReader<R: ReadAt + ?Sized> {
    inner: Decoder<R>,
}

enum Decoder<R: ReadAt + ?Sized> {
    Stored(ReadAtStream<Arc<R>>),
    Gzip(Box<GzDecoder<ReadAtStream<Arc<R>>>>),
    Deflate(Box<DeflateDecoder<ReadAtStream<Arc<R>>>>),
    Bzip2(Box<BzDecoder<ReadAtStream<Arc<R>>>>),
}

impl<R: ReadAt + ?Sized> EntryReader<R> {
    /// Fails only if the source cannot be read while sniffing the gzip magic.
    pub(crate) fn new(source: Arc<R>, entry: &Entry) -> io::Result<Self> {
        let offset = entry.offset();
        let len = entry.on_disk_len();

        let inner = match entry.compression() {
            Compression::None => Decoder::Stored(ReadAtStream::new(source, offset, len)),
            // PHP's zlib filter writes raw DEFLATE; other writers use a gzip member.
            Compression::Gzip => {
                let mut magic = [0u8; 2];
                let is_gzip = if len >= 2 {
                    source.read_exact_at(offset, &mut magic)?;
                    magic == GZIP_MAGIC
                } else {
                    false
                };
                let stream = ReadAtStream::new(source, offset, len);
                if is_gzip {
                    Decoder::Gzip(Box::new(GzDecoder::new(stream)))
                } else {
                    Decoder::Deflate(Box::new(DeflateDecoder::new(stream)))
                }
            }
            Compression::Bzip2 => {
                Decoder::Bzip2(Box::new(BzDecoder::new(ReadAtStream::new(source, offset, len))))
            }
        };

        Ok(Self { inner })
    }
}

impl<R: ReadAt + ?Sized> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Decoder::Stored(r) => r.read(buf),
            Decoder::Gzip(r) => r.read(buf),
            Decoder::Deflate(r) => r.read(buf),
            Decoder::Bzip2(r) => r.read(buf),
        }
    }
}
