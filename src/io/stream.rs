use std::io::{self, Read};

use thiserror::Error;

use super::ReadAt;

/// Marker around errors raised by the source itself, so they stay apart from
/// decoder errors once they have passed through a decompressor.
#[derive(Debug, Error)]
#[error(transparent)]
struct SourceFault(io::Error);

fn source_fault(error: io::Error) -> io::Error {
    io::Error::new(error.kind(), SourceFault(error))
}

/// Where an error from a [`ReadAtStream`] (or a reader stacked on it) came
/// from.
#[derive(Debug)]
pub enum StreamError {
    /// The underlying source failed or ended early.
    Source(io::Error),
    /// Everything else: the bytes were read but could not be decoded.
    Data(io::Error),
}

impl StreamError {
    pub fn classify(error: io::Error) -> Self {
        if !error.get_ref().is_some_and(|inner| inner.is::<SourceFault>()) {
            return StreamError::Data(error);
        }
        let kind = error.kind();
        match error.into_inner().map(|inner| inner.downcast::<SourceFault>()) {
            Some(Ok(fault)) => StreamError::Source(fault.0),
            Some(Err(inner)) => StreamError::Data(io::Error::new(kind, inner)),
            None => StreamError::Data(io::Error::from(kind)),
        }
    }

    pub fn into_inner(self) -> io::Error {
        match self {
            StreamError::Source(e) | StreamError::Data(e) => e,
        }
    }
}

/// Sequential reader over a byte range of a [`ReadAt`] source.
///
/// Each `read` is a positioned read at the stream's own offset, so several
/// streams over the same source never interfere. The range end is exclusive;
/// if the source runs out before it, the stream fails with
/// [`io::ErrorKind::UnexpectedEof`] instead of silently ending early.
/// Errors raised here keep their kind and can be told apart from decoder
/// errors with [`StreamError::classify`].
pub struct ReadAtStream<S> {
    source: S,
    offset: u64,
    end: u64,
}

impl<S: ReadAt> ReadAtStream<S> {
    /// Stream `len` bytes starting at `offset`.
    pub fn new(source: S, offset: u64, len: u64) -> Self {
        Self {
            source,
            offset,
            end: offset.saturating_add(len),
        }
    }

    /// Stream the whole source from byte 0.
    pub fn whole(source: S) -> Self {
        let len = source.size();
        Self::new(source, 0, len)
    }

    /// Bytes left before the end of the range.
    pub fn remaining(&self) -> u64 {
        self.end - self.offset
    }
}

impl<S: ReadAt> Read for ReadAtStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self
            .source
            .read_at(self.offset, &mut buf[..want])
            .map_err(source_fault)?;
        if n == 0 {
            return Err(source_fault(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended at offset {} with {} bytes still expected",
                    self.offset, remaining
                ),
            )));
        }
        self.offset += n as u64;
        Ok(n)
    }
}
