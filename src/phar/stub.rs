//! Locating the end of the PHP bootstrap stub.
//!
//! A PHAR starts with arbitrary PHP code that ends with
//! `__HALT_COMPILER(); ?>`, optionally followed by one line ending. The
//! manifest starts right after that.

use tracing::trace;

use super::error::{Error, Result};
use super::structures::HALT_COMPILER;
use crate::io::ReadAt;

/// Default size of each scan window.
pub const DEFAULT_SCAN_WINDOW: usize = 200;

/// Find the offset where the manifest starts.
///
/// The source is scanned in `window`-byte reads. Each read is searched
/// together with the tail of the previous one, so a marker straddling two
/// windows is still found.
pub fn locate_stub<R: ReadAt + ?Sized>(source: &R, window: usize) -> Result<u64> {
    let size = source.size();
    let window = window.max(HALT_COMPILER.len());
    let carry_len = HALT_COMPILER.len() - 1;

    // `search` holds the carried tail followed by the current window;
    // `search_start` is the source offset of search[0].
    let mut search: Vec<u8> = Vec::with_capacity(carry_len + window);
    let mut search_start = 0u64;
    let mut position = 0u64;
    let mut buf = vec![0u8; window];

    while position < size {
        let want = window.min((size - position) as usize);
        let n = match source.read_at(position, &mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        };
        search.extend_from_slice(&buf[..n]);
        position += n as u64;

        if let Some(index) = find(&search, HALT_COMPILER) {
            let marker_end = search_start + (index + HALT_COMPILER.len()) as u64;
            trace!(offset = marker_end, "found stub terminator");
            return skip_line_ending(source, marker_end);
        }

        let keep = search.len().min(carry_len);
        let drop = search.len() - keep;
        search.drain(..drop);
        search_start += drop as u64;
    }

    Err(Error::MarkerNotFound)
}

/// Step over one optional `\r\n` or `\n` after the marker.
fn skip_line_ending<R: ReadAt + ?Sized>(source: &R, marker_end: u64) -> Result<u64> {
    let mut next = [0u8; 2];
    match source.read_exact_at(marker_end, &mut next) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::UnexpectedEnd { offset: marker_end });
        }
        Err(e) => return Err(Error::Io(e)),
    }

    Ok(match next {
        [b'\r', b'\n'] => marker_end + 2,
        [b'\n', _] => marker_end + 1,
        _ => marker_end,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|candidate| candidate == needle)
}
