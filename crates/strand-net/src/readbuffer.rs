use std::fs::File;
use std::io::{self, Read};

use thiserror::Error;

use crate::socket::BaseSocket;

/// Errors surfaced while advancing a [`ReadBuffer`].
#[derive(Debug, Error)]
pub enum CursorError {
    /// No more data within the prevailing receive timeout; the caller may
    /// retry or surface EOF. Equivalent to `Incomplete` at the fragment
    /// parsing level.
    #[error("no more data available within the prevailing timeout")]
    WouldBlock,
    /// The source is exhausted permanently (peer closed, end of file).
    #[error("end of stream")]
    Eof,
    #[error("system error: {0}")]
    System(#[from] io::Error),
}

/// A lazy byte cursor: a one-octet `peek` plus an `advance` that refills
/// from the underlying source on demand.
///
/// A freshly constructed cursor is *unprimed*: `peek` returns `None` until
/// the first `advance` succeeds. After that, `peek` is stable between
/// refills and `advance` never silently discards data.
///
/// `advance` consuming the last octet the source currently has to offer is
/// not itself an error: it succeeds, and `peek` goes back to returning
/// `None` as if freshly unprimed. Only a *subsequent* `advance` — one asked
/// to move past a position that has no octet at all — reports why there
/// isn't one. This means a caller that reads exactly as many octets as
/// exist, and no more, never sees a spurious failure for data it already
/// fully collected.
pub trait ReadBuffer {
    /// The current octet, or `None` before the first successful `advance`.
    fn peek(&self) -> Option<u8>;
    /// Move to the next octet, blocking to refill from the source if the
    /// internal window is exhausted.
    fn advance(&mut self) -> Result<(), CursorError>;
}

/// Reads from a blocking [`BaseSocket`] in chunks, exposing them one octet
/// at a time. The socket must be in blocking mode.
pub struct SocketReadBuffer<'a> {
    socket: &'a BaseSocket,
    buffer: Vec<u8>,
    idx: usize,
    received: usize,
    primed: bool,
    /// Set when a refill attempt failed right after delivering the prior
    /// octet via `peek`; surfaced on the next `advance` rather than the one
    /// that discovered it. See the trait docs for why.
    fault: Option<CursorError>,
}

impl<'a> SocketReadBuffer<'a> {
    pub const DEFAULT_BUF_SIZE: usize = 8192;
    pub const MIN_BUF_SIZE: usize = 4096;

    /// Construct a buffer of at least [`Self::MIN_BUF_SIZE`] bytes.
    pub fn new(socket: &'a BaseSocket, bufsize: usize) -> Self {
        let bufsize = bufsize.max(Self::MIN_BUF_SIZE);
        Self { socket, buffer: vec![0; bufsize], idx: 0, received: 0, primed: false, fault: None }
    }

    fn underflow(&mut self) -> Result<(), CursorError> {
        let n = self.socket.read(&mut self.buffer).map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                CursorError::WouldBlock
            } else {
                CursorError::System(e)
            }
        })?;
        if n == 0 {
            return Err(CursorError::Eof);
        }
        self.received = n;
        self.idx = 0;
        Ok(())
    }
}

impl ReadBuffer for SocketReadBuffer<'_> {
    fn peek(&self) -> Option<u8> {
        (self.primed && self.idx < self.received).then(|| self.buffer[self.idx])
    }

    fn advance(&mut self) -> Result<(), CursorError> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }
        if self.primed && self.idx + 1 < self.received {
            self.idx += 1;
            return Ok(());
        }
        let was_primed = self.primed;
        match self.underflow() {
            Ok(()) => {
                self.primed = true;
                Ok(())
            }
            Err(e) if was_primed => {
                self.received = 0;
                self.idx = 0;
                self.fault = Some(e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// File-backed [`ReadBuffer`], convenient for testing parsers against a
/// file instead of a network source.
pub struct FileReadBuffer {
    file: File,
    buffer: Vec<u8>,
    idx: usize,
    received: usize,
    primed: bool,
    /// Deferred refill failure; see `SocketReadBuffer`'s equivalent field.
    fault: Option<CursorError>,
}

impl FileReadBuffer {
    pub fn open(path: &std::path::Path, bufsize: usize) -> io::Result<Self> {
        let bufsize = bufsize.max(SocketReadBuffer::MIN_BUF_SIZE);
        Ok(Self {
            file: File::open(path)?,
            buffer: vec![0; bufsize],
            idx: 0,
            received: 0,
            primed: false,
            fault: None,
        })
    }

    fn underflow(&mut self) -> Result<(), CursorError> {
        let n = self.file.read(&mut self.buffer)?;
        if n == 0 {
            return Err(CursorError::Eof);
        }
        self.received = n;
        self.idx = 0;
        Ok(())
    }
}

impl ReadBuffer for FileReadBuffer {
    fn peek(&self) -> Option<u8> {
        (self.primed && self.idx < self.received).then(|| self.buffer[self.idx])
    }

    fn advance(&mut self) -> Result<(), CursorError> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }
        if self.primed && self.idx + 1 < self.received {
            self.idx += 1;
            return Ok(());
        }
        let was_primed = self.primed;
        match self.underflow() {
            Ok(()) => {
                self.primed = true;
                Ok(())
            }
            Err(e) if was_primed => {
                self.received = 0;
                self.idx = 0;
                self.fault = Some(e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// String/byte-slice-backed [`ReadBuffer`], convenient for testing parsers
/// against in-memory data instead of a network source.
pub struct StringReadBuffer {
    data: Vec<u8>,
    idx: usize,
    primed: bool,
    /// Deferred refill failure; see `SocketReadBuffer`'s equivalent field.
    fault: Option<CursorError>,
}

impl StringReadBuffer {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), idx: 0, primed: false, fault: None }
    }
}

impl ReadBuffer for StringReadBuffer {
    fn peek(&self) -> Option<u8> {
        (self.primed && self.idx < self.data.len()).then(|| self.data[self.idx])
    }

    fn advance(&mut self) -> Result<(), CursorError> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }
        if !self.primed {
            if self.data.is_empty() {
                return Err(CursorError::Eof);
            }
            self.primed = true;
            return Ok(());
        }
        if self.idx + 1 < self.data.len() {
            self.idx += 1;
            Ok(())
        } else {
            // `idx` was the last octet and has already been delivered via
            // `peek`; only the next attempt to move past it reports Eof.
            self.idx = self.data.len();
            self.fault = Some(CursorError::Eof);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_buffer_walks_all_octets() {
        let mut cursor = StringReadBuffer::new("ab");
        assert_eq!(cursor.peek(), None);
        cursor.advance().unwrap();
        assert_eq!(cursor.peek(), Some(b'a'));
        cursor.advance().unwrap();
        assert_eq!(cursor.peek(), Some(b'b'));
        // Moving past the last octet succeeds: there's nothing left to
        // report as missing yet, since the caller already has everything.
        cursor.advance().unwrap();
        assert_eq!(cursor.peek(), None);
        // Only a *second* attempt to move past empty space reports why.
        match cursor.advance() {
            Err(CursorError::Eof) => {}
            other => panic!("expected Eof, got {other:?}"),
        }
    }

    #[test]
    fn advancing_past_the_final_octet_does_not_discard_it() {
        let mut cursor = StringReadBuffer::new("x");
        cursor.advance().unwrap();
        assert_eq!(cursor.peek(), Some(b'x'));
        cursor.advance().unwrap();
    }
}
