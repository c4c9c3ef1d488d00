//! Lookahead over a byte source.

use std::io::{self, Read};

/// Longest lookahead any caller needs, magic numbers are two bytes.
const MAX_PEEK: usize = 16;

/// Lets a caller look at the first bytes of a stream without consuming them.
///
/// Peeked bytes are kept in a small owned buffer and replayed by the following reads,
/// so nothing is lost whether or not the caller acts on what it saw.
#[derive(Debug)]
pub struct Peekable<R> {
    inner: R,
    buf: [u8; MAX_PEEK],
    pos: usize,
    len: usize,
}

impl<R: Read> Peekable<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buf: [0; MAX_PEEK], pos: 0, len: 0 }
    }

    /// Returns up to `n` upcoming bytes, fewer only when the source ends first.
    ///
    /// `n` is capped at 16 bytes.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let n = n.min(MAX_PEEK);

        if self.pos > 0 && self.pos + n > MAX_PEEK {
            self.buf.copy_within(self.pos..self.len, 0);
            self.len -= self.pos;
            self.pos = 0;
        }

        while self.len - self.pos < n {
            match self.inner.read(&mut self.buf[self.len..self.pos + n]) {
                Ok(0) => break,
                Ok(read) => self.len += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        let end = self.len.min(self.pos + n);
        Ok(&self.buf[self.pos..end])
    }

    /// Bytes peeked but not read yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// The inner reader, bypassing any buffered bytes.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Drops the lookahead buffer and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Peekable<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.len {
            let n = out.len().min(self.len - self.pos);
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.len {
                self.pos = 0;
                self.len = 0;
            }
            return Ok(n);
        }

        self.inner.read(out)
    }
}
