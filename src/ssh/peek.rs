//! A reader that can look ahead without consuming.

use std::io::{self, Read};

/// Wraps a reader so the first bytes can be inspected and then read again.
///
/// Peeked bytes are held in a small buffer and served before the inner
/// reader is touched again.
pub struct PeekReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Return up to `n` upcoming bytes without consuming them.
    ///
    /// Fewer than `n` bytes are returned only at end of stream.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        while self.buf.len() < n {
            let mut chunk = [0u8; 64];
            let want = (n - self.buf.len()).min(chunk.len());
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(read) => self.buf.extend_from_slice(&chunk[..read]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let end = n.min(self.buf.len());
        Ok(&self.buf[..end])
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buf.len() {
            let pending = &self.buf[self.pos..];
            let count = pending.len().min(out.len());
            out[..count].copy_from_slice(&pending[..count]);
            self.pos += count;
            if self.pos == self.buf.len() {
                self.buf.clear();
                self.pos = 0;
            }
            return Ok(count);
        }
        self.inner.read(out)
    }
}
