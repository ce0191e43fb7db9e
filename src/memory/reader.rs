//! Sequential reads over virtual memory.

use std::io;

use super::space::VirtualAddressSpace;
use super::{SegViolation, ViolationKind};
use crate::io::ByteSource;

/// Result of reading a NUL-terminated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CStringRead {
    /// Bytes before the terminator, lossily decoded as UTF-8.
    pub value: String,
    /// The length limit was reached before a terminator was found.
    pub truncated: bool,
}

/// A cursor over a `VirtualAddressSpace`.
///
/// Each reader owns its position; the address space stays shared and
/// immutable. By default the reader extends to the top of the address space.
#[derive(Debug, Clone)]
pub struct AddressReader<'a, S> {
    space: &'a VirtualAddressSpace<S>,
    pos: u64,
    remaining: u64,
}

impl<'a, S: ByteSource> AddressReader<'a, S> {
    pub fn new(space: &'a VirtualAddressSpace<S>, addr: u64) -> Self {
        Self {
            space,
            pos: addr,
            remaining: u64::MAX - addr,
        }
    }

    /// Stop after `limit` more bytes.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.remaining = self.remaining.min(limit);
        self
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read as many bytes as are contiguously readable at the cursor, up to
    /// `buf.len()`. Returns 0 only at the limit.
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, SegViolation> {
        let want = self.remaining.min(buf.len() as u64);
        if want == 0 {
            return Ok(0);
        }
        let run = self.space.resolve(self.pos)?;
        let n = run.len.min(want) as usize;
        self.space.fill(&run, self.pos, &mut buf[..n])?;
        self.advance(n);
        Ok(n)
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SegViolation> {
        if (buf.len() as u64) > self.remaining {
            return Err(SegViolation::new(
                self.pos.saturating_add(self.remaining),
                ViolationKind::UnexpectedEof,
            ));
        }
        self.space.read_exact(self.pos, buf)?;
        self.advance(buf.len());
        Ok(())
    }

    /// Read up to and excluding the next NUL byte.
    pub fn read_c_string(&mut self) -> Result<CStringRead, SegViolation> {
        let mut out = Vec::new();
        let mut block = [0u8; 64];
        loop {
            let n = self.read_some(&mut block)?;
            if n == 0 {
                return Ok(CStringRead {
                    value: String::from_utf8_lossy(&out).into_owned(),
                    truncated: true,
                });
            }
            if let Some(nul) = memchr::memchr(0, &block[..n]) {
                out.extend_from_slice(&block[..nul]);
                return Ok(CStringRead {
                    value: String::from_utf8_lossy(&out).into_owned(),
                    truncated: false,
                });
            }
            out.extend_from_slice(&block[..n]);
        }
    }

    fn advance(&mut self, n: usize) {
        self.pos += n as u64;
        self.remaining -= n as u64;
    }
}

impl<S: ByteSource> io::Read for AddressReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_some(buf).map_err(io::Error::from)
    }
}
