//! Forward byte-pattern search across mapped memory.
//!
//! The scanner walks the readable ranges of the address space and never
//! holds more than one window of image bytes. Matches never span two ranges,
//! since ranges are separated by unmapped or unreadable memory. Within a chunk every match is
//! reported, overlapping ones included.

use memchr::memmem::Finder;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ScanConfig;
use crate::io::ByteSource;
use crate::layout::{LayoutError, RecordLayout};
use crate::memory::{SegViolation, VirtualAddressSpace};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// A chunk could not be read.
    #[error(transparent)]
    Memory(#[from] SegViolation),

    /// Struct values could not be serialized into a pattern.
    #[error("cannot build struct pattern: {0}")]
    Layout(#[from] LayoutError),

    #[error("empty search pattern")]
    EmptyPattern,
}

/// Searches a `VirtualAddressSpace` for byte patterns.
#[derive(Debug, Clone)]
pub struct PatternScanner<'a, S> {
    space: &'a VirtualAddressSpace<S>,
    config: ScanConfig,
}

impl<'a, S: ByteSource> PatternScanner<'a, S> {
    pub fn new(space: &'a VirtualAddressSpace<S>) -> Self {
        Self::with_config(space, ScanConfig::default())
    }

    pub fn with_config(space: &'a VirtualAddressSpace<S>, config: ScanConfig) -> Self {
        Self { space, config }
    }

    pub fn space(&self) -> &'a VirtualAddressSpace<S> {
        self.space
    }

    /// Address of the first occurrence of `pattern` at or after `from`.
    pub fn find_first(&self, pattern: &[u8], from: u64) -> Result<Option<u64>, ScanError> {
        let mut first = None;
        self.find_all(pattern, from, |addr| {
            first = Some(addr);
            false
        })?;
        Ok(first)
    }

    /// Call `visit` with the address of every occurrence of `pattern` at or
    /// after `from`, in ascending order, until it returns false.
    ///
    /// Memory without read permission is not searched. A range whose bytes
    /// cannot be read is skipped and the search goes on; the first such
    /// failure is returned once all other readable memory has been visited.
    pub fn find_all<F>(&self, pattern: &[u8], from: u64, mut visit: F) -> Result<(), ScanError>
    where
        F: FnMut(u64) -> bool,
    {
        if pattern.is_empty() {
            return Err(ScanError::EmptyPattern);
        }
        let finder = Finder::new(pattern);
        let overlap = pattern.len() - 1;
        let window = self.config.window_size.max(pattern.len()) as u64;
        let mut buf = Vec::new();
        let mut skipped = None;

        'ranges: for range in self.space.readable_ranges(from) {
            if range.size < pattern.len() as u64 {
                continue;
            }
            trace!(
                start = %format_args!("{:#x}", range.start),
                size = range.size,
                "scanning range"
            );

            let mut pos = range.start;
            loop {
                let len = window.min(range.end() - pos);
                buf.resize(len as usize, 0);
                if let Err(violation) = self.space.read_exact(pos, &mut buf) {
                    debug!(
                        start = %format_args!("{:#x}", range.start),
                        error = %violation,
                        "skipping rest of unreadable range"
                    );
                    skipped.get_or_insert(violation);
                    continue 'ranges;
                }

                let last = pos + len == range.end();
                // later starts are reported by the next, overlapping window
                let limit = if last {
                    buf.len()
                } else {
                    buf.len() - overlap
                };

                let mut i = 0;
                while let Some(found) = finder.find(&buf[i..]) {
                    let at = i + found;
                    if at >= limit {
                        break;
                    }
                    if !visit(pos + at as u64) {
                        return Ok(());
                    }
                    i = at + 1;
                }

                if last {
                    break;
                }
                pos += limit as u64;
            }
        }
        match skipped {
            Some(violation) => Err(violation.into()),
            None => Ok(()),
        }
    }

    /// Collect every occurrence of `pattern` at or after `from`.
    pub fn find_all_vec(&self, pattern: &[u8], from: u64) -> Result<Vec<u64>, ScanError> {
        let mut hits = Vec::new();
        self.find_all(pattern, from, |addr| {
            hits.push(addr);
            true
        })?;
        Ok(hits)
    }

    /// Find the first place where a record holding `values` is stored.
    pub fn find_struct(
        &self,
        layout: &RecordLayout,
        values: &[u64],
        from: u64,
    ) -> Result<Option<u64>, ScanError> {
        let pattern = layout.encode(values)?;
        self.find_first(&pattern, from)
    }
}
