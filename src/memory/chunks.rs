//! Iteration over maximal contiguous mapped ranges.

use super::segment::Segment;

/// A contiguous run of mapped memory: `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    pub start: u64,
    pub size: u64,
}

impl Chunk {
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// Iterator returned by `VirtualAddressSpace::chunks`.
///
/// Chunks are recomputed from the segment table on every step. Overlapping
/// and adjacent loadable segments merge into one chunk; zero-size and
/// non-loadable segments are ignored. A start address inside a segment
/// starts the first chunk at that address.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    segments: &'a [Segment],
    cursor: Option<u64>,
}

impl<'a> Chunks<'a> {
    pub(super) fn new(segments: &'a [Segment], start: u64) -> Self {
        Self {
            segments,
            cursor: Some(start),
        }
    }

    fn loadable(&self) -> impl Iterator<Item = &'a Segment> + 'a {
        let segments = self.segments;
        segments.iter().filter(|s| s.loadable && !s.is_empty())
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let cursor = self.cursor?;

        let start = if self.loadable().any(|s| s.contains(cursor)) {
            cursor
        } else {
            match self.loadable().map(|s| s.vaddr).filter(|&v| v >= cursor).min() {
                Some(start) => start,
                None => {
                    self.cursor = None;
                    return None;
                }
            }
        };

        // grow until no segment starting inside or right at the end extends it
        let mut end = start;
        while let Some(next) = self
            .loadable()
            .filter(|s| s.vaddr <= end && s.end() > end)
            .map(|s| s.end())
            .max()
        {
            end = next;
        }

        self.cursor = if end == u64::MAX { None } else { Some(end) };
        Some(Chunk {
            start,
            size: end - start,
        })
    }
}
