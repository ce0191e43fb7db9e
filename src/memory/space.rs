//! Address resolution and reads over a segment table.

use tracing::trace;

use super::chunks::{Chunk, Chunks};
use super::reader::{AddressReader, CStringRead};
use super::segment::Segment;
use super::{SegViolation, ViolationKind};
use crate::io::ByteSource;
use crate::layout::{decode_pointer, Endianness, PointerWidth, RecordLayout};

/// The part of one segment readable from a given address without the
/// winning segment changing.
#[derive(Debug, Clone, Copy)]
pub(super) struct Run<'a> {
    pub segment: &'a Segment,
    /// Offset of the address from the segment start.
    pub offset: u64,
    /// Bytes available from the address.
    pub len: u64,
}

/// Read-only view of an image as virtual memory.
///
/// Immutable after construction; any number of readers may borrow it.
#[derive(Debug, Clone)]
pub struct VirtualAddressSpace<S> {
    segments: Vec<Segment>,
    source: S,
}

impl<S: ByteSource> VirtualAddressSpace<S> {
    /// Build an address space from a segment table in its original order.
    pub fn new(segments: Vec<Segment>, source: S) -> Self {
        Self { segments, source }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn loadable(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().filter(|s| s.loadable && !s.is_empty())
    }

    /// Locate the segment serving `addr` and how far it serves.
    ///
    /// The last readable loadable segment covering `addr` wins. The run is cut
    /// at the segment's end and at the start of any loadable segment based
    /// above `addr`, since that segment may take over from there.
    pub(super) fn resolve(&self, addr: u64) -> Result<Run<'_>, SegViolation> {
        let mut covered = false;
        let mut winner = None;
        for seg in self.loadable() {
            if seg.contains(addr) {
                covered = true;
                if seg.is_readable() {
                    winner = Some(seg);
                }
            }
        }

        let segment = match winner {
            Some(seg) => seg,
            None if covered => {
                return Err(SegViolation::new(addr, ViolationKind::NoReadPermission))
            }
            None => return Err(SegViolation::new(addr, ViolationKind::Unmapped)),
        };

        let len = self
            .loadable()
            .filter(|s| s.vaddr > addr)
            .map(|s| s.vaddr - addr)
            .fold(segment.end() - addr, u64::min);

        Ok(Run {
            segment,
            offset: addr - segment.vaddr,
            len,
        })
    }

    /// Fill `out` from a run starting at `addr`. `out` must not exceed the run.
    pub(super) fn fill(&self, run: &Run<'_>, addr: u64, out: &mut [u8]) -> Result<(), SegViolation> {
        let seg = run.segment;
        let file_len = seg
            .file_size
            .saturating_sub(run.offset)
            .min(out.len() as u64) as usize;

        if file_len > 0 {
            let eof = || SegViolation::new(addr, ViolationKind::UnexpectedEof);
            let file_pos = seg.file_offset.checked_add(run.offset).ok_or_else(eof)?;
            self.source
                .read_exact_at(file_pos, &mut out[..file_len])
                .map_err(|err| {
                    trace!(
                        addr = %format_args!("{:#x}", addr),
                        file_pos = %format_args!("{:#x}", file_pos),
                        len = file_len,
                        error = %err,
                        "short read from backing source"
                    );
                    eof()
                })?;
        }
        out[file_len..].fill(0);
        Ok(())
    }

    /// Fill `buf` with the memory at `addr`, crossing segments as needed.
    pub fn read_exact(&self, addr: u64, buf: &mut [u8]) -> Result<(), SegViolation> {
        let mut cur = addr;
        let mut done = 0;
        while done < buf.len() {
            let run = self.resolve(cur)?;
            let n = run.len.min((buf.len() - done) as u64) as usize;
            self.fill(&run, cur, &mut buf[done..done + n])?;
            done += n;
            // n never exceeds the segment end, which saturates at u64::MAX
            cur += n as u64;
        }
        Ok(())
    }

    /// Read `len` bytes at `addr` into a new buffer.
    pub fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>, SegViolation> {
        let mut buf = vec![0u8; len];
        self.read_exact(addr, &mut buf)?;
        Ok(buf)
    }

    /// A sequential reader positioned at `addr`, unbounded.
    pub fn reader_at(&self, addr: u64) -> AddressReader<'_, S> {
        AddressReader::new(self, addr)
    }

    /// Read one record at `addr` and decode its fields.
    pub fn read_struct(&self, addr: u64, layout: &RecordLayout) -> Result<Vec<u64>, SegViolation> {
        let mut buf = vec![0u8; layout.size()];
        self.reader_at(addr).read_exact(&mut buf)?;
        layout.decode(&buf).map_err(|_| {
            SegViolation::new(addr.saturating_add(buf.len() as u64), ViolationKind::UnexpectedEof)
        })
    }

    /// Read a pointer-sized value.
    pub fn read_pointer(
        &self,
        addr: u64,
        width: PointerWidth,
        order: Endianness,
    ) -> Result<u64, SegViolation> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..width.bytes()];
        self.read_exact(addr, buf)?;
        Ok(decode_pointer(width, order, buf))
    }

    pub fn read_u32(&self, addr: u64, order: Endianness) -> Result<u32, SegViolation> {
        self.read_pointer(addr, PointerWidth::Bits32, order)
            .map(|v| v as u32)
    }

    pub fn read_u64(&self, addr: u64, order: Endianness) -> Result<u64, SegViolation> {
        self.read_pointer(addr, PointerWidth::Bits64, order)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes including the
    /// terminator (0 for unlimited).
    ///
    /// Hitting the limit without a terminator is not an error; the bytes read
    /// so far come back with `truncated` set.
    pub fn read_c_string(&self, addr: u64, max_len: usize) -> Result<CStringRead, SegViolation> {
        let mut reader = self.reader_at(addr);
        if max_len > 0 {
            reader = reader.with_limit(max_len as u64);
        }
        reader.read_c_string()
    }

    /// Iterate maximal mapped ranges at or after `start`, in ascending order.
    pub fn chunks(&self, start: u64) -> Chunks<'_> {
        Chunks::new(&self.segments, start)
    }

    /// Iterate maximal readable ranges at or after `start`, in ascending
    /// order. Parts of a chunk served only by segments without read
    /// permission are left out.
    pub fn readable_ranges(&self, start: u64) -> impl Iterator<Item = Chunk> + '_ {
        self.chunks(start)
            .flat_map(move |chunk| self.split_readable(chunk))
    }

    fn split_readable(&self, chunk: Chunk) -> Vec<Chunk> {
        let end = chunk.end();
        let mut ranges = Vec::new();
        let mut open = None;
        let mut addr = chunk.start;
        while addr < end {
            match self.resolve(addr) {
                Ok(run) => {
                    open.get_or_insert(addr);
                    addr = addr.saturating_add(run.len).min(end);
                }
                Err(_) => {
                    if let Some(from) = open.take() {
                        ranges.push(Chunk {
                            start: from,
                            size: addr - from,
                        });
                    }
                    // no readable segment covers addr, so none does until the next one starts
                    addr = self
                        .loadable()
                        .filter(|s| s.is_readable() && s.vaddr > addr)
                        .map(|s| s.vaddr)
                        .min()
                        .unwrap_or(end)
                        .min(end);
                }
            }
        }
        if let Some(from) = open {
            ranges.push(Chunk {
                start: from,
                size: end - from,
            });
        }
        ranges
    }

    pub fn is_mapped(&self, addr: u64) -> bool {
        self.resolve(addr).is_ok()
    }

    /// Total size of all mapped memory.
    pub fn mapped_len(&self) -> u64 {
        self.chunks(0)
            .fold(0u64, |acc, chunk| acc.saturating_add(chunk.size))
    }
}
