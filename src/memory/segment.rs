//! Segment descriptors: load-time memory mapping units.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Memory permission flags for a segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Perms: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut perms = String::with_capacity(3);
        perms.push(if self.contains(Perms::READ) { 'r' } else { '-' });
        perms.push(if self.contains(Perms::WRITE) { 'w' } else { '-' });
        perms.push(if self.contains(Perms::EXECUTE) { 'x' } else { '-' });
        write!(f, "{}", perms)
    }
}

/// One entry of an image's segment table.
///
/// Memory covers `[vaddr, vaddr + mem_size)`; the first `file_size` bytes of
/// it come from the file at `file_offset` and the rest reads as zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub vaddr: u64,
    pub mem_size: u64,
    pub file_offset: u64,
    pub file_size: u64,
    pub perms: Perms,
    /// Non-loadable segments (notes, dynamic info, ...) are ignored by the
    /// address space.
    pub loadable: bool,
}

impl Segment {
    /// A loadable, readable segment with no file backing (all zero-fill).
    pub fn load(vaddr: u64, mem_size: u64) -> Self {
        Self {
            vaddr,
            mem_size,
            file_offset: 0,
            file_size: 0,
            perms: Perms::READ,
            loadable: true,
        }
    }

    /// Back the start of the segment with `file_size` bytes from `file_offset`.
    ///
    /// `file_size` is clamped to the memory size.
    pub fn with_file_range(mut self, file_offset: u64, file_size: u64) -> Self {
        self.file_offset = file_offset;
        self.file_size = file_size.min(self.mem_size);
        self
    }

    pub fn with_perms(mut self, perms: Perms) -> Self {
        self.perms = perms;
        self
    }

    pub fn with_loadable(mut self, loadable: bool) -> Self {
        self.loadable = loadable;
        self
    }

    /// Exclusive end address, saturating at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.vaddr.saturating_add(self.mem_size)
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.vaddr <= addr && addr < self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.mem_size == 0
    }

    pub fn is_readable(&self) -> bool {
        self.perms.contains(Perms::READ)
    }

    /// Number of zero-filled bytes at the end of the segment.
    pub fn zero_fill_len(&self) -> u64 {
        self.mem_size.saturating_sub(self.file_size)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}..{:#x} {} (file {:#x}+{:#x}{})",
            self.vaddr,
            self.end(),
            self.perms,
            self.file_offset,
            self.file_size,
            if self.loadable { "" } else { ", not loaded" }
        )
    }
}
