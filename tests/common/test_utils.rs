//! Builders for synthetic images.
//!
//! `ImageBuilder` lays out strings and pointer records in one data region
//! mapped at a base address, and can wrap that region either in a bare
//! segment table or in a minimal ELF file.

use nickelscan::layout::{Endianness, PointerWidth, RecordLayout};
use nickelscan::memory::{Perms, Segment, VirtualAddressSpace};
use std::io::Write;
use tempfile::NamedTempFile;

/// Creates a temporary file with the given content.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

/// Data region under construction.
pub struct ImageBuilder {
    base: u64,
    data: Vec<u8>,
    layout: RecordLayout,
}

impl ImageBuilder {
    /// 32-bit little-endian records mapped at `base`.
    pub fn new(base: u64) -> Self {
        Self::with_layout(base, RecordLayout::default())
    }

    pub fn with_layout(base: u64, layout: RecordLayout) -> Self {
        Self {
            base,
            data: Vec::new(),
            layout,
        }
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Current end of the region.
    pub fn here(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Append a NUL-terminated string and return its address.
    pub fn string(&mut self, s: &str) -> u64 {
        let addr = self.here();
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        addr
    }

    pub fn raw(&mut self, bytes: &[u8]) -> u64 {
        let addr = self.here();
        self.data.extend_from_slice(bytes);
        addr
    }

    /// Append a pointer-aligned record and return its address.
    pub fn record(&mut self, fields: [u64; 4]) -> u64 {
        let align = self.layout.pointer_width.bytes();
        while self.data.len() % align != 0 {
            self.data.push(0);
        }
        let addr = self.here();
        let bytes = self.layout.encode(&fields).unwrap();
        self.data.extend(bytes);
        addr
    }

    pub fn null_record(&mut self) -> u64 {
        self.record([0; 4])
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// One readable, fully file-backed segment covering the region.
    pub fn into_space(self) -> VirtualAddressSpace<Vec<u8>> {
        let len = self.data.len() as u64;
        VirtualAddressSpace::new(
            vec![Segment::load(self.base, len)
                .with_file_range(0, len)
                .with_perms(Perms::READ | Perms::WRITE)],
            self.data,
        )
    }

    /// An ELF file with a header segment at vaddr 0, the region as a data
    /// segment followed by `bss` bytes of zero-fill, and a non-loadable
    /// stack header.
    pub fn into_elf(self, bss: u64) -> Vec<u8> {
        let is64 = self.layout.pointer_width == PointerWidth::Bits64;
        let big = self.layout.byte_order == Endianness::Big;
        let word = if is64 { 8 } else { 4 };
        let ehsize: u64 = if is64 { 64 } else { 52 };
        let phentsize: u64 = if is64 { 56 } else { 32 };
        let phnum = 3u64;
        let data_offset = ehsize + phnum * phentsize;
        let data_len = self.data.len() as u64;

        let mut out = Vec::new();
        let put = |out: &mut Vec<u8>, value: u64, size: usize| {
            let mut field = value.to_le_bytes()[..size].to_vec();
            if big {
                field.reverse();
            }
            out.extend(field);
        };

        out.extend_from_slice(b"\x7fELF");
        out.push(if is64 { 2 } else { 1 });
        out.push(if big { 2 } else { 1 });
        out.push(1);
        out.extend_from_slice(&[0; 9]);
        put(&mut out, 3, 2); // ET_DYN
        put(&mut out, 40, 2); // EM_ARM
        put(&mut out, 1, 4);
        put(&mut out, 0, word);
        put(&mut out, ehsize, word);
        put(&mut out, 0, word);
        put(&mut out, 0, 4);
        put(&mut out, ehsize, 2);
        put(&mut out, phentsize, 2);
        put(&mut out, phnum, 2);
        put(&mut out, 0, 2);
        put(&mut out, 0, 2);
        put(&mut out, 0, 2);

        // (type, flags, offset, vaddr, filesz, memsz)
        let phdrs = [
            (1u64, 5u64, 0, 0, data_offset, data_offset),
            (1, 6, data_offset, self.base, data_len, data_len + bss),
            (0x6474_e551, 6, 0, 0, 0, 0),
        ];
        for (p_type, flags, offset, vaddr, filesz, memsz) in phdrs {
            put(&mut out, p_type, 4);
            if is64 {
                put(&mut out, flags, 4);
            }
            put(&mut out, offset, word);
            put(&mut out, vaddr, word);
            put(&mut out, vaddr, word);
            put(&mut out, filesz, word);
            put(&mut out, memsz, word);
            if !is64 {
                put(&mut out, flags, 4);
            }
            put(&mut out, 0x1000, word);
        }
        assert_eq!(out.len() as u64, data_offset);

        out.extend_from_slice(&self.data);
        out
    }
}
