//! ELF program headers as a segment table.

use object::elf::{FileHeader32, FileHeader64, PF_R, PF_W, PF_X, PT_LOAD};
use object::read::elf::{FileHeader, ProgramHeader};
use object::{Endian, Endianness as ObjectEndianness, FileKind};
use tracing::debug;

use super::FormatError;
use crate::layout::{Endianness, PointerWidth, RecordLayout};
use crate::memory::{Perms, Segment};

/// Load metadata of an ELF image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfImage {
    /// Every program header, in table order.
    pub segments: Vec<Segment>,
    pub pointer_width: PointerWidth,
    pub endianness: Endianness,
}

impl ElfImage {
    /// Device-record layout matching the image's class and byte order.
    pub fn default_layout(&self) -> RecordLayout {
        RecordLayout::new(
            self.pointer_width,
            self.endianness,
            crate::recovery::DEVICE_INFO_FIELDS,
        )
    }
}

/// Decode the program headers of an ELF32 or ELF64 image.
pub fn load(data: &[u8]) -> Result<ElfImage, FormatError> {
    match FileKind::parse(data)? {
        FileKind::Elf32 => decode::<FileHeader32<ObjectEndianness>>(data, PointerWidth::Bits32),
        FileKind::Elf64 => decode::<FileHeader64<ObjectEndianness>>(data, PointerWidth::Bits64),
        other => Err(FormatError::Unsupported(format!("{:?}", other))),
    }
}

fn decode<Elf>(data: &[u8], pointer_width: PointerWidth) -> Result<ElfImage, FormatError>
where
    Elf: FileHeader<Endian = ObjectEndianness>,
{
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let segments: Vec<Segment> = header
        .program_headers(endian, data)?
        .iter()
        .map(|ph| to_segment(ph, endian))
        .collect();

    let endianness = if endian.is_little_endian() {
        Endianness::Little
    } else {
        Endianness::Big
    };
    debug!(
        segments = segments.len(),
        loadable = segments.iter().filter(|s| s.loadable).count(),
        bits = pointer_width.bits(),
        ?endianness,
        "decoded ELF program headers"
    );

    Ok(ElfImage {
        segments,
        pointer_width,
        endianness,
    })
}

fn to_segment<P: ProgramHeader>(ph: &P, endian: P::Endian) -> Segment {
    let flags = ph.p_flags(endian);
    let mut perms = Perms::empty();
    perms.set(Perms::READ, flags & PF_R != 0);
    perms.set(Perms::WRITE, flags & PF_W != 0);
    perms.set(Perms::EXECUTE, flags & PF_X != 0);

    Segment::load(ph.p_vaddr(endian).into(), ph.p_memsz(endian).into())
        .with_file_range(ph.p_offset(endian).into(), ph.p_filesz(endian).into())
        .with_perms(perms)
        .with_loadable(ph.p_type(endian) == PT_LOAD)
}
