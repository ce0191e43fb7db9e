//! Virtual-address view over an executable image.
//!
//! A `VirtualAddressSpace` combines a segment table (as decoded from the
//! image's load metadata) with a `ByteSource` for the file contents and lets
//! callers read the image as if it were the memory of a loaded process:
//! file-backed bytes where segments have them, zeroes for the rest of each
//! segment's memory size, and a `SegViolation` everywhere else.

mod chunks;
mod reader;
mod segment;
mod space;

pub use chunks::{Chunk, Chunks};
pub use reader::{AddressReader, CStringRead};
pub use segment::{Perms, Segment};
pub use space::VirtualAddressSpace;

use std::fmt;

/// Why a read of virtual memory failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// No loadable segment covers the address.
    Unmapped,
    /// The address is only covered by segments without read permission.
    NoReadPermission,
    /// The backing source returned fewer bytes than the segment promises.
    UnexpectedEof,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped => write!(f, "no mapped segment"),
            Self::NoReadPermission => write!(f, "no permission to read mapped segment"),
            Self::UnexpectedEof => write!(f, "unexpected end of file-backed data"),
        }
    }
}

/// A read touched memory that cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("segmentation violation at {addr:#x}: {kind}")]
pub struct SegViolation {
    /// First address that could not be read.
    pub addr: u64,
    pub kind: ViolationKind,
}

impl SegViolation {
    pub fn new(addr: u64, kind: ViolationKind) -> Self {
        Self { addr, kind }
    }
}

impl From<SegViolation> for std::io::Error {
    fn from(v: SegViolation) -> Self {
        let kind = match v.kind {
            ViolationKind::UnexpectedEof => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, v)
    }
}
