//! Adapters from container formats to segment tables.
//!
//! Decoding is delegated to the `object` crate; this module only maps its
//! program headers onto `memory::Segment` descriptors.

pub mod elf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{0}")]
    Object(#[from] object::read::Error),

    #[error("unsupported file kind: {0}")]
    Unsupported(String),
}
