//! Fixed-shape records of pointer-sized fields.
//!
//! A `RecordLayout` describes how a statically-compiled array element is laid
//! out in the image: `fields` consecutive pointers of one width and byte
//! order, with no padding. The same layout is used to decode records read
//! from memory and to encode candidate records used as search needles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte order of multi-byte values in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Size of an address in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointerWidth {
    #[default]
    #[serde(rename = "32")]
    Bits32,
    #[serde(rename = "64")]
    Bits64,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Largest address representable at this width.
    pub fn max_value(self) -> u64 {
        match self {
            PointerWidth::Bits32 => u32::MAX as u64,
            PointerWidth::Bits64 => u64::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("value {value:#x} does not fit in a {bits}-bit field")]
    ValueTooWide { value: u64, bits: u32 },

    #[error("expected {expected} field values, got {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("record needs {needed} bytes, buffer has {found}")]
    ShortBuffer { needed: usize, found: usize },
}

/// Decode one pointer from exactly `width.bytes()` bytes.
pub fn decode_pointer(width: PointerWidth, order: Endianness, bytes: &[u8]) -> u64 {
    match width {
        PointerWidth::Bits32 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[..4]);
            match order {
                Endianness::Little => u32::from_le_bytes(raw) as u64,
                Endianness::Big => u32::from_be_bytes(raw) as u64,
            }
        }
        PointerWidth::Bits64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            match order {
                Endianness::Little => u64::from_le_bytes(raw),
                Endianness::Big => u64::from_be_bytes(raw),
            }
        }
    }
}

fn encode_pointer(width: PointerWidth, order: Endianness, value: u64, out: &mut Vec<u8>) {
    match (width, order) {
        (PointerWidth::Bits32, Endianness::Little) => {
            out.extend_from_slice(&(value as u32).to_le_bytes())
        }
        (PointerWidth::Bits32, Endianness::Big) => {
            out.extend_from_slice(&(value as u32).to_be_bytes())
        }
        (PointerWidth::Bits64, Endianness::Little) => out.extend_from_slice(&value.to_le_bytes()),
        (PointerWidth::Bits64, Endianness::Big) => out.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Shape of one record: `fields` pointers of `pointer_width`, `byte_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordLayout {
    pub pointer_width: PointerWidth,
    pub byte_order: Endianness,
    pub fields: usize,
}

impl Default for RecordLayout {
    /// The device-info record of 32-bit little-endian ARM builds.
    fn default() -> Self {
        Self::new(PointerWidth::Bits32, Endianness::Little, 4)
    }
}

impl RecordLayout {
    pub const fn new(pointer_width: PointerWidth, byte_order: Endianness, fields: usize) -> Self {
        Self {
            pointer_width,
            byte_order,
            fields,
        }
    }

    /// Size of one record in bytes.
    pub fn size(&self) -> usize {
        self.fields * self.pointer_width.bytes()
    }

    /// Serialize field values into the record's on-disk bytes.
    pub fn encode(&self, values: &[u64]) -> Result<Vec<u8>, LayoutError> {
        if values.len() != self.fields {
            return Err(LayoutError::FieldCount {
                expected: self.fields,
                found: values.len(),
            });
        }
        let mut out = Vec::with_capacity(self.size());
        for &value in values {
            if value > self.pointer_width.max_value() {
                return Err(LayoutError::ValueTooWide {
                    value,
                    bits: self.pointer_width.bits(),
                });
            }
            encode_pointer(self.pointer_width, self.byte_order, value, &mut out);
        }
        Ok(out)
    }

    /// Decode the field values from the first `size()` bytes of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u64>, LayoutError> {
        if bytes.len() < self.size() {
            return Err(LayoutError::ShortBuffer {
                needed: self.size(),
                found: bytes.len(),
            });
        }
        Ok(bytes[..self.size()]
            .chunks_exact(self.pointer_width.bytes())
            .map(|field| decode_pointer(self.pointer_width, self.byte_order, field))
            .collect())
    }
}
