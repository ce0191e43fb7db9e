//! Device-info records and their validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::memory::SegViolation;

/// Number of pointer fields in a device-info record.
pub const DEVICE_INFO_FIELDS: usize = 4;

/// One entry of the device table, with every string dereferenced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub codename: String,
    pub family: String,
    pub id: String,
    pub name: String,
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}/{})",
            self.name, self.id, self.family, self.codename
        )
    }
}

/// The raw pointers of a device-info record, in memory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawDeviceInfo {
    pub codename: u64,
    pub family: u64,
    pub id: u64,
    pub name: u64,
}

impl RawDeviceInfo {
    /// Build from decoded fields; `None` unless there are exactly four.
    pub fn from_fields(fields: &[u64]) -> Option<Self> {
        match *fields {
            [codename, family, id, name] => Some(Self {
                codename,
                family,
                id,
                name,
            }),
            _ => None,
        }
    }

    pub fn to_fields(self) -> [u64; DEVICE_INFO_FIELDS] {
        [self.codename, self.family, self.id, self.name]
    }

    pub fn has_null(&self) -> bool {
        self.to_fields().contains(&0)
    }
}

/// Why a record with non-null fields could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordFault {
    #[error("record is not readable: {0}")]
    Record(#[source] SegViolation),

    #[error("{field} string at {ptr:#x} is not readable: {source}")]
    String {
        field: &'static str,
        ptr: u64,
        source: SegViolation,
    },

    #[error("{field} string at {ptr:#x} is not terminated within {max_len} bytes")]
    Unterminated {
        field: &'static str,
        ptr: u64,
        max_len: usize,
    },
}

/// Outcome of validating the memory at one candidate record address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Valid(DeviceRecord),
    /// At least one field is the null pointer; this ends the array.
    Terminator,
    /// The id string does not have the device id prefix.
    ForeignId(String),
    Fault(RecordFault),
}

impl Probe {
    pub fn is_valid(&self) -> bool {
        matches!(self, Probe::Valid(_))
    }

    /// Short label for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Probe::Valid(_) => "valid",
            Probe::Terminator => "null field",
            Probe::ForeignId(_) => "id prefix mismatch",
            Probe::Fault(_) => "unreadable",
        }
    }
}
