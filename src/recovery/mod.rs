//! Recovery of the device-info table from a symbol-stripped image.
//!
//! The table is a static array of records of four string pointers
//! (codename, family, id, name) terminated by a null record. Nothing in the
//! image names it, so it is found from the strings of one known device:
//!
//! 1. find every address of the three marker strings;
//! 2. try each (id, codename, name) address combination as a record value
//!    until one is stored somewhere in memory (the anchor);
//! 3. walk backward from the anchor while records stay valid;
//! 4. read forward from there up to the terminator.

mod device;

pub use device::{DeviceRecord, Probe, RawDeviceInfo, RecordFault, DEVICE_INFO_FIELDS};

use thiserror::Error;
use tracing::{debug, info, info_span, trace, warn};

use crate::config::RecoveryConfig;
use crate::io::ByteSource;
use crate::layout::RecordLayout;
use crate::memory::VirtualAddressSpace;
use crate::scan::{PatternScanner, ScanError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    #[error("recovery failed: {0}")]
    InvalidConfig(String),

    #[error("recovery failed: marker {marker} string {text:?} not found")]
    MarkerNotFound { marker: &'static str, text: String },

    #[error("recovery failed: no record matches any of {candidates} marker combinations")]
    AnchorNotFound { candidates: usize },

    #[error("recovery failed: anchor record at {addr:#x} is not valid ({reason})")]
    InvalidAnchor { addr: u64, reason: &'static str },

    #[error("recovery failed: record at {addr:#x}: {fault}")]
    Corrupt {
        addr: u64,
        #[source]
        fault: RecordFault,
    },
}

/// Every address at which each marker string occurs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerHits {
    pub ids: Vec<u64>,
    pub codenames: Vec<u64>,
    pub names: Vec<u64>,
}

impl MarkerHits {
    /// Number of (id, codename, name) combinations.
    pub fn combinations(&self) -> usize {
        self.ids.len() * self.codenames.len() * self.names.len()
    }
}

/// Locates and reads the device table of one image.
pub struct StructRecovery<'a, S> {
    space: &'a VirtualAddressSpace<S>,
    scanner: PatternScanner<'a, S>,
    layout: RecordLayout,
    config: RecoveryConfig,
}

impl<'a, S: ByteSource> StructRecovery<'a, S> {
    /// Prepare recovery over `space`. The record layout comes from the config,
    /// falling back to `RecordLayout::default()`.
    pub fn new(space: &'a VirtualAddressSpace<S>, config: RecoveryConfig) -> Result<Self, RecoveryError> {
        let layout = config.effective_layout(None);
        if layout.fields != DEVICE_INFO_FIELDS {
            return Err(RecoveryError::InvalidConfig(format!(
                "device records have {} fields, layout has {}",
                DEVICE_INFO_FIELDS, layout.fields
            )));
        }
        let markers = &config.markers;
        for (marker, text) in [
            ("id", &markers.id),
            ("codename", &markers.codename),
            ("name", &markers.name),
        ] {
            if text.is_empty() || text.contains('\0') {
                return Err(RecoveryError::InvalidConfig(format!(
                    "{} marker must be a non-empty string without NUL",
                    marker
                )));
            }
        }

        Ok(Self {
            space,
            scanner: PatternScanner::with_config(space, config.scan.clone()),
            layout,
            config,
        })
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Run all phases and return the table in address order.
    pub fn run(&self) -> Result<Vec<DeviceRecord>, RecoveryError> {
        let span = info_span!("recover_device_table");
        let _guard = span.enter();

        let hits = self.locate_markers()?;
        let anchor = self.triangulate(&hits)?;
        match self.probe(anchor) {
            Probe::Valid(record) => debug!(
                addr = %format_args!("{:#x}", anchor),
                device = %record,
                "anchor record"
            ),
            other => {
                return Err(RecoveryError::InvalidAnchor {
                    addr: anchor,
                    reason: other.reason(),
                })
            }
        }

        let start = self.extend_backward(anchor);
        let records = self.collect_forward(start)?;
        info!(
            start = %format_args!("{:#x}", start),
            anchor = %format_args!("{:#x}", anchor),
            records = records.len(),
            "recovered device table"
        );
        Ok(records)
    }

    /// Find all occurrences of the NUL-terminated marker strings.
    pub fn locate_markers(&self) -> Result<MarkerHits, RecoveryError> {
        let markers = &self.config.markers;
        Ok(MarkerHits {
            ids: self.find_marker("id", &markers.id)?,
            codenames: self.find_marker("codename", &markers.codename)?,
            names: self.find_marker("name", &markers.name)?,
        })
    }

    fn find_marker(&self, marker: &'static str, text: &str) -> Result<Vec<u64>, RecoveryError> {
        let mut needle = Vec::with_capacity(text.len() + 1);
        needle.extend_from_slice(text.as_bytes());
        needle.push(0);

        let mut hits = Vec::new();
        let scanned = self.scanner.find_all(&needle, 0, |addr| {
            hits.push(addr);
            true
        });
        if let Err(err) = scanned {
            // hits in the rest of memory still count
            warn!(marker, error = %err, found = hits.len(), "marker scan skipped unreadable memory");
        }

        debug!(marker, text, found = hits.len(), "located marker");
        if hits.is_empty() {
            return Err(RecoveryError::MarkerNotFound {
                marker,
                text: text.to_string(),
            });
        }
        Ok(hits)
    }

    /// Find the first stored record built from one address of each marker.
    ///
    /// Combinations are tried id-major, then codename, then name, each in
    /// ascending address order; the first one present in memory wins.
    pub fn triangulate(&self, hits: &MarkerHits) -> Result<u64, RecoveryError> {
        for &id in &hits.ids {
            for &codename in &hits.codenames {
                for &name in &hits.names {
                    let candidate = RawDeviceInfo {
                        codename,
                        family: codename,
                        id,
                        name,
                    };
                    match self
                        .scanner
                        .find_struct(&self.layout, &candidate.to_fields(), 0)
                    {
                        Ok(Some(addr)) => {
                            debug!(
                                addr = %format_args!("{:#x}", addr),
                                id = %format_args!("{:#x}", id),
                                codename = %format_args!("{:#x}", codename),
                                name = %format_args!("{:#x}", name),
                                "triangulated anchor"
                            );
                            return Ok(addr);
                        }
                        Ok(None) => {}
                        Err(ScanError::Layout(err)) => {
                            trace!(error = %err, "candidate not representable");
                        }
                        Err(err) => {
                            debug!(error = %err, "candidate search failed");
                        }
                    }
                }
            }
        }
        Err(RecoveryError::AnchorNotFound {
            candidates: hits.combinations(),
        })
    }

    /// Validate the record at `addr`.
    pub fn probe(&self, addr: u64) -> Probe {
        let fields = match self.space.read_struct(addr, &self.layout) {
            Ok(fields) => fields,
            Err(v) => return Probe::Fault(RecordFault::Record(v)),
        };
        let raw = match RawDeviceInfo::from_fields(&fields) {
            Some(raw) => raw,
            None => return Probe::Terminator,
        };
        if raw.has_null() {
            return Probe::Terminator;
        }

        let codename = match self.read_field("codename", raw.codename) {
            Ok(s) => s,
            Err(fault) => return Probe::Fault(fault),
        };
        let family = match self.read_field("family", raw.family) {
            Ok(s) => s,
            Err(fault) => return Probe::Fault(fault),
        };
        let id = match self.read_field("id", raw.id) {
            Ok(s) => s,
            Err(fault) => return Probe::Fault(fault),
        };
        if !id.starts_with(&self.config.id_prefix) {
            return Probe::ForeignId(id);
        }
        let name = match self.read_field("name", raw.name) {
            Ok(s) => s,
            Err(fault) => return Probe::Fault(fault),
        };

        Probe::Valid(DeviceRecord {
            codename,
            family,
            id,
            name,
        })
    }

    fn read_field(&self, field: &'static str, ptr: u64) -> Result<String, RecordFault> {
        let max_len = self.config.max_string_len;
        let s = self
            .space
            .read_c_string(ptr, max_len)
            .map_err(|source| RecordFault::String { field, ptr, source })?;
        if s.truncated {
            return Err(RecordFault::Unterminated {
                field,
                ptr,
                max_len,
            });
        }
        Ok(s.value)
    }

    /// Lowest address reachable from `anchor` by stepping back one record at a
    /// time through valid records.
    pub fn extend_backward(&self, anchor: u64) -> u64 {
        let size = self.layout.size() as u64;
        let mut start = anchor;
        while let Some(prev) = start.checked_sub(size) {
            let probe = self.probe(prev);
            if !probe.is_valid() {
                trace!(
                    addr = %format_args!("{:#x}", prev),
                    reason = probe.reason(),
                    "table start"
                );
                break;
            }
            start = prev;
        }
        start
    }

    /// Read records from `start` up to the terminator.
    ///
    /// A null field or a foreign id ends the table. A record that cannot be
    /// read inside the table means the image is damaged and fails recovery.
    pub fn collect_forward(&self, start: u64) -> Result<Vec<DeviceRecord>, RecoveryError> {
        let size = self.layout.size() as u64;
        let mut records = Vec::new();
        let mut addr = start;
        loop {
            match self.probe(addr) {
                Probe::Valid(record) => {
                    trace!(addr = %format_args!("{:#x}", addr), device = %record, "record");
                    records.push(record);
                }
                Probe::Terminator | Probe::ForeignId(_) => break,
                Probe::Fault(fault) => return Err(RecoveryError::Corrupt { addr, fault }),
            }
            addr = match addr.checked_add(size) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(records)
    }
}

/// Recover the device table of the image behind `space`.
pub fn recover<S: ByteSource>(
    space: &VirtualAddressSpace<S>,
    config: &RecoveryConfig,
) -> Result<Vec<DeviceRecord>, RecoveryError> {
    StructRecovery::new(space, config.clone())?.run()
}
