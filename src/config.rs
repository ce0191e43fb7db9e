//! Configuration for scanning and structure recovery.
//!
//! All structs have defaults matching the 32-bit little-endian device table
//! found in libnickel, and can be loaded from JSON with missing fields
//! falling back to those defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NickelError, Result};
use crate::layout::RecordLayout;

/// Fixed prefix shared by every device id string.
pub const DEVICE_ID_PREFIX: &str = "00000000-0000-0000-0000-000000000";

/// Known strings of one device, used to find its record without symbols.
///
/// The three strings must co-occur in exactly one record, with `codename`
/// used for both the codename and family fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub id: String,
    pub codename: String,
    pub name: String,
}

impl Default for Markers {
    /// Kobo Touch A/B.
    fn default() -> Self {
        Self {
            id: "00000000-0000-0000-0000-000000000310".to_string(),
            codename: "trilogy".to_string(),
            name: "Kobo Touch".to_string(),
        }
    }
}

/// Pattern scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Largest buffer read from the image at once. Longer chunks are
    /// scanned in overlapping windows.
    pub window_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Device table recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub markers: Markers,
    /// Record shape; `None` uses the image's own layout when known and
    /// `RecordLayout::default()` otherwise.
    pub layout: Option<RecordLayout>,
    /// Longest string (including the terminator) accepted for a field.
    pub max_string_len: usize,
    /// Prefix every id string must start with.
    pub id_prefix: String,
    pub scan: ScanConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            markers: Markers::default(),
            layout: None,
            max_string_len: 128,
            id_prefix: DEVICE_ID_PREFIX.to_string(),
            scan: ScanConfig::default(),
        }
    }
}

impl RecoveryConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NickelError::Config(e.to_string()))
    }

    /// Load a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            NickelError::Config(format!("read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// The layout to use, given the one the image declares (if any).
    pub fn effective_layout(&self, image_layout: Option<RecordLayout>) -> RecordLayout {
        self.layout.or(image_layout).unwrap_or_default()
    }
}
