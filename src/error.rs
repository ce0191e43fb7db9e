//! Error types for the nickelscan structure-recovery library.
//!
//! Each layer has its own `thiserror` enum; `NickelError` aggregates them
//! for callers that drive the whole pipeline (file -> segments -> records).

use thiserror::Error;

use crate::formats::FormatError;
use crate::io::error::IoError;
use crate::layout::LayoutError;
use crate::memory::SegViolation;
use crate::recovery::RecoveryError;
use crate::scan::ScanError;

/// Main error type for nickelscan operations.
#[derive(Debug, Error)]
pub enum NickelError {
    /// Opening or mapping the image failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The container format could not be decoded into segments
    #[error("Invalid image format: {0}")]
    Format(#[from] FormatError),

    /// A virtual address could not be read
    #[error(transparent)]
    Memory(#[from] SegViolation),

    /// A record could not be encoded or decoded
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Pattern search failed
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// The record array could not be recovered
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for nickelscan operations
pub type Result<T> = std::result::Result<T, NickelError>;
