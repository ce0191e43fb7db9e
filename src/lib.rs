//! Signature-based recovery of static record tables from stripped images.
//!
//! The crate reads an executable image as virtual memory using only its
//! segment table, searches that memory for byte patterns, and uses a few
//! known strings to locate and bound the device-info table compiled into
//! libnickel.
//!
//! ```no_run
//! use nickelscan::config::RecoveryConfig;
//! use nickelscan::io::{IOLimits, MappedImage};
//! use nickelscan::memory::VirtualAddressSpace;
//!
//! # fn main() -> nickelscan::error::Result<()> {
//! let image = MappedImage::open("libnickel.so.1.0.0", &IOLimits::default())?;
//! let elf = nickelscan::formats::elf::load(image.as_bytes())?;
//! let mut config = RecoveryConfig::default();
//! config.layout = Some(elf.default_layout());
//! let space = VirtualAddressSpace::new(elf.segments, &image);
//! for device in nickelscan::recovery::recover(&space, &config)? {
//!     println!("{device}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod formats;
pub mod io;
pub mod layout;
pub mod logging;
pub mod memory;
pub mod recovery;
pub mod scan;

pub use error::{NickelError, Result};
