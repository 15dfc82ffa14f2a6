//! pload-usb - Pololu USB bootloader support
//!
//! This crate talks to bootloaders of the Pololu native USB bootloader
//! family (for example the one on the P-Star 25K50) using vendor control
//! requests on endpoint 0.
//!
//! # Protocol Overview
//!
//! Every operation is a single control transfer. Addresses are split across
//! the setup packet: the low 16 bits go in `wValue` and the high 16 bits in
//! `wIndex`. When the bootloader rejects a write it stalls the request, and
//! the reason can then be fetched with a GET_LAST_ERROR request.
//!
//! Programming goes through these steps:
//!
//! 1. SET_DEVICE_CODE, for bootloaders that need one
//! 2. INITIALIZE
//! 3. ERASE_FLASH, repeated until the bootloader reports no pages left
//! 4. WRITE_FLASH_BLOCK for every non-blank block, from the top of program
//!    memory down
//!
//! # Example
//!
//! ```no_run
//! use pload_core::{BootloaderCatalog, NoProgress};
//! use pload_usb::UsbCatalog;
//!
//! let catalog = UsbCatalog;
//! let devices = catalog.discover(None)?;
//! if let Some(desc) = devices.first() {
//!     let mut bootloader = catalog.open(desc)?;
//!     println!("Application present: {}", bootloader.check_application()?);
//!     bootloader.restart()?;
//! }
//! # Ok::<(), pload_core::Error>(())
//! ```

mod device;
mod error;
pub mod protocol;

pub use device::{PololuBootloader, UsbCatalog};
pub use error::{Result, UsbError};
pub use protocol::BOOTLOADERS;
