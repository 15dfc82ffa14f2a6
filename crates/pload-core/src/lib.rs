//! pload-core - Core library for USB bootloader programming
//!
//! This crate holds everything that does not depend on a particular
//! transport:
//!
//! - [`device`]: descriptors and memory geometry reported by a bootloader
//! - [`bootloader`]: the `Bootloader` and `BootloaderCatalog` traits that
//!   transports (USB, in-memory emulator) implement
//! - [`image`]: the two-region memory image sized to a device
//! - [`hexfile`]: Intel HEX decoding and encoding
//! - [`mapper`]: conversion between hex files, memory images and live devices
//!
//! # Example
//!
//! ```ignore
//! use pload_core::{mapper, NoProgress, Regions};
//!
//! let text = std::fs::read_to_string("app.hex")?;
//! let image = mapper::image_from_hex(device.descriptor(), &text)?;
//! mapper::write_image(device.as_mut(), &image, Regions::Program, &mut NoProgress)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bootloader;
pub mod device;
pub mod error;
pub mod hexfile;
pub mod image;
pub mod mapper;

pub use bootloader::{Bootloader, BootloaderCatalog, NoProgress, Progress};
pub use device::{BootloaderType, DeviceDescriptor, MemoryGeometry};
pub use error::{Error, Result};
pub use image::{MemoryImage, Region, Regions, Window};
