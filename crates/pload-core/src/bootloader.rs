//! Bootloader traits
//!
//! These traits are the boundary between the command layer and a concrete
//! transport. `pload-usb` implements them over USB control transfers and
//! `pload-dummy` implements them in memory for tests.

use crate::device::{BootloaderType, DeviceDescriptor};
use crate::error::Result;

/// Receives progress updates from long-running device operations
///
/// `status` names the phase ("Erasing flash...", "Writing EEPROM..."). A new
/// status string starts a new phase; `progress` counts up to `max_progress`
/// within the phase.
pub trait Progress {
    /// Report progress within the current phase
    fn update(&mut self, status: &'static str, progress: u32, max_progress: u32);
}

/// Progress reporter that discards all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _status: &'static str, _progress: u32, _max_progress: u32) {}
}

/// An open connection to one bootloader
///
/// All buffers are exactly as large as the corresponding memory region
/// reported in [`DeviceDescriptor::geometry`]. Implementations return
/// [`crate::Error::BufferSize`] otherwise.
pub trait Bootloader {
    /// Descriptor of the connected device
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Erase program memory and write `image` to it
    ///
    /// Blocks that are entirely 0xFF are left erased.
    fn write_program(&mut self, image: &[u8], progress: &mut dyn Progress) -> Result<()>;

    /// Read the whole program memory into `image`
    fn read_program(&mut self, image: &mut [u8], progress: &mut dyn Progress) -> Result<()>;

    /// Write the whole data memory
    fn write_data(&mut self, image: &[u8], progress: &mut dyn Progress) -> Result<()>;

    /// Read the whole data memory into `image`
    fn read_data(&mut self, image: &mut [u8], progress: &mut dyn Progress) -> Result<()>;

    /// Ask the bootloader whether a valid application is present
    fn check_application(&mut self) -> Result<bool>;

    /// Restart the device so that it runs the application
    fn restart(&mut self) -> Result<()>;
}

/// Discovers and opens bootloaders
pub trait BootloaderCatalog {
    /// Bootloader types this catalog knows how to talk to
    fn supported_types(&self) -> &[BootloaderType];

    /// List connected bootloaders, keeping only the one whose serial number
    /// equals `serial_number` when it is given
    ///
    /// Every call builds a new list.
    fn discover(&self, serial_number: Option<&str>) -> Result<Vec<DeviceDescriptor>>;

    /// Open a previously discovered bootloader
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Bootloader>>;
}

/// Return an error unless `buf` matches the size of a memory region
pub fn check_buffer_size(buf: &[u8], region_size: u32) -> Result<()> {
    if buf.len() != region_size as usize {
        return Err(crate::Error::BufferSize {
            expected: region_size as usize,
            actual: buf.len(),
        });
    }
    Ok(())
}
