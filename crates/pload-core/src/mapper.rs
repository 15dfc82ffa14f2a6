//! Conversion between hex files, memory images and live devices
//!
//! Images are always sized from the geometry of the device they are used
//! with. Writing an image to a device other than the one it was built for is
//! rejected.

use log::debug;

use crate::bootloader::{Bootloader, Progress};
use crate::device::DeviceDescriptor;
use crate::error::Result;
use crate::image::{MemoryImage, Region, Regions};

/// Build an image for `device` from hex text
///
/// Memory not covered by the file stays erased.
pub fn image_from_hex(device: &DeviceDescriptor, text: &str) -> Result<MemoryImage> {
    let mut image = MemoryImage::erased(device)?;
    image.load_hex(text)?;
    Ok(image)
}

/// Read the requested regions of a live device into a fresh image
///
/// Regions that are not requested stay erased. For
/// [`Regions::ProgramAndData`], data memory is skipped on devices that have
/// none.
pub fn read_image(
    device: &mut dyn Bootloader,
    regions: Regions,
    progress: &mut dyn Progress,
) -> Result<MemoryImage> {
    let mut image = MemoryImage::erased(device.descriptor())?;

    if regions.includes_program() {
        debug!("Reading program memory");
        device.read_program(image.region_mut(Region::Program), progress)?;
    }
    if wants_data(&image, regions) {
        debug!("Reading data memory");
        device.read_data(image.region_mut(Region::Data), progress)?;
    }

    Ok(image)
}

/// Write the requested regions of `image` to a live device
///
/// Program memory is written before data memory.
pub fn write_image(
    device: &mut dyn Bootloader,
    image: &MemoryImage,
    regions: Regions,
    progress: &mut dyn Progress,
) -> Result<()> {
    image.check_device(device.descriptor())?;

    if regions.includes_program() {
        debug!("Writing program memory");
        device.write_program(image.program(), progress)?;
    }
    if wants_data(image, regions) {
        debug!("Writing data memory");
        device.write_data(image.data(), progress)?;
    }

    Ok(())
}

/// Encode the requested regions of an image as hex text
///
/// Program memory is placed at its device address and data memory at its
/// hex-file address.
pub fn encode_hex(image: &MemoryImage, regions: Regions) -> Result<String> {
    image.to_hex(regions)
}

// An explicit data-only request always reaches the device so that a device
// without data memory reports it.
fn wants_data(image: &MemoryImage, regions: Regions) -> bool {
    match regions {
        Regions::Data => true,
        Regions::ProgramAndData => image.geometry().data_size > 0,
        Regions::Program => false,
    }
}
