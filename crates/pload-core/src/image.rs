//! Memory image sized to a device's geometry
//!
//! A [`MemoryImage`] holds one buffer for program memory and one for data
//! memory. Both start out erased (0xFF). Each buffer is reachable through a
//! window in the hex-file address space: program memory at its device
//! address, data memory at its hex-file address.

use core::ops::Range;

use crate::device::{DeviceDescriptor, MemoryGeometry};
use crate::error::{Error, Result};
use crate::hexfile;

/// Value of an erased memory byte
pub const ERASED: u8 = 0xFF;

/// One of the two memories of a bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Program memory (flash)
    Program,
    /// Persistent data memory (EEPROM)
    Data,
}

/// Set of regions an action works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regions {
    /// Program memory and data memory
    ProgramAndData,
    /// Program memory only
    Program,
    /// Data memory only
    Data,
}

impl Regions {
    /// Whether program memory is part of the set
    pub fn includes_program(self) -> bool {
        matches!(self, Regions::ProgramAndData | Regions::Program)
    }

    /// Whether data memory is part of the set
    pub fn includes_data(self) -> bool {
        matches!(self, Regions::ProgramAndData | Regions::Data)
    }
}

/// A region together with its range in the hex-file address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Which buffer the window maps to
    pub region: Region,
    /// Hex-file addresses covered by the buffer
    pub range: Range<u32>,
}

/// Program and data memory contents for one particular device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    serial_number: String,
    geometry: MemoryGeometry,
    program: Vec<u8>,
    data: Vec<u8>,
}

impl MemoryImage {
    /// Allocate an image for `device` with both memories erased
    pub fn erased(device: &DeviceDescriptor) -> Result<Self> {
        let geometry = device.geometry;
        geometry.validate()?;

        Ok(Self {
            serial_number: device.serial_number.clone(),
            geometry,
            program: vec![ERASED; geometry.program_size as usize],
            data: vec![ERASED; geometry.data_size as usize],
        })
    }

    /// Serial number of the device this image was built for
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Geometry of the device this image was built for
    pub fn geometry(&self) -> &MemoryGeometry {
        &self.geometry
    }

    /// Program memory contents
    pub fn program(&self) -> &[u8] {
        &self.program
    }

    /// Data memory contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Contents of one region
    pub fn region(&self, region: Region) -> &[u8] {
        match region {
            Region::Program => &self.program,
            Region::Data => &self.data,
        }
    }

    /// Mutable contents of one region
    pub fn region_mut(&mut self, region: Region) -> &mut [u8] {
        match region {
            Region::Program => &mut self.program,
            Region::Data => &mut self.data,
        }
    }

    /// Whether every byte of `region` is erased
    pub fn is_erased(&self, region: Region) -> bool {
        self.region(region).iter().all(|&b| b == ERASED)
    }

    /// Windows of the requested regions, ordered by hex-file address
    ///
    /// Regions of size zero have no window.
    pub fn windows(&self, regions: Regions) -> Vec<Window> {
        let mut windows = Vec::with_capacity(2);
        if regions.includes_program() && self.geometry.program_size > 0 {
            windows.push(Window {
                region: Region::Program,
                range: self.geometry.program_window(),
            });
        }
        if regions.includes_data() && self.geometry.data_size > 0 {
            windows.push(Window {
                region: Region::Data,
                range: self.geometry.data_window(),
            });
        }
        windows.sort_by_key(|w| w.range.start);
        windows
    }

    /// Decode hex text into the image
    ///
    /// Every data record must fall entirely inside one window. Bytes not
    /// covered by any record keep their current value.
    pub fn load_hex(&mut self, text: &str) -> Result<()> {
        let windows = self.windows(Regions::ProgramAndData);

        hexfile::decode(text, |record| {
            let start = record.address as u64;
            let end = start + record.data.len() as u64;

            let window = windows
                .iter()
                .find(|w| start >= w.range.start as u64 && end <= w.range.end as u64)
                .ok_or(Error::Mapping {
                    line: record.line,
                    address: record.address,
                    len: record.data.len(),
                })?;

            let offset = (record.address - window.range.start) as usize;
            self.region_mut(window.region)[offset..offset + record.data.len()]
                .copy_from_slice(record.data);
            Ok(())
        })
    }

    /// Encode the requested regions as hex text
    pub fn to_hex(&self, regions: Regions) -> Result<String> {
        let windows = self.windows(regions);
        let blocks: Vec<_> = windows
            .iter()
            .map(|w| hexfile::Block {
                address: w.range.start,
                data: self.region(w.region),
            })
            .collect();
        hexfile::encode(&blocks)
    }

    /// Check that this image was built for `device`
    pub fn check_device(&self, device: &DeviceDescriptor) -> Result<()> {
        if self.serial_number != device.serial_number || self.geometry != device.geometry {
            return Err(Error::DeviceMismatch {
                expected: self.serial_number.clone(),
                actual: device.serial_number.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pstar() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "Pololu P-Star 25K50 Bootloader".into(),
            serial_number: "12345678".into(),
            vendor_id: 0x1FFB,
            product_id: 0x0102,
            geometry: MemoryGeometry {
                program_address: 0x2000,
                program_size: 0x6000,
                data_address: 0,
                data_hex_address: 0xF0_0000,
                data_size: 0x100,
            },
        }
    }

    #[test]
    fn test_erased_image_matches_geometry() {
        let image = MemoryImage::erased(&pstar()).unwrap();
        assert_eq!(image.program().len(), 0x6000);
        assert_eq!(image.data().len(), 0x100);
        assert!(image.is_erased(Region::Program));
        assert!(image.is_erased(Region::Data));
        assert_eq!(image.serial_number(), "12345678");
    }

    #[test]
    fn test_windows_sorted_by_address() {
        let mut desc = pstar();
        desc.geometry.data_hex_address = 0x1000;
        let image = MemoryImage::erased(&desc).unwrap();
        let windows = image.windows(Regions::ProgramAndData);
        assert_eq!(windows[0].region, Region::Data);
        assert_eq!(windows[1].region, Region::Program);
    }

    #[test]
    fn test_no_data_window_without_data_memory() {
        let mut desc = pstar();
        desc.geometry.data_size = 0;
        let image = MemoryImage::erased(&desc).unwrap();
        assert!(image.windows(Regions::Data).is_empty());
        assert_eq!(image.windows(Regions::ProgramAndData).len(), 1);
    }

    #[test]
    fn test_load_hex_fills_both_regions() {
        let mut image = MemoryImage::erased(&pstar()).unwrap();
        let text = ":0420000001020304D2\n:0200000400F00A\n:02000000AABB99\n:00000001FF\n";
        image.load_hex(text).unwrap();

        assert_eq!(&image.program()[..5], &[1, 2, 3, 4, 0xFF]);
        assert_eq!(&image.data()[..3], &[0xAA, 0xBB, 0xFF]);
    }

    #[test]
    fn test_load_hex_outside_windows() {
        let mut image = MemoryImage::erased(&pstar()).unwrap();
        // Four bytes at 0x0000, below program memory
        let text = ":0400000001020304F2\n:00000001FF\n";
        match image.load_hex(text) {
            Err(Error::Mapping { line, address, len }) => {
                assert_eq!(line, 1);
                assert_eq!(address, 0);
                assert_eq!(len, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_load_hex_record_straddling_window_end() {
        let mut image = MemoryImage::erased(&pstar()).unwrap();
        // Two bytes at 0x7FFF: the second byte is past program memory
        let text = ":027FFF0011224D\n:00000001FF\n";
        let err = image.load_hex(text).unwrap_err();
        assert!(matches!(err, Error::Mapping { address: 0x7FFF, len: 2, .. }));
    }

    #[test]
    fn test_hex_round_trip() {
        let mut image = MemoryImage::erased(&pstar()).unwrap();
        image.region_mut(Region::Program)[0x10] = 0x42;
        image.region_mut(Region::Data)[0xFF] = 0x24;

        let text = image.to_hex(Regions::ProgramAndData).unwrap();

        let mut decoded = MemoryImage::erased(&pstar()).unwrap();
        decoded.load_hex(&text).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_check_device_rejects_other_serial() {
        let image = MemoryImage::erased(&pstar()).unwrap();
        let mut other = pstar();
        other.serial_number = "87654321".into();
        assert!(image.check_device(&pstar()).is_ok());
        assert!(matches!(
            image.check_device(&other),
            Err(Error::DeviceMismatch { .. })
        ));
    }
}
