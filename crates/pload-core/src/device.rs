//! Device descriptors and memory geometry
//!
//! A bootloader exposes two memories: program memory (flash) and persistent
//! data memory (EEPROM). Program memory is addressed the same way on the
//! device and in hex files. Data memory has its own device address and a
//! separate address used when it is stored in a hex file, so that both
//! memories can live in one file without overlapping.

use core::fmt;
use core::ops::Range;

use crate::error::{Error, Result};

/// Memory layout reported by a bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryGeometry {
    /// Address of the first byte of program memory
    pub program_address: u32,
    /// Number of bytes of program memory
    pub program_size: u32,
    /// Address of the first byte of data memory, as used by the device
    pub data_address: u32,
    /// Address of the first byte of data memory inside a hex file
    pub data_hex_address: u32,
    /// Number of bytes of data memory (0 if the device has none)
    pub data_size: u32,
}

impl MemoryGeometry {
    /// Hex-file address range covered by program memory
    pub fn program_window(&self) -> Range<u32> {
        self.program_address..self.program_address + self.program_size
    }

    /// Hex-file address range covered by data memory
    pub fn data_window(&self) -> Range<u32> {
        self.data_hex_address..self.data_hex_address + self.data_size
    }

    /// Check that both windows fit in the 32-bit hex address space and do
    /// not overlap each other
    pub fn validate(&self) -> Result<()> {
        let program_end = self.program_address.checked_add(self.program_size);
        let data_end = self.data_hex_address.checked_add(self.data_size);
        let (program_end, data_end) = match (program_end, data_end) {
            (Some(p), Some(d)) => (p, d),
            _ => {
                return Err(Error::InvalidGeometry(format!(
                    "memory windows exceed the 32-bit address space ({})",
                    self
                )))
            }
        };

        if self.program_size == 0 {
            return Err(Error::InvalidGeometry("program memory is empty".into()));
        }

        let overlap = self.data_size > 0
            && self.program_address < data_end
            && self.data_hex_address < program_end;
        if overlap {
            return Err(Error::InvalidGeometry(format!(
                "program and data windows overlap ({})",
                self
            )));
        }

        Ok(())
    }
}

impl fmt::Display for MemoryGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "program 0x{:06X}-0x{:06X}, data 0x{:06X}-0x{:06X}",
            self.program_address,
            self.program_address as u64 + self.program_size as u64,
            self.data_hex_address,
            self.data_hex_address as u64 + self.data_size as u64
        )
    }
}

/// Static description of a supported bootloader type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderType {
    /// Product name of the bootloader
    pub name: &'static str,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Memory layout
    pub geometry: MemoryGeometry,
    /// Number of bytes in one program memory write request
    pub write_block_size: u16,
    /// Whether program memory can be read back
    pub supports_reading_program: bool,
    /// Whether data memory can be read and written
    pub supports_data_access: bool,
    /// 16-byte device code sent before erasing, if the bootloader needs one
    pub device_code: Option<[u8; 16]>,
}

/// A bootloader found during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Product name of the bootloader
    pub name: String,
    /// USB serial number
    pub serial_number: String,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Memory layout
    pub geometry: MemoryGeometry,
}

impl DeviceDescriptor {
    /// Build a descriptor for a device of a known type
    pub fn new(ty: &BootloaderType, serial_number: impl Into<String>) -> Self {
        Self {
            name: ty.name.to_string(),
            serial_number: serial_number.into(),
            vendor_id: ty.vendor_id,
            product_id: ty.product_id,
            geometry: ty.geometry,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04X}:{:04X}, serial {})",
            self.name, self.vendor_id, self.product_id, self.serial_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> MemoryGeometry {
        MemoryGeometry {
            program_address: 0x2000,
            program_size: 0x6000,
            data_address: 0,
            data_hex_address: 0xF0_0000,
            data_size: 0x100,
        }
    }

    #[test]
    fn test_windows() {
        let g = geometry();
        assert_eq!(g.program_window(), 0x2000..0x8000);
        assert_eq!(g.data_window(), 0xF0_0000..0xF0_0100);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_overlapping_windows_rejected() {
        let g = MemoryGeometry {
            data_hex_address: 0x7F00,
            ..geometry()
        };
        assert!(matches!(g.validate(), Err(Error::InvalidGeometry(_))));
    }

    #[test]
    fn test_overflowing_window_rejected() {
        let g = MemoryGeometry {
            data_hex_address: 0xFFFF_FFF0,
            ..geometry()
        };
        assert!(matches!(g.validate(), Err(Error::InvalidGeometry(_))));
    }

    #[test]
    fn test_no_data_memory_is_valid() {
        let g = MemoryGeometry {
            data_hex_address: 0x2000,
            data_size: 0,
            ..geometry()
        };
        assert!(g.validate().is_ok());
    }
}
