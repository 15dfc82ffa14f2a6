//! Pololu bootloader protocol constants and supported device table

use pload_core::{BootloaderType, MemoryGeometry};

// Vendor request codes
pub const REQUEST_INITIALIZE: u8 = 0x80;
pub const REQUEST_ERASE_FLASH: u8 = 0x81;
pub const REQUEST_WRITE_FLASH_BLOCK: u8 = 0x82;
pub const REQUEST_GET_LAST_ERROR: u8 = 0x83;
pub const REQUEST_CHECK_APPLICATION: u8 = 0x84;
pub const REQUEST_READ_FLASH: u8 = 0x86;
pub const REQUEST_SET_DEVICE_CODE: u8 = 0x87;
pub const REQUEST_READ_EEPROM: u8 = 0x88;
pub const REQUEST_WRITE_EEPROM: u8 = 0x89;
pub const REQUEST_RESTART: u8 = 0xFE;

/// `wValue` of the INITIALIZE request that prepares for programming
pub const INITIALIZE_PROGRAMMING: u16 = 2;

/// How long the device waits before restarting, in milliseconds
pub const RESTART_DELAY_MS: u16 = 500;

/// Bytes per READ_FLASH request
pub const READ_FLASH_BLOCK_SIZE: u32 = 1024;

/// Bytes per READ_EEPROM / WRITE_EEPROM request
pub const EEPROM_BLOCK_SIZE: u32 = 32;

/// Bootloaders this crate can talk to
pub static BOOTLOADERS: &[BootloaderType] = &[BootloaderType {
    name: "Pololu P-Star 25K50 Bootloader",
    vendor_id: 0x1FFB,
    product_id: 0x0102,
    geometry: MemoryGeometry {
        program_address: 0x2000,
        program_size: 0x6000,
        data_address: 0,
        data_hex_address: 0xF0_0000,
        data_size: 0x100,
    },
    write_block_size: 0x40,
    supports_reading_program: true,
    supports_data_access: true,
    device_code: None,
}];

/// Look up a bootloader type by USB IDs
pub fn find_type(vendor_id: u16, product_id: u16) -> Option<&'static BootloaderType> {
    BOOTLOADERS
        .iter()
        .find(|t| t.vendor_id == vendor_id && t.product_id == product_id)
}

/// Split an address into the `wValue` and `wIndex` fields of a request
pub fn split_address(address: u32) -> (u16, u16) {
    (address as u16, (address >> 16) as u16)
}

/// Whether a block only contains erased bytes
pub fn is_blank(block: &[u8]) -> bool {
    block.iter().all(|&b| b == pload_core::image::ERASED)
}

/// Tracks erase progress from the "pages left" counter the device reports
///
/// The device does not say how many pages there are in total, so the first
/// response is taken as the total and the total only grows when the device
/// reports more pages left than seen so far.
#[derive(Debug, Default, Clone, Copy)]
pub struct EraseProgress {
    max: u32,
}

impl EraseProgress {
    /// Record a response and return `(progress, max_progress)`
    pub fn update(&mut self, pages_left: u8) -> (u32, u32) {
        let left = pages_left as u32;
        if self.max < left {
            self.max = left + 1;
        }
        (self.max - left, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_pstar() {
        let t = find_type(0x1FFB, 0x0102).unwrap();
        assert_eq!(t.name, "Pololu P-Star 25K50 Bootloader");
        assert!(t.geometry.validate().is_ok());
        assert!(find_type(0x1FFB, 0x0101).is_none());
    }

    #[test]
    fn test_block_sizes_divide_memories() {
        for t in BOOTLOADERS {
            let g = &t.geometry;
            assert_eq!(g.program_size % t.write_block_size as u32, 0);
            assert_eq!(g.program_address % t.write_block_size as u32, 0);
            if t.supports_reading_program {
                assert_eq!(g.program_size % READ_FLASH_BLOCK_SIZE, 0);
            }
            if t.supports_data_access {
                assert_eq!(g.data_size % EEPROM_BLOCK_SIZE, 0);
            }
        }
    }

    #[test]
    fn test_split_address() {
        assert_eq!(split_address(0x0012_3456), (0x3456, 0x0012));
        assert_eq!(split_address(0x2000), (0x2000, 0));
    }

    #[test]
    fn test_erase_progress() {
        let mut p = EraseProgress::default();
        assert_eq!(p.update(3), (1, 4));
        assert_eq!(p.update(2), (2, 4));
        assert_eq!(p.update(0), (4, 4));
    }

    #[test]
    fn test_erase_progress_single_response() {
        let mut p = EraseProgress::default();
        assert_eq!(p.update(0), (0, 0));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&[0xFF; 64]));
        assert!(!is_blank(&[0xFF, 0x00]));
    }
}
