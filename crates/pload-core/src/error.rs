//! Error types for pload-core

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by bootloaders, the hex codec and the memory image mapper
#[derive(Debug, Error)]
pub enum Error {
    /// The bootloader rejected a request and reported an error code
    #[error("{context}: {}", describe(.code))]
    Bootloader {
        /// What we were doing when the error was reported
        context: &'static str,
        /// Error code returned by the bootloader
        code: u8,
    },

    /// The device does not support the requested operation
    #[error("{0}")]
    NotSupported(&'static str),

    /// A USB transfer failed
    #[error("USB transfer failed: {0}")]
    Transfer(String),

    /// The device transferred a different number of bytes than requested
    #[error("{operation}: expected {expected} bytes but {actual} were transferred")]
    ShortTransfer {
        /// Name of the request
        operation: &'static str,
        /// Requested length
        expected: usize,
        /// Length actually transferred
        actual: usize,
    },

    /// The device that was discovered could not be opened
    #[error("Failed to open bootloader {serial_number}: {reason}")]
    OpenFailed {
        /// Serial number of the device
        serial_number: String,
        /// Transport-level reason
        reason: String,
    },

    /// A buffer passed to a device operation has the wrong size
    #[error("Image is {actual} bytes but the memory region is {expected} bytes")]
    BufferSize {
        /// Size of the memory region
        expected: usize,
        /// Size of the buffer that was passed
        actual: usize,
    },

    /// The memory geometry reported by a device cannot be mapped to a hex file
    #[error("Invalid memory geometry: {0}")]
    InvalidGeometry(String),

    /// A line of a hex file could not be parsed
    #[error("line {line}: {message}")]
    HexSyntax {
        /// 1-based line number
        line: usize,
        /// Parser message
        message: String,
    },

    /// The hex file ended without an End Of File record
    #[error("line {line}: Unexpected end of file: expected hex file to contain an End of File record")]
    MissingEof {
        /// Line number after the last line of the file
        line: usize,
    },

    /// A hex file could not be produced
    #[error("Failed to encode hex file: {0}")]
    HexEncode(String),

    /// A hex record targets memory the device does not have
    #[error(
        "line {line}: Record at address 0x{address:06X} ({len} bytes) is outside of the device's memory"
    )]
    Mapping {
        /// 1-based line number of the record
        line: usize,
        /// Absolute hex-file address of the record
        address: u32,
        /// Number of data bytes in the record
        len: usize,
    },

    /// A memory image was built for a different device than the one connected
    #[error("Memory image was prepared for bootloader {expected} but bootloader {actual} is connected")]
    DeviceMismatch {
        /// Serial number the image was built for
        expected: String,
        /// Serial number of the connected device
        actual: String,
    },
}

/// Human-readable description of an error code reported by the bootloader
///
/// These codes come from the 2-byte erase response and from the
/// GET_LAST_ERROR request.
pub fn describe_bootloader_error(code: u8) -> &'static str {
    match code {
        0 => "Success.",
        1 => "Device is not in the correct state.",
        2 => "Invalid data length.",
        3 => "Programming error.",
        4 => "Write protection error.",
        5 => "Verification error.",
        6 => "Address is not in the correct range.",
        7 => "Address was not accessed in the correct order.",
        8 => "Address does not have the correct alignment.",
        9 => "Write error.",
        10 => "EEPROM verification error.",
        _ => "Unknown error.",
    }
}

fn describe(code: &u8) -> &'static str {
    describe_bootloader_error(*code)
}
