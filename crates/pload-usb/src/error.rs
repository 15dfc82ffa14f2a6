//! Error types for the USB transport

use std::fmt;

use pload_core::Error as CoreError;

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur when talking to a bootloader over USB
#[derive(Debug)]
pub enum UsbError {
    /// The list of USB devices could not be read
    ListFailed(String),
    /// The device is no longer connected
    DeviceGone(String),
    /// Failed to open the device
    OpenFailed {
        /// Serial number of the device
        serial_number: String,
        /// Reason reported by the USB stack
        reason: String,
    },
    /// Failed to claim the bootloader interface
    ClaimFailed {
        /// Serial number of the device
        serial_number: String,
        /// Reason reported by the USB stack
        reason: String,
    },
    /// A control transfer failed
    TransferFailed {
        /// What we were doing
        context: &'static str,
        /// Reason reported by the USB stack
        reason: String,
    },
    /// The device answered with an unexpected number of bytes
    InvalidResponse {
        /// Name of the request
        request: &'static str,
        /// Expected length
        expected: usize,
        /// Received length
        actual: usize,
    },
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::ListFailed(msg) => write!(f, "Failed to list USB devices: {}", msg),
            UsbError::DeviceGone(serial) => {
                write!(f, "Bootloader {} is no longer connected", serial)
            }
            UsbError::OpenFailed {
                serial_number,
                reason,
            } => write!(f, "Failed to open bootloader {}: {}", serial_number, reason),
            UsbError::ClaimFailed {
                serial_number,
                reason,
            } => write!(
                f,
                "Failed to claim interface of bootloader {}: {}",
                serial_number, reason
            ),
            UsbError::TransferFailed { context, reason } => write!(f, "{}: {}", context, reason),
            UsbError::InvalidResponse {
                request,
                expected,
                actual,
            } => write!(
                f,
                "Expected {}-byte response to {} request, got {}",
                expected, request, actual
            ),
        }
    }
}

impl std::error::Error for UsbError {}

impl From<UsbError> for CoreError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::OpenFailed {
                serial_number,
                reason,
            }
            | UsbError::ClaimFailed {
                serial_number,
                reason,
            } => CoreError::OpenFailed {
                serial_number,
                reason,
            },
            UsbError::DeviceGone(serial_number) => CoreError::OpenFailed {
                serial_number,
                reason: "device is no longer connected".into(),
            },
            UsbError::InvalidResponse {
                request,
                expected,
                actual,
            } => CoreError::ShortTransfer {
                operation: request,
                expected,
                actual,
            },
            other => CoreError::Transfer(other.to_string()),
        }
    }
}
