//! Bootloader connection over nusb
//!
//! All requests are vendor control transfers addressed to the device.
//! Transfers block using `MaybeFuture::wait`.

use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{Interface, MaybeFuture};
use pload_core::bootloader::check_buffer_size;
use pload_core::error::{Error as CoreError, Result as CoreResult};
use pload_core::{Bootloader, BootloaderCatalog, BootloaderType, DeviceDescriptor, Progress};

use crate::error::{Result, UsbError};
use crate::protocol::*;

/// Timeout for a single control transfer
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Finds Pololu bootloaders on the USB bus
#[derive(Debug, Default, Clone, Copy)]
pub struct UsbCatalog;

impl BootloaderCatalog for UsbCatalog {
    fn supported_types(&self) -> &[BootloaderType] {
        BOOTLOADERS
    }

    fn discover(&self, serial_number: Option<&str>) -> CoreResult<Vec<DeviceDescriptor>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::ListFailed(e.to_string()))?;

        let mut found = Vec::new();
        for info in devices {
            let Some(ty) = find_type(info.vendor_id(), info.product_id()) else {
                continue;
            };
            let serial = info.serial_number().unwrap_or_default();
            if serial_number.is_some_and(|wanted| wanted != serial) {
                continue;
            }

            log::debug!(
                "Found {} ({:04X}:{:04X}) serial {} at bus {} address {}",
                ty.name,
                ty.vendor_id,
                ty.product_id,
                serial,
                info.bus_id(),
                info.device_address()
            );
            found.push(DeviceDescriptor::new(ty, serial));
        }

        Ok(found)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> CoreResult<Box<dyn Bootloader>> {
        Ok(Box::new(PololuBootloader::open(descriptor)?))
    }
}

/// An open connection to a Pololu USB bootloader
pub struct PololuBootloader {
    interface: Interface,
    ty: &'static BootloaderType,
    descriptor: DeviceDescriptor,
}

impl PololuBootloader {
    /// Open the bootloader described by `descriptor`
    ///
    /// The bus is enumerated again and the device is matched by USB IDs and
    /// serial number, since it may have been reconnected since discovery.
    pub fn open(descriptor: &DeviceDescriptor) -> Result<Self> {
        let ty = find_type(descriptor.vendor_id, descriptor.product_id)
            .ok_or_else(|| UsbError::DeviceGone(descriptor.serial_number.clone()))?;

        let info = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::ListFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == descriptor.vendor_id
                    && d.product_id() == descriptor.product_id
                    && d.serial_number().unwrap_or_default() == descriptor.serial_number
            })
            .ok_or_else(|| UsbError::DeviceGone(descriptor.serial_number.clone()))?;

        log::debug!(
            "Opening {} at bus {} address {}",
            descriptor,
            info.bus_id(),
            info.device_address()
        );

        let device = info.open().wait().map_err(|e| UsbError::OpenFailed {
            serial_number: descriptor.serial_number.clone(),
            reason: e.to_string(),
        })?;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| UsbError::ClaimFailed {
                serial_number: descriptor.serial_number.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            interface,
            ty,
            descriptor: descriptor.clone(),
        })
    }

    fn control_out(
        &self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> std::result::Result<(), TransferError> {
        log::trace!(
            "OUT request 0x{:02X} value 0x{:04X} index 0x{:04X} len {}",
            request,
            value,
            index,
            data.len()
        );
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
    }

    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> std::result::Result<Vec<u8>, TransferError> {
        log::trace!(
            "IN request 0x{:02X} value 0x{:04X} index 0x{:04X} len {}",
            request,
            value,
            index,
            length
        );
        self.interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    length,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
    }

    /// Read exactly `length` bytes
    fn read_exact(
        &self,
        request: u8,
        name: &'static str,
        address: u32,
        length: u16,
    ) -> CoreResult<Vec<u8>> {
        let (value, index) = split_address(address);
        let data = self
            .control_in(request, value, index, length)
            .map_err(|e| transfer_error(name, e))?;
        if data.len() != length as usize {
            return Err(UsbError::InvalidResponse {
                request: name,
                expected: length as usize,
                actual: data.len(),
            }
            .into());
        }
        Ok(data)
    }

    /// Turn a failed write into the most specific error available
    ///
    /// A STALL means the bootloader rejected the request, and it can then
    /// tell us why. Any other failure is reported as is.
    fn report_error(&self, err: TransferError, context: &'static str) -> CoreError {
        if !matches!(err, TransferError::Stall) {
            return transfer_error(context, err);
        }

        match self.control_in(REQUEST_GET_LAST_ERROR, 0, 0, 1) {
            Ok(code) if code.len() == 1 => CoreError::Bootloader {
                context,
                code: code[0],
            },
            _ => transfer_error(context, err),
        }
    }

    fn erase_program(&mut self, progress: &mut dyn Progress) -> CoreResult<()> {
        if let Some(code) = &self.ty.device_code {
            self.control_out(REQUEST_SET_DEVICE_CODE, 0, 0, code)
                .map_err(|e| transfer_error("Failed to set device code", e))?;
        }

        self.control_out(REQUEST_INITIALIZE, INITIALIZE_PROGRAMMING, 0, &[])
            .map_err(|e| transfer_error("Failed to initialize bootloader", e))?;

        let mut tracker = EraseProgress::default();
        loop {
            let response = self.read_exact(REQUEST_ERASE_FLASH, "Erase Flash", 0, 2)?;
            let (code, pages_left) = (response[0], response[1]);
            if code != 0 {
                return Err(CoreError::Bootloader {
                    context: "Error erasing page",
                    code,
                });
            }

            let (done, max) = tracker.update(pages_left);
            progress.update("Erasing flash...", done, max);
            log::trace!("Erase: {} pages left", pages_left);

            if pages_left == 0 {
                return Ok(());
            }
        }
    }

    fn check_data_access(&self) -> CoreResult<()> {
        if self.ty.geometry.data_size == 0 {
            return Err(CoreError::NotSupported("This device does not have EEPROM."));
        }
        if !self.ty.supports_data_access {
            return Err(CoreError::NotSupported(
                "This bootloader does not support accessing EEPROM.",
            ));
        }
        Ok(())
    }
}

impl Bootloader for PololuBootloader {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn write_program(&mut self, image: &[u8], progress: &mut dyn Progress) -> CoreResult<()> {
        let g = self.ty.geometry;
        check_buffer_size(image, g.program_size)?;

        self.erase_program(progress)?;

        let block_size = self.ty.write_block_size as u32;
        let mut address = g.program_address + g.program_size;
        while address > g.program_address {
            address -= block_size;
            let offset = (address - g.program_address) as usize;
            let block = &image[offset..offset + block_size as usize];

            if is_blank(block) {
                continue;
            }

            let (value, index) = split_address(address);
            self.control_out(REQUEST_WRITE_FLASH_BLOCK, value, index, block)
                .map_err(|e| self.report_error(e, "Failed to write flash"))?;

            progress.update(
                "Writing flash...",
                g.program_size - (address - g.program_address),
                g.program_size,
            );
        }

        log::debug!("Wrote program memory of {}", self.descriptor);
        Ok(())
    }

    fn read_program(&mut self, image: &mut [u8], progress: &mut dyn Progress) -> CoreResult<()> {
        if !self.ty.supports_reading_program {
            return Err(CoreError::NotSupported(
                "This bootloader does not support reading flash memory.",
            ));
        }
        let g = self.ty.geometry;
        check_buffer_size(image, g.program_size)?;

        let mut offset = 0u32;
        while offset < g.program_size {
            let len = READ_FLASH_BLOCK_SIZE.min(g.program_size - offset);
            let data = self.read_exact(
                REQUEST_READ_FLASH,
                "Read Flash",
                g.program_address + offset,
                len as u16,
            )?;
            image[offset as usize..(offset + len) as usize].copy_from_slice(&data);
            offset += len;
            progress.update("Reading flash...", offset, g.program_size);
        }
        Ok(())
    }

    fn write_data(&mut self, image: &[u8], progress: &mut dyn Progress) -> CoreResult<()> {
        self.check_data_access()?;
        let g = self.ty.geometry;
        check_buffer_size(image, g.data_size)?;

        let status = if is_blank(image) {
            "Erasing EEPROM..."
        } else {
            "Writing EEPROM..."
        };

        let mut offset = 0u32;
        while offset < g.data_size {
            let len = EEPROM_BLOCK_SIZE.min(g.data_size - offset);
            let block = &image[offset as usize..(offset + len) as usize];
            let (value, index) = split_address(g.data_address + offset);
            self.control_out(REQUEST_WRITE_EEPROM, value, index, block)
                .map_err(|e| self.report_error(e, "Failed to write EEPROM"))?;
            offset += len;
            progress.update(status, offset, g.data_size);
        }
        Ok(())
    }

    fn read_data(&mut self, image: &mut [u8], progress: &mut dyn Progress) -> CoreResult<()> {
        self.check_data_access()?;
        let g = self.ty.geometry;
        check_buffer_size(image, g.data_size)?;

        let mut offset = 0u32;
        while offset < g.data_size {
            let len = EEPROM_BLOCK_SIZE.min(g.data_size - offset);
            let data = self.read_exact(
                REQUEST_READ_EEPROM,
                "Read EEPROM",
                g.data_address + offset,
                len as u16,
            )?;
            image[offset as usize..(offset + len) as usize].copy_from_slice(&data);
            offset += len;
            progress.update("Reading EEPROM...", offset, g.data_size);
        }
        Ok(())
    }

    fn check_application(&mut self) -> CoreResult<bool> {
        let response = self.read_exact(REQUEST_CHECK_APPLICATION, "Check Application", 0, 1)?;
        Ok(response[0] != 0)
    }

    fn restart(&mut self) -> CoreResult<()> {
        self.control_out(REQUEST_RESTART, RESTART_DELAY_MS, 0, &[])
            .map_err(|e| transfer_error("Failed to restart device", e))?;
        log::debug!("Restart requested for {}", self.descriptor);
        Ok(())
    }
}

fn transfer_error(context: &'static str, err: TransferError) -> CoreError {
    UsbError::TransferFailed {
        context,
        reason: err.to_string(),
    }
    .into()
}
