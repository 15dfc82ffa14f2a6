//! pload-dummy - In-memory bootloader emulator for testing
//!
//! This crate provides a [`BootloaderCatalog`] whose devices live in memory.
//! It's useful for testing the command pipeline without real hardware.
//!
//! A catalog is cheap to clone; clones share the same devices, so a test can
//! hand one clone to the code under test and inspect the other afterwards.

use std::cell::RefCell;
use std::rc::Rc;

use pload_core::bootloader::check_buffer_size;
use pload_core::error::{Error, Result};
use pload_core::image::ERASED;
use pload_core::{
    Bootloader, BootloaderCatalog, BootloaderType, DeviceDescriptor, MemoryGeometry, Progress,
};

/// Bootloader type used by [`DummyDevice::new`]
pub const DUMMY_TYPE: BootloaderType = BootloaderType {
    name: "Dummy Bootloader",
    vendor_id: 0x1FFB,
    product_id: 0xFFFF,
    geometry: MemoryGeometry {
        program_address: 0x2000,
        program_size: 0x400,
        data_address: 0,
        data_hex_address: 0xF0_0000,
        data_size: 0x40,
    },
    write_block_size: 0x40,
    supports_reading_program: true,
    supports_data_access: true,
    device_code: None,
};

/// Something that happened to the emulated devices, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The catalog was asked for a device list
    Discover,
    /// A device was opened
    Open(String),
    /// A handle was dropped
    Close(String),
    /// Program memory was erased and written
    WriteProgram(String),
    /// Program memory was read
    ReadProgram(String),
    /// Data memory was written
    WriteData(String),
    /// Data memory was read
    ReadData(String),
    /// The application status was queried
    CheckApplication(String),
    /// A restart was requested
    Restart(String),
}

/// An emulated bootloader
#[derive(Debug, Clone)]
pub struct DummyDevice {
    ty: BootloaderType,
    serial_number: String,
    program: Vec<u8>,
    data: Vec<u8>,
    appears_after: usize,
    fail_restart: bool,
    fail_check: bool,
    is_open: bool,
    restarts: usize,
}

impl DummyDevice {
    /// Create an erased device of type [`DUMMY_TYPE`]
    pub fn new(serial_number: &str) -> Self {
        Self::with_type(DUMMY_TYPE, serial_number)
    }

    /// Create an erased device of the given type
    pub fn with_type(ty: BootloaderType, serial_number: &str) -> Self {
        Self {
            program: vec![ERASED; ty.geometry.program_size as usize],
            data: vec![ERASED; ty.geometry.data_size as usize],
            ty,
            serial_number: serial_number.to_string(),
            appears_after: 0,
            fail_restart: false,
            fail_check: false,
            is_open: false,
            restarts: 0,
        }
    }

    /// Pre-fill program memory
    pub fn with_program(mut self, contents: &[u8]) -> Self {
        let len = contents.len().min(self.program.len());
        self.program[..len].copy_from_slice(&contents[..len]);
        self
    }

    /// Pre-fill data memory
    pub fn with_data(mut self, contents: &[u8]) -> Self {
        let len = contents.len().min(self.data.len());
        self.data[..len].copy_from_slice(&contents[..len]);
        self
    }

    /// Hide the device from the first `discoveries` device lists
    pub fn appearing_after(mut self, discoveries: usize) -> Self {
        self.appears_after = discoveries;
        self
    }

    /// Make restart requests fail
    pub fn failing_restart(mut self) -> Self {
        self.fail_restart = true;
        self
    }

    /// Make application status queries fail
    pub fn failing_check(mut self) -> Self {
        self.fail_check = true;
        self
    }

    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor::new(&self.ty, self.serial_number.clone())
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    devices: Vec<DummyDevice>,
    discoveries: usize,
    opens: usize,
    events: Vec<Event>,
}

impl CatalogState {
    fn device(&mut self, serial_number: &str) -> Result<&mut DummyDevice> {
        self.devices
            .iter_mut()
            .find(|d| d.serial_number == serial_number)
            .ok_or_else(|| Error::OpenFailed {
                serial_number: serial_number.to_string(),
                reason: "device is no longer connected".into(),
            })
    }
}

/// Catalog of emulated bootloaders
#[derive(Debug, Clone)]
pub struct DummyCatalog {
    types: Vec<BootloaderType>,
    state: Rc<RefCell<CatalogState>>,
}

impl Default for DummyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyCatalog {
    /// Create a catalog with no devices connected
    pub fn new() -> Self {
        Self {
            types: vec![DUMMY_TYPE],
            state: Rc::default(),
        }
    }

    /// Connect a device
    pub fn add(&self, device: DummyDevice) -> &Self {
        self.state.borrow_mut().devices.push(device);
        self
    }

    /// Program memory contents of a device
    pub fn program(&self, serial_number: &str) -> Vec<u8> {
        self.with_device(serial_number, |d| d.program.clone())
    }

    /// Data memory contents of a device
    pub fn data(&self, serial_number: &str) -> Vec<u8> {
        self.with_device(serial_number, |d| d.data.clone())
    }

    /// Number of restarts a device received
    pub fn restarts(&self, serial_number: &str) -> usize {
        self.with_device(serial_number, |d| d.restarts)
    }

    /// Whether a handle to the device is currently open
    pub fn is_open(&self, serial_number: &str) -> bool {
        self.with_device(serial_number, |d| d.is_open)
    }

    /// Number of device lists built so far
    pub fn discoveries(&self) -> usize {
        self.state.borrow().discoveries
    }

    /// Number of successful opens so far
    pub fn opens(&self) -> usize {
        self.state.borrow().opens
    }

    /// Everything that happened so far
    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    fn with_device<T>(&self, serial_number: &str, f: impl FnOnce(&DummyDevice) -> T) -> T {
        let state = self.state.borrow();
        match state.devices.iter().find(|d| d.serial_number == serial_number) {
            Some(device) => f(device),
            None => panic!("no dummy device with serial number {}", serial_number),
        }
    }
}

impl BootloaderCatalog for DummyCatalog {
    fn supported_types(&self) -> &[BootloaderType] {
        &self.types
    }

    fn discover(&self, serial_number: Option<&str>) -> Result<Vec<DeviceDescriptor>> {
        let mut state = self.state.borrow_mut();
        state.discoveries += 1;
        state.events.push(Event::Discover);

        let discoveries = state.discoveries;
        let found = state
            .devices
            .iter()
            .filter(|d| discoveries > d.appears_after)
            .filter(|d| serial_number.map_or(true, |s| s == d.serial_number))
            .map(DummyDevice::descriptor)
            .collect::<Vec<_>>();

        log::debug!("Dummy discovery {} found {} device(s)", discoveries, found.len());
        Ok(found)
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Bootloader>> {
        let mut state = self.state.borrow_mut();
        let serial_number = descriptor.serial_number.clone();

        let device = state.device(&serial_number)?;
        if device.is_open {
            return Err(Error::OpenFailed {
                serial_number,
                reason: "device is already open".into(),
            });
        }
        device.is_open = true;
        let descriptor = device.descriptor();

        state.opens += 1;
        state.events.push(Event::Open(serial_number));

        Ok(Box::new(DummyBootloader {
            descriptor,
            state: Rc::clone(&self.state),
        }))
    }
}

/// Open handle to an emulated bootloader
pub struct DummyBootloader {
    descriptor: DeviceDescriptor,
    state: Rc<RefCell<CatalogState>>,
}

impl DummyBootloader {
    fn serial(&self) -> String {
        self.descriptor.serial_number.clone()
    }

    fn with_device<T>(
        &self,
        event: Event,
        f: impl FnOnce(&mut DummyDevice) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.borrow_mut();
        state.events.push(event);
        let device = state.device(&self.descriptor.serial_number)?;
        f(device)
    }
}

impl Drop for DummyBootloader {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        let serial = self.descriptor.serial_number.clone();
        if let Ok(device) = state.device(&serial) {
            device.is_open = false;
        }
        state.events.push(Event::Close(serial));
    }
}

fn check_data_access(device: &DummyDevice) -> Result<()> {
    if device.ty.geometry.data_size == 0 {
        return Err(Error::NotSupported("This device does not have EEPROM."));
    }
    if !device.ty.supports_data_access {
        return Err(Error::NotSupported(
            "This bootloader does not support accessing EEPROM.",
        ));
    }
    Ok(())
}

impl Bootloader for DummyBootloader {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn write_program(&mut self, image: &[u8], progress: &mut dyn Progress) -> Result<()> {
        self.with_device(Event::WriteProgram(self.serial()), |device| {
            check_buffer_size(image, device.ty.geometry.program_size)?;

            device.program.fill(ERASED);
            progress.update("Erasing flash...", 1, 1);

            let size = image.len() as u32;
            let block = device.ty.write_block_size as usize;
            for (i, chunk) in image.chunks(block).enumerate().rev() {
                if chunk.iter().all(|&b| b == ERASED) {
                    continue;
                }
                let offset = i * block;
                device.program[offset..offset + chunk.len()].copy_from_slice(chunk);
                progress.update("Writing flash...", size - offset as u32, size);
            }
            Ok(())
        })
    }

    fn read_program(&mut self, image: &mut [u8], progress: &mut dyn Progress) -> Result<()> {
        self.with_device(Event::ReadProgram(self.serial()), |device| {
            if !device.ty.supports_reading_program {
                return Err(Error::NotSupported(
                    "This bootloader does not support reading flash memory.",
                ));
            }
            check_buffer_size(image, device.ty.geometry.program_size)?;
            image.copy_from_slice(&device.program);
            progress.update("Reading flash...", image.len() as u32, image.len() as u32);
            Ok(())
        })
    }

    fn write_data(&mut self, image: &[u8], progress: &mut dyn Progress) -> Result<()> {
        self.with_device(Event::WriteData(self.serial()), |device| {
            check_data_access(device)?;
            check_buffer_size(image, device.ty.geometry.data_size)?;
            let status = if image.iter().all(|&b| b == ERASED) {
                "Erasing EEPROM..."
            } else {
                "Writing EEPROM..."
            };
            device.data.copy_from_slice(image);
            progress.update(status, image.len() as u32, image.len() as u32);
            Ok(())
        })
    }

    fn read_data(&mut self, image: &mut [u8], progress: &mut dyn Progress) -> Result<()> {
        self.with_device(Event::ReadData(self.serial()), |device| {
            check_data_access(device)?;
            check_buffer_size(image, device.ty.geometry.data_size)?;
            image.copy_from_slice(&device.data);
            progress.update("Reading EEPROM...", image.len() as u32, image.len() as u32);
            Ok(())
        })
    }

    fn check_application(&mut self) -> Result<bool> {
        self.with_device(Event::CheckApplication(self.serial()), |device| {
            if device.fail_check {
                return Err(Error::Transfer("check application request failed".into()));
            }
            Ok(device.program.iter().any(|&b| b != ERASED))
        })
    }

    fn restart(&mut self) -> Result<()> {
        self.with_device(Event::Restart(self.serial()), |device| {
            if device.fail_restart {
                return Err(Error::Transfer("restart request failed".into()));
            }
            device.restarts += 1;
            Ok(())
        })
    }
}
