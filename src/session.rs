//! Connection to the selected bootloader
//!
//! The session discovers devices lazily, caches the device list and opens at
//! most one handle. A handle is only opened when the (filtered) device list
//! has exactly one entry.

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use pload_core::{Bootloader, BootloaderCatalog, DeviceDescriptor};

use crate::error::AppError;

pub struct DeviceSession {
    catalog: Box<dyn BootloaderCatalog>,
    serial_filter: Option<String>,
    devices: Option<Vec<DeviceDescriptor>>,
    handle: Option<Box<dyn Bootloader>>,
    used: bool,
    /// Receives the name and serial number of the opened bootloader
    out: Box<dyn Write>,
}

impl DeviceSession {
    pub fn new(catalog: Box<dyn BootloaderCatalog>) -> Self {
        Self::with_output(catalog, Box::new(io::stdout()))
    }

    /// Create a session that reports the opened bootloader to `out`
    pub fn with_output(catalog: Box<dyn BootloaderCatalog>, out: Box<dyn Write>) -> Self {
        Self {
            catalog,
            serial_filter: None,
            devices: None,
            handle: None,
            used: false,
            out,
        }
    }

    pub fn catalog(&self) -> &dyn BootloaderCatalog {
        self.catalog.as_ref()
    }

    pub fn serial_filter(&self) -> Option<&str> {
        self.serial_filter.as_deref()
    }

    /// Restrict the session to the bootloader with this serial number
    ///
    /// Allowed once, before the device list is first built.
    pub fn set_serial_filter(&mut self, serial_number: &str) -> Result<(), AppError> {
        if self.serial_filter.is_some() {
            return Err(AppError::BadArguments(
                "Serial number can only be specified once.".into(),
            ));
        }
        if self.used {
            return Err(AppError::BadArguments(
                "Serial number must be specified before the bootloader is used.".into(),
            ));
        }
        self.serial_filter = Some(serial_number.to_string());
        Ok(())
    }

    /// The cached device list, discovered on first use
    pub fn device_list(&mut self) -> Result<&[DeviceDescriptor], AppError> {
        let devices = match self.devices.take() {
            Some(devices) => devices,
            None => self.discover()?,
        };
        let devices = self.devices.insert(devices);
        Ok(devices.as_slice())
    }

    /// Discard the cached device list and discover a new one
    pub fn refresh_device_list(&mut self) -> Result<&[DeviceDescriptor], AppError> {
        self.devices = None;
        self.device_list()
    }

    fn discover(&mut self) -> Result<Vec<DeviceDescriptor>, AppError> {
        self.used = true;
        let devices = self.catalog.discover(self.serial_filter.as_deref())?;
        log::debug!("Discovered {} bootloader(s)", devices.len());
        Ok(devices)
    }

    /// Error describing that no bootloader matched
    pub fn not_found(&self) -> AppError {
        AppError::NotFound {
            serial_number: self.serial_filter.clone(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// The open bootloader, opening it if necessary
    ///
    /// Prints the name and serial number of the bootloader when it is
    /// opened.
    pub fn require(&mut self) -> Result<&mut dyn Bootloader, AppError> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => self.open_single()?,
        };
        Ok(&mut **self.handle.insert(handle))
    }

    fn open_single(&mut self) -> Result<Box<dyn Bootloader>, AppError> {
        let devices = self.device_list()?.to_vec();
        let descriptor = match devices.as_slice() {
            [] => return Err(self.not_found()),
            [one] => one,
            many => return Err(AppError::Ambiguous { count: many.len() }),
        };

        let handle = self.catalog.open(descriptor)?;
        let opened = handle.descriptor();
        writeln!(self.out, "Bootloader:    {}", opened.name)?;
        writeln!(self.out, "Serial number: {}", opened.serial_number)?;
        Ok(handle)
    }

    /// Close the open handle, if any
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("Closing {}", handle.descriptor());
        }
    }

    /// Ask a bootloader whether it holds a valid application
    ///
    /// Uses the session handle when it is open to the same device, and a
    /// short-lived handle otherwise.
    pub fn application_status(&mut self, descriptor: &DeviceDescriptor) -> Result<bool, AppError> {
        if let Some(handle) = self.handle.as_mut() {
            if handle.descriptor() == descriptor {
                return Ok(handle.check_application()?);
            }
        }

        let mut handle = self.catalog.open(descriptor)?;
        Ok(handle.check_application()?)
    }
}

/// Polls for a bootloader to appear
#[derive(Debug, Clone, Copy)]
pub struct WaitPoller {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPoller {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(100),
        }
    }
}

impl WaitPoller {
    /// Wait until at least one bootloader matches the session filter
    pub fn wait(&self, session: &mut DeviceSession) -> Result<(), AppError> {
        let start = Instant::now();
        loop {
            if !session.refresh_device_list()?.is_empty() {
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(session.not_found());
            }
            thread::sleep(self.interval);
        }
    }
}
