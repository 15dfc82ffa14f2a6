//! --list and --list-supported

use pload_core::Error;

use crate::error::AppError;

use super::{Action, RunContext};

/// Print every connected bootloader and whether it holds an application
pub struct List;

impl Action for List {
    fn name(&self) -> &'static str {
        "--list"
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        // Some platforms allow only one open handle per device
        if ctx.session.is_open() {
            log::debug!("Closing the bootloader handle before listing");
            ctx.session.close();
        }

        let devices = ctx.session.device_list()?.to_vec();
        if devices.is_empty() {
            return Err(AppError::NoneListed {
                serial_number: ctx.session.serial_filter().map(str::to_string),
            });
        }

        for device in &devices {
            let status = match ctx.session.application_status(device) {
                Ok(true) => "App present",
                Ok(false) => "No app present",
                Err(AppError::Device(Error::OpenFailed { reason, .. })) => {
                    eprintln!("Warning: Unable to connect to bootloader: {}", reason);
                    "?"
                }
                Err(e) => {
                    eprintln!("Warning: Unable to check application: {}", e);
                    "?"
                }
            };
            println!("{:<11}  {:<40} {:<15}", device.serial_number, device.name, status);
        }

        Ok(())
    }
}

/// Print the name of every bootloader type this build can talk to
pub struct ListSupported;

impl Action for ListSupported {
    fn name(&self) -> &'static str {
        "--list-supported"
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        println!("Supported bootloaders:");
        for ty in ctx.session.catalog().supported_types() {
            println!("{}", ty.name);
        }
        Ok(())
    }
}
