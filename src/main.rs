//! p-load - Pololu USB bootloader utility
//!
//! Writes, reads and erases the flash and EEPROM of devices running a Pololu
//! USB bootloader, lists connected bootloaders and restarts devices into
//! their application.
//!
//! # Architecture
//!
//! Every action flag becomes an [`commands::Action`] in an
//! [`commands::ActionQueue`], in command-line order. A run then waits for a
//! bootloader if asked to, prepares every action (loading hex files and
//! creating output files), executes every action against the single
//! selected bootloader, restarts the device if asked to, and finally
//! releases every action. Device access goes through
//! [`pload_core::BootloaderCatalog`], implemented over USB by `pload-usb`.

mod app;
mod cli;
mod commands;
mod error;
mod progress;
mod session;

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::CommandFactory;
use cli::{Cli, Invocation};
use commands::RunContext;
use error::Status;
use progress::IndicatifProgress;
use session::DeviceSession;

fn main() -> ExitCode {
    let invocation = match parse_args() {
        Ok(invocation) => invocation,
        Err(e) => {
            let _ = e.print();
            return parse_status(&e).into();
        }
    };

    // Initialize logger, -v/-vv raise the default level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(invocation.verbose)),
    )
    .init();

    let session = DeviceSession::new(Box::new(pload_usb::UsbCatalog));
    let mut ctx = RunContext::new(session, Box::new(IndicatifProgress::new()));

    match app::run(&invocation, &mut ctx) {
        Ok(()) => Status::Success.into(),
        Err(e) => {
            e.report();
            e.status().into()
        }
    }
}

/// Exit status after clap stopped parsing
fn parse_status(e: &clap::Error) -> Status {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Status::Success,
        _ => Status::BadArguments,
    }
}

/// Default log filter for a verbosity count
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn parse_args() -> Result<Invocation, clap::Error> {
    let matches = Cli::command().try_get_matches()?;
    Invocation::from_matches(&matches)
}
