//! Errors reported by the command-line tool and their exit codes

use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 0,
    BadArguments = 1,
    OperationFailed = 2,
    BootloaderNotFound = 3,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status as u8)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadArguments(String),

    #[error("{}", not_found_message(.serial_number))]
    NotFound { serial_number: Option<String> },

    /// `--list` found nothing. This is reported as information, not an error.
    #[error("{}", not_found_message(.serial_number))]
    NoneListed { serial_number: Option<String> },

    #[error(
        "There are multiple qualifying bootloaders connected to this computer.\n\
         Use the -d option to specify which bootloader you want to use, or disconnect\n\
         the others."
    )]
    Ambiguous { count: usize },

    #[error("{}: {}", .path.display(), .source)]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {}", .path.display(), .source)]
    Image {
        path: PathBuf,
        #[source]
        source: pload_core::Error,
    },

    #[error(transparent)]
    Device(#[from] pload_core::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error(
        "Failed to restart the device: {source}\n\
         The new code was written, but you may need to reset the device manually."
    )]
    Restart {
        #[source]
        source: pload_core::Error,
    },
}

fn not_found_message(serial_number: &Option<String>) -> String {
    match serial_number {
        Some(serial) => format!("No bootloader found with serial number '{}'.", serial),
        None => "No bootloader found.".to_string(),
    }
}

impl AppError {
    pub fn status(&self) -> Status {
        match self {
            AppError::BadArguments(_) => Status::BadArguments,
            AppError::NotFound { .. } | AppError::NoneListed { .. } => Status::BootloaderNotFound,
            AppError::Ambiguous { .. }
            | AppError::File { .. }
            | AppError::Image { .. }
            | AppError::Device(_)
            | AppError::Output(_)
            | AppError::Restart { .. } => Status::OperationFailed,
        }
    }

    /// Print the error once, on the stream that matches its kind
    pub fn report(&self) {
        match self {
            AppError::NoneListed { .. } => println!("{}", self),
            _ => eprintln!("Error: {}", self),
        }
    }
}
