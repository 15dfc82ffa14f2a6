//! CLI argument parsing
//!
//! Actions run in the order their flags appear on the command line. Clap
//! groups values by argument, so the order is recovered from the argument
//! indices after parsing. Bare action flags are declared as appending
//! flags that take no value so that every occurrence keeps its index.

use clap::{ArgMatches, FromArgMatches, Parser};
use std::path::PathBuf;

const EXAMPLES: &str = "\
HEXFILE is the name of the .HEX file to be used.

Example: p-load -w app.hex
Example: p-load -d 12345678 --wait --write-flash app.hex --restart
Example: p-load --erase";

#[derive(Parser, Debug)]
#[command(name = "p-load")]
#[command(version, about = "p-load: Pololu USB Bootloader Utility", long_about = None)]
#[command(arg_required_else_help = true, after_help = EXAMPLES)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Specifies the serial number of the bootloader
    #[arg(short = 'd', value_name = "SERIALNUMBER", action = clap::ArgAction::Append)]
    pub serial_number: Vec<String>,

    /// Lists bootloaders connected to computer
    #[arg(long, num_args = 0, default_missing_value = "true", action = clap::ArgAction::Append)]
    pub list: Vec<bool>,

    /// Lists all types of bootloaders supported
    #[arg(long, num_args = 0, default_missing_value = "true", action = clap::ArgAction::Append)]
    pub list_supported: Vec<bool>,

    /// Waits up to 10 seconds for bootloader to appear
    #[arg(long)]
    pub wait: bool,

    /// Writes to flash and EEPROM, then restarts
    #[arg(short = 'w', value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub write_and_restart: Vec<PathBuf>,

    /// Writes to flash and EEPROM
    #[arg(long, value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub write: Vec<PathBuf>,

    /// Writes to flash
    #[arg(long, value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub write_flash: Vec<PathBuf>,

    /// Writes to EEPROM
    #[arg(long, value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub write_eeprom: Vec<PathBuf>,

    /// Erases flash and EEPROM
    #[arg(long, num_args = 0, default_missing_value = "true", action = clap::ArgAction::Append)]
    pub erase: Vec<bool>,

    /// Erases flash
    #[arg(long, num_args = 0, default_missing_value = "true", action = clap::ArgAction::Append)]
    pub erase_flash: Vec<bool>,

    /// Erases EEPROM
    #[arg(long, num_args = 0, default_missing_value = "true", action = clap::ArgAction::Append)]
    pub erase_eeprom: Vec<bool>,

    /// Reads flash and EEPROM and saves to file
    #[arg(long, value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub read: Vec<PathBuf>,

    /// Reads flash and saves to file
    #[arg(long, value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub read_flash: Vec<PathBuf>,

    /// Reads EEPROM and saves to file
    #[arg(long, value_name = "HEXFILE", action = clap::ArgAction::Append)]
    pub read_eeprom: Vec<PathBuf>,

    /// Restarts the device so it can run the new code
    #[arg(long)]
    pub restart: bool,
}

/// One kind of action that can be queued from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    List,
    ListSupported,
    WriteProgramAndData,
    WriteProgram,
    WriteData,
    EraseProgramAndData,
    EraseProgram,
    EraseData,
    ReadProgramAndData,
    ReadProgram,
    ReadData,
}

impl ActionKind {
    /// Command-line flag that queues this action
    pub fn flag(self) -> &'static str {
        match self {
            ActionKind::List => "--list",
            ActionKind::ListSupported => "--list-supported",
            ActionKind::WriteProgramAndData => "--write",
            ActionKind::WriteProgram => "--write-flash",
            ActionKind::WriteData => "--write-eeprom",
            ActionKind::EraseProgramAndData => "--erase",
            ActionKind::EraseProgram => "--erase-flash",
            ActionKind::EraseData => "--erase-eeprom",
            ActionKind::ReadProgramAndData => "--read",
            ActionKind::ReadProgram => "--read-flash",
            ActionKind::ReadData => "--read-eeprom",
        }
    }
}

/// Bare flags: argument id and the action each occurrence queues
const FLAG_ACTIONS: &[(&str, ActionKind)] = &[
    ("list", ActionKind::List),
    ("list_supported", ActionKind::ListSupported),
    ("erase", ActionKind::EraseProgramAndData),
    ("erase_flash", ActionKind::EraseProgram),
    ("erase_eeprom", ActionKind::EraseData),
];

/// Options taking a file name
const FILE_ACTIONS: &[(&str, ActionKind)] = &[
    ("write_and_restart", ActionKind::WriteProgramAndData),
    ("write", ActionKind::WriteProgramAndData),
    ("write_flash", ActionKind::WriteProgram),
    ("write_eeprom", ActionKind::WriteData),
    ("read", ActionKind::ReadProgramAndData),
    ("read_flash", ActionKind::ReadProgram),
    ("read_eeprom", ActionKind::ReadData),
];

/// An action requested on the command line, with its file argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub argument: Option<PathBuf>,
}

/// Everything the command line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub verbose: u8,
    /// Every `-d` value, in order
    pub serial_numbers: Vec<String>,
    pub wait: bool,
    pub restart: bool,
    /// Actions in command-line order
    pub requests: Vec<ActionRequest>,
}

impl Invocation {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        let cli = Cli::from_arg_matches(matches)?;

        let mut positioned: Vec<(usize, ActionRequest)> = Vec::new();

        for &(id, kind) in FLAG_ACTIONS {
            if let Some(indices) = matches.indices_of(id) {
                for index in indices {
                    positioned.push((index, ActionRequest { kind, argument: None }));
                }
            }
        }

        for &(id, kind) in FILE_ACTIONS {
            if let (Some(indices), Some(values)) =
                (matches.indices_of(id), matches.get_many::<PathBuf>(id))
            {
                for (index, path) in indices.zip(values) {
                    positioned.push((
                        index,
                        ActionRequest {
                            kind,
                            argument: Some(path.clone()),
                        },
                    ));
                }
            }
        }

        positioned.sort_by_key(|(index, _)| *index);

        Ok(Self {
            verbose: cli.verbose,
            serial_numbers: cli.serial_number,
            wait: cli.wait,
            // -w implies a restart
            restart: cli.restart || !cli.write_and_restart.is_empty(),
            requests: positioned.into_iter().map(|(_, r)| r).collect(),
        })
    }
}
