//! Read actions
//!
//! The output file is created while preparing, before any device memory is
//! read, so a path that cannot be written fails early.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use pload_core::{mapper, Regions};

use crate::error::AppError;

use super::{Action, RunContext};

pub struct ReadImage {
    flag: &'static str,
    regions: Regions,
    path: PathBuf,
    file: Option<File>,
}

impl ReadImage {
    pub fn new(flag: &'static str, regions: Regions) -> Self {
        Self {
            flag,
            regions,
            path: PathBuf::new(),
            file: None,
        }
    }

    fn file_error(&self, source: std::io::Error) -> AppError {
        AppError::File {
            path: self.path.clone(),
            source,
        }
    }
}

impl Action for ReadImage {
    fn name(&self) -> &'static str {
        self.flag
    }

    fn parse(&mut self, argument: Option<&Path>) -> Result<(), AppError> {
        match argument {
            Some(path) => {
                self.path = path.to_path_buf();
                Ok(())
            }
            None => Err(AppError::BadArguments(format!(
                "Expected a filename after {}.",
                self.flag
            ))),
        }
    }

    fn prepare(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        // Fail on a missing device before touching the file system
        ctx.session.require()?;
        let file = File::create(&self.path).map_err(|e| self.file_error(e))?;
        self.file = Some(file);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        let device = ctx.session.require()?;
        let image = mapper::read_image(device, self.regions, ctx.progress.as_mut())?;
        let text = mapper::encode_hex(&image, self.regions)?;

        let mut file = match self.file.take() {
            Some(file) => file,
            None => File::create(&self.path).map_err(|e| self.file_error(e))?,
        };
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| self.file_error(e))?;
        log::info!("Wrote {}", self.path.display());
        Ok(())
    }

    fn release(&mut self) {
        self.file = None;
    }
}
