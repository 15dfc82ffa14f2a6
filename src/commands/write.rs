//! Write and erase actions
//!
//! Erasing is writing an image that is entirely 0xFF, so both are handled by
//! [`WriteImage`]. The image is built while preparing so that a bad hex file
//! is reported before anything on the device changes.

use std::fs;
use std::path::{Path, PathBuf};

use pload_core::{mapper, MemoryImage, Regions};

use crate::error::AppError;

use super::{Action, RunContext};

pub struct WriteImage {
    flag: &'static str,
    regions: Regions,
    /// Hex file to write, `None` when erasing
    path: Option<PathBuf>,
    erase: bool,
    image: Option<MemoryImage>,
}

impl WriteImage {
    /// Write the contents of a hex file given as the flag's argument
    pub fn from_file(flag: &'static str, regions: Regions) -> Self {
        Self {
            flag,
            regions,
            path: None,
            erase: false,
            image: None,
        }
    }

    /// Write an erased image
    pub fn erase(flag: &'static str, regions: Regions) -> Self {
        Self {
            flag,
            regions,
            path: None,
            erase: true,
            image: None,
        }
    }

    fn build_image(&self, ctx: &mut RunContext) -> Result<MemoryImage, AppError> {
        let descriptor = ctx.session.require()?.descriptor().clone();

        let path = match &self.path {
            Some(path) if !self.erase => path,
            _ => return Ok(MemoryImage::erased(&descriptor)?),
        };

        let text = fs::read_to_string(path).map_err(|source| AppError::File {
            path: path.clone(),
            source,
        })?;
        log::debug!("Read {} bytes from {}", text.len(), path.display());

        mapper::image_from_hex(&descriptor, &text).map_err(|source| AppError::Image {
            path: path.clone(),
            source,
        })
    }
}

impl Action for WriteImage {
    fn name(&self) -> &'static str {
        self.flag
    }

    fn parse(&mut self, argument: Option<&Path>) -> Result<(), AppError> {
        if self.erase {
            return Ok(());
        }
        match argument {
            Some(path) => {
                self.path = Some(path.to_path_buf());
                Ok(())
            }
            None => Err(AppError::BadArguments(format!(
                "Expected a filename after {}.",
                self.flag
            ))),
        }
    }

    fn prepare(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        self.image = Some(self.build_image(ctx)?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        let image = match self.image.take() {
            Some(image) => image,
            None => self.build_image(ctx)?,
        };
        let image = self.image.insert(image);

        let device = ctx.session.require()?;
        mapper::write_image(device, image, self.regions, ctx.progress.as_mut())?;
        Ok(())
    }

    fn release(&mut self) {
        self.image = None;
    }
}
