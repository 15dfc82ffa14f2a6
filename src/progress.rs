//! Progress reporting with indicatif
//!
//! Each status reported by a bootloader operation ("Erasing flash...",
//! "Writing EEPROM...") gets its own bar. Bars are drawn on stderr and are
//! hidden when stderr is not a terminal.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pload_core::Progress;

/// Create a progress bar style labelled with the current phase
fn create_progress_bar_style(phase: &str) -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {}",
            phase
        ))?
        .progress_chars("#>-"))
}

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    phase: &'static str,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
            phase: "",
        }
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        self.finish();
        self.phase = phase;
        let pb = ProgressBar::new(total);
        if let Ok(style) = create_progress_bar_style(phase) {
            pb.set_style(style);
        }
        self.current_bar = Some(self.multi.add(pb));
    }

    fn finish(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish();
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for IndicatifProgress {
    fn update(&mut self, status: &'static str, progress: u32, max_progress: u32) {
        if self.current_bar.is_none() || self.phase != status {
            self.create_bar(max_progress as u64, status);
        }
        if let Some(pb) = &self.current_bar {
            if pb.length() != Some(max_progress as u64) {
                pb.set_length(max_progress as u64);
            }
            pb.set_position(progress as u64);
        }
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        self.finish();
    }
}
