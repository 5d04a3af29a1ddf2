//! Command implementations

pub mod erase;
pub mod go;
pub mod probe;
pub mod read;
pub mod verify;
pub mod write;

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use stm8boot_core::hexfile::FileFormat;
use stm8boot_core::session::{Phase, Progress, Session};
use stm8boot_core::transport::Transport;
use stm8boot_core::Error as CoreError;

/// Shared command result type
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Build a connected session: reset pulse (if a reset line is wired),
/// sync, UART mode handling, identify
pub fn connect<T: Transport>(
    transport: T,
    interface: stm8boot_core::frame::Interface,
    reset: bool,
    uart_mode: Option<stm8boot_core::frame::Interface>,
) -> Result<Session<T>, Box<dyn std::error::Error>> {
    let mut session = Session::new(transport, interface);
    let info = session.connect(reset, uart_mode)?;
    println!(
        "Found {} with {} kB flash, bootloader v{}",
        info.family,
        info.flash_kb,
        info.version_string()
    );
    Ok(session)
}

/// Load a set of input files into the session image, format by
/// extension
pub fn load_files<T: Transport>(
    session: &mut Session<T>,
    files: &[std::path::PathBuf],
    base: u32,
) -> CmdResult {
    for path in files {
        let data = std::fs::read(path).map_err(|e| {
            log::error!("cannot open {}: {}", path.display(), e);
            CoreError::FailedOpen
        })?;
        let format = format_of(path);
        log::info!(
            "loading {} ({:?}, {} bytes)",
            path.display(),
            format,
            data.len()
        );
        session.load(format, &data, base)?;
    }
    Ok(())
}

/// File format for a path, by extension
pub fn format_of(path: &Path) -> FileFormat {
    FileFormat::from_name(&path.to_string_lossy())
}

/// Progress bar for the long-running phases
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn begin(&mut self, phase: Phase, bytes_total: usize) {
        let bar = ProgressBar::new(bytes_total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg:>8} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap()
            .progress_chars("#>-"),
        );
        bar.set_message(match phase {
            Phase::Read => "reading",
            Phase::Write => "writing",
            Phase::Verify => "verifying",
        });
        self.bar = Some(bar);
    }

    fn update(&mut self, bytes_done: usize, _bytes_total: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(bytes_done as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}
