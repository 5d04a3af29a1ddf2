//! Read command: dump a memory region to a file

use std::path::Path;

use stm8boot_core::hexfile::{bin, ihex, srec, table, FileFormat};
use stm8boot_core::session::Session;
use stm8boot_core::transport::Transport;
use stm8boot_core::Error as CoreError;

use super::{BarProgress, CmdResult};

pub fn run<T: Transport>(session: &mut Session<T>, output: &Path, start: u32, end: u32) -> CmdResult {
    let image = session.read_out(start, end, &mut BarProgress::new())?;

    let bytes = match super::format_of(output) {
        FileFormat::SRecord => srec::encode(&image)?.into_bytes(),
        FileFormat::IntelHex => ihex::encode(&image)?.into_bytes(),
        FileFormat::Table => table::encode(&image)?.into_bytes(),
        FileFormat::Binary => bin::encode(&image)?,
    };

    std::fs::write(output, &bytes).map_err(|e| {
        log::error!("cannot create {}: {}", output.display(), e);
        CoreError::FailedCreate
    })?;
    println!(
        "Read 0x{:06X} - 0x{:06X} into {}",
        start,
        end,
        output.display()
    );
    Ok(())
}
