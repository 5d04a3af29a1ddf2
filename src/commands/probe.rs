//! Probe command: connect and show what answered

use stm8boot_core::session::Session;
use stm8boot_core::transport::Transport;

use super::CmdResult;

pub fn run<T: Transport>(session: &mut Session<T>) -> CmdResult {
    let info = *session.target().ok_or("not connected")?;

    println!();
    println!("Device family:      {}", info.family);
    println!("Bootloader version: {}", info.version_string());
    println!("Flash size:         {} kB", info.flash_kb);
    println!(
        "Flash range:        0x{:06X} - 0x{:06X}",
        stm8boot_core::device::PFLASH_START,
        info.flash_end() - 1
    );
    println!("Commands:           {:?}", info.commands);
    Ok(())
}
