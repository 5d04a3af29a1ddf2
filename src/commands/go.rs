//! Go command: leave the bootloader

use stm8boot_core::session::Session;
use stm8boot_core::transport::Transport;

use super::CmdResult;

pub fn run<T: Transport>(session: &mut Session<T>, address: Option<u32>) -> CmdResult {
    session.go(address)?;
    println!(
        "Jumped to 0x{:06X}",
        address.unwrap_or(stm8boot_core::device::PFLASH_START)
    );
    Ok(())
}
