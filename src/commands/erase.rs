//! Erase command: sectors by address range, or everything

use stm8boot_core::device::{flash_sector, PFLASH_START};
use stm8boot_core::session::Session;
use stm8boot_core::transport::Transport;

use super::CmdResult;

pub fn run<T: Transport>(
    session: &mut Session<T>,
    mass: bool,
    range: Option<(u32, u32)>,
) -> CmdResult {
    if mass {
        println!("Mass erasing...");
        session.mass_erase()?;
        println!("Done");
        return Ok(());
    }

    let (start, end) = range.ok_or("erase needs --mass or --start/--end")?;
    if start > end {
        return Err(format!("start 0x{:X} above end 0x{:X}", start, end).into());
    }
    if start < PFLASH_START {
        return Err("sector erase only covers program flash (0x8000 and up)".into());
    }
    if let Some(info) = session.target() {
        if end >= info.flash_end() {
            return Err(format!(
                "end 0x{:X} beyond flash (last address 0x{:06X})",
                end,
                info.flash_end() - 1
            )
            .into());
        }
    }

    let sectors: Vec<u8> = (flash_sector(start)..=flash_sector(end)).collect();
    println!("Erasing {} sector(s)...", sectors.len());
    session.erase_sectors(&sectors)?;
    println!("Done");
    Ok(())
}
