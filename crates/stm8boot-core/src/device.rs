//! Target device identification and memory map
//!
//! The BSL version byte reported by GET selects the device family and
//! flash size from a static table; the per-family memory map decides
//! which addresses need the side-loaded RAM routine before flash
//! programming is legal.

use core::fmt;

use bitflags::bitflags;

/// Start of program flash, identical across the whole family
pub const PFLASH_START: u32 = 0x8000;
/// Flash block size for erase and block programming
pub const PFLASH_BLOCK_SIZE: u32 = 1024;
/// Data EEPROM window
pub const EEPROM_START: u32 = 0x4000;
/// Last data EEPROM address
pub const EEPROM_END: u32 = 0x47FF;
/// Option byte window
pub const OPTION_START: u32 = 0x4800;
/// Last option byte address
pub const OPTION_END: u32 = 0x48FF;

/// Device family, as identified from the BSL version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// STM8S/STM8AF: flash writes need the side-loaded RAM routine
    Stm8s,
    /// STM8L/STM8AL: the ROM bootloader programs flash on its own
    Stm8l,
}

impl Family {
    /// Whether flash, EEPROM and option byte writes need the RAM routine
    pub fn needs_ram_routine(&self) -> bool {
        matches!(self, Self::Stm8s)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stm8s => write!(f, "STM8S"),
            Self::Stm8l => write!(f, "STM8L"),
        }
    }
}

bitflags! {
    /// Commands advertised by the bootloader in the GET response
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandSet: u8 {
        /// GET supported
        const GET   = 1 << 0;
        /// READ supported
        const READ  = 1 << 1;
        /// WRITE supported
        const WRITE = 1 << 2;
        /// ERASE supported
        const ERASE = 1 << 3;
        /// GO supported
        const GO    = 1 << 4;
    }
}

/// Immutable description of the identified target, input to every
/// subsequent transaction in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    /// Device family
    pub family: Family,
    /// BSL version byte: major in the high nibble, minor in the low
    pub bsl_version: u8,
    /// Flash size in kilobytes
    pub flash_kb: u32,
    /// Commands advertised by GET
    pub commands: CommandSet,
}

impl TargetInfo {
    /// Dotted bootloader version, e.g. "2.4"
    pub fn version_string(&self) -> BslVersion {
        BslVersion(self.bsl_version)
    }

    /// One past the highest flash address
    pub fn flash_end(&self) -> u32 {
        PFLASH_START + self.flash_kb * 1024
    }
}

/// Display wrapper for the BCD-like BSL version byte
pub struct BslVersion(pub u8);

impl fmt::Display for BslVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 >> 4, self.0 & 0x0F)
    }
}

/// Family and flash size for a BSL version byte, per the vendor
/// bootloader documentation. `None` for unknown versions.
pub fn lookup_version(version: u8) -> Option<(Family, u32)> {
    match version {
        0x10 | 0x12 | 0x13 => Some((Family::Stm8s, 32)),
        0x20 | 0x21 | 0x22 | 0x24 => Some((Family::Stm8s, 128)),
        0xA1 | 0xA2 => Some((Family::Stm8l, 32)),
        _ => None,
    }
}

/// Coarse classification of a target address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    /// RAM below the EEPROM window
    Ram,
    /// Data EEPROM
    Eeprom,
    /// Option bytes
    Option,
    /// Program flash
    Flash,
    /// Peripheral or reserved space
    Other,
}

/// Classify a target address
pub fn region_of(addr: u32) -> MemoryRegion {
    match addr {
        0..=0x3FFF => MemoryRegion::Ram,
        EEPROM_START..=EEPROM_END => MemoryRegion::Eeprom,
        OPTION_START..=OPTION_END => MemoryRegion::Option,
        a if a >= PFLASH_START => MemoryRegion::Flash,
        _ => MemoryRegion::Other,
    }
}

/// Whether a write or erase touching `[lo, hi]` needs the RAM routine on
/// this family. RAM uploads never do; flash, EEPROM and option bytes do
/// on families without a self-contained ROM write path.
pub fn needs_ram_routine(family: Family, lo: u32, hi: u32) -> bool {
    if !family.needs_ram_routine() {
        return false;
    }
    let overlaps = |a: u32, b: u32| lo <= b && hi >= a;
    overlaps(EEPROM_START, EEPROM_END) || overlaps(OPTION_START, OPTION_END) || hi >= PFLASH_START
}

/// Flash sector index for an address, as used by the ERASE command
pub fn flash_sector(addr: u32) -> u8 {
    ((addr.saturating_sub(PFLASH_START)) / PFLASH_BLOCK_SIZE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn version_table() {
        assert_eq!(lookup_version(0x10), Some((Family::Stm8s, 32)));
        assert_eq!(lookup_version(0x21), Some((Family::Stm8s, 128)));
        assert_eq!(lookup_version(0xA1).map(|(f, _)| f), Some(Family::Stm8l));
        assert_eq!(lookup_version(0x55), None);
    }

    #[test]
    fn version_formats_as_bcd() {
        assert_eq!(BslVersion(0x24).to_string(), "2.4");
        assert_eq!(BslVersion(0x10).to_string(), "1.0");
    }

    #[test]
    fn regions() {
        assert_eq!(region_of(0x0100), MemoryRegion::Ram);
        assert_eq!(region_of(0x4000), MemoryRegion::Eeprom);
        assert_eq!(region_of(0x4800), MemoryRegion::Option);
        assert_eq!(region_of(0x8000), MemoryRegion::Flash);
        assert_eq!(region_of(0x5000), MemoryRegion::Other);
    }

    #[test]
    fn ram_routine_gate() {
        assert!(needs_ram_routine(Family::Stm8s, 0x8000, 0x807F));
        assert!(needs_ram_routine(Family::Stm8s, 0x4000, 0x4010));
        assert!(needs_ram_routine(Family::Stm8s, 0x4800, 0x4800));
        assert!(!needs_ram_routine(Family::Stm8s, 0x00A0, 0x01FF));
        assert!(!needs_ram_routine(Family::Stm8l, 0x8000, 0x807F));
    }

    #[test]
    fn sector_numbering() {
        assert_eq!(flash_sector(0x8000), 0);
        assert_eq!(flash_sector(0x83FF), 0);
        assert_eq!(flash_sector(0x8400), 1);
        assert_eq!(flash_sector(0x8080), 0);
    }
}
