//! Erase/write RAM routines
//!
//! The STM8S ROM bootloader cannot program flash on its own: a small
//! routine must be resident in RAM before WRITE and ERASE reach flash,
//! EEPROM or option bytes. The routines ship as Intel HEX blobs keyed by
//! family, flash size and bootloader version; the engine side-loads the
//! matching one on first use.

use crate::device::Family;
use crate::error::{Error, Result};

struct RamRoutine {
    family: Family,
    flash_kb: u32,
    versions: &'static [u8],
    ihx: &'static str,
}

/// Open-source replacement erase/write routine for the 128 kB STM8S
/// parts with bootloader v2.4.
static ROUTINES: &[RamRoutine] = &[RamRoutine {
    family: Family::Stm8s,
    flash_kb: 128,
    versions: &[0x24],
    ihx: include_str!("../routines/erase_write_128k_v2.4.ihx"),
}];

/// The routine blob for a target, or [`Error::CannotIdentifyDevice`]
/// when no shipped routine matches
pub fn find(family: Family, flash_kb: u32, bsl_version: u8) -> Result<&'static str> {
    ROUTINES
        .iter()
        .find(|r| {
            r.family == family && r.flash_kb == flash_kb && r.versions.contains(&bsl_version)
        })
        .map(|r| r.ihx)
        .ok_or_else(|| {
            log::error!(
                "no erase/write routine for {} {} kB, bootloader 0x{:02X}",
                family,
                flash_kb,
                bsl_version
            );
            Error::CannotIdentifyDevice
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hexfile::ihex;
    use crate::image::MemoryImage;

    #[test]
    fn shipped_routine_is_found() {
        assert!(find(Family::Stm8s, 128, 0x24).is_ok());
    }

    #[test]
    fn unsupported_combinations_are_rejected() {
        assert_eq!(
            find(Family::Stm8s, 32, 0x10),
            Err(Error::CannotIdentifyDevice)
        );
        assert_eq!(
            find(Family::Stm8l, 128, 0x24),
            Err(Error::CannotIdentifyDevice)
        );
    }

    #[test]
    fn blob_decodes_into_ram_addresses() {
        let blob = find(Family::Stm8s, 128, 0x24).unwrap();
        let mut img = MemoryImage::new();
        ihex::decode(blob.as_bytes(), &mut img).unwrap();

        let e = img.extent(0, 0x3FFF).unwrap();
        assert_eq!(e.first, 0x00A0);
        assert_eq!(e.last, 0x0328);
        assert!(e.count > 0);
        // everything lands below the EEPROM window
        assert!(e.last < crate::device::EEPROM_START);
    }
}
