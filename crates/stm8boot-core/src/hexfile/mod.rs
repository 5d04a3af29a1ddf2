//! Hex file codecs
//!
//! Import and export of Motorola S-record, Intel HEX, plain ASCII tables
//! and raw binary, all operating on the sparse [`MemoryImage`]. Decoders
//! are strict: any structural or checksum deviation aborts with the
//! offending line number (or byte offset for binary).

pub mod bin;
pub mod ihex;
pub mod srec;
pub mod table;

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::image::MemoryImage;

/// Emitted data records carry at most this many bytes, and records break
/// at multiples of it to match the device write block handling.
pub const EMIT_BLOCK: u32 = 32;

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Motorola S-record (S19/S28/S37)
    SRecord,
    /// Intel HEX
    IntelHex,
    /// ASCII address/value table
    Table,
    /// Raw binary (import requires a base address)
    Binary,
}

impl FileFormat {
    /// Guess the format from a file name extension. Unknown extensions
    /// are treated as raw binary.
    pub fn from_name(name: &str) -> Self {
        let ext = name.rsplit('.').next().unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "s19" | "s28" | "s37" | "srec" | "mot" => Self::SRecord,
            "hex" | "ihx" => Self::IntelHex,
            "txt" => Self::Table,
            _ => Self::Binary,
        }
    }
}

/// Iterate physical lines with 1-based numbering, CR and LF stripped
fn lines(data: &[u8]) -> impl Iterator<Item = (u32, &[u8])> {
    data.split(|&b| b == b'\n')
        .enumerate()
        .map(|(i, line)| (i as u32 + 1, line.strip_suffix(b"\r").unwrap_or(line)))
}

/// Value of one ASCII hex digit
fn hex_digit(c: u8, line: u32) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::InvalidCharacter { line }),
    }
}

/// Hex byte at character offset `idx`, failing on short or non-hex input
fn hex_byte(s: &[u8], idx: usize, line: u32) -> Result<u8> {
    if idx + 2 > s.len() {
        return Err(Error::InvalidCharacter { line });
    }
    Ok(hex_digit(s[idx], line)? << 4 | hex_digit(s[idx + 1], line)?)
}

/// Defined bytes of the image grouped into emission blocks: at most
/// [`EMIT_BLOCK`] bytes each, broken at block-aligned addresses.
fn data_blocks(image: &MemoryImage) -> Vec<(u32, Vec<u8>)> {
    let mut blocks = Vec::new();
    let hi = image.capacity() - 1;
    let mut from = 0u32;
    while let Some(run) = image.next_defined_run(from, hi) {
        let mut addr = run.start;
        let mut left = run.len;
        while left > 0 {
            let to_boundary = EMIT_BLOCK - (addr % EMIT_BLOCK);
            let len = left.min(to_boundary);
            blocks.push((addr, image.get_bytes(addr, len)));
            addr += len;
            left -= len;
        }
        from = run.start + run.len;
        if from > hi {
            break;
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_name("fw.s19"), FileFormat::SRecord);
        assert_eq!(FileFormat::from_name("fw.IHX"), FileFormat::IntelHex);
        assert_eq!(FileFormat::from_name("dump.txt"), FileFormat::Table);
        assert_eq!(FileFormat::from_name("fw.bin"), FileFormat::Binary);
        assert_eq!(FileFormat::from_name("noext"), FileFormat::Binary);
    }

    #[test]
    fn blocks_break_at_alignment() {
        let mut img = MemoryImage::new();
        img.fill(0x1F, 0x4F, 0xAB).unwrap();
        let blocks = data_blocks(&img);
        let shape: Vec<(u32, usize)> = blocks.iter().map(|(a, d)| (*a, d.len())).collect();
        assert_eq!(shape, alloc::vec![(0x1F, 1), (0x20, 32), (0x40, 16)]);
    }
}
