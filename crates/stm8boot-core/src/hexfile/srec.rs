//! Motorola S-record codec
//!
//! Data records S1 (16-bit address), S2 (24-bit) and S3 (32-bit) are
//! imported; S0/S5/S7/S8/S9 are tolerated without producing data. The
//! record checksum is the one's complement of the low byte of the sum of
//! the length, address and data bytes.

use alloc::string::String;
use core::fmt::Write;

use super::{data_blocks, hex_byte, lines};
use crate::error::{Error, Result};
use crate::image::{MemoryImage, LEN_IMAGE};

/// Import an S-record stream into the image
pub fn decode(data: &[u8], image: &mut MemoryImage) -> Result<()> {
    let mut num_data = 0usize;
    let mut first = u32::MAX;
    let mut last = 0u32;

    for (line_no, line) in lines(data) {
        if line.is_empty() {
            continue;
        }
        if line[0] != b'S' {
            return Err(Error::SRecordInvalidStart { line: line_no });
        }
        if line.len() < 4 {
            return Err(Error::InvalidCharacter { line: line_no });
        }

        // address width in bytes is the record type + 1
        let rec_type = line[1].wrapping_sub(b'0');
        if !(1..=3).contains(&rec_type) {
            continue;
        }
        let addr_bytes = rec_type as usize + 1;

        let len = hex_byte(line, 2, line_no)? as usize;
        let mut chk_calc = len as u8;

        let mut addr = 0u32;
        for i in 0..addr_bytes {
            let b = hex_byte(line, 4 + 2 * i, line_no)?;
            addr = addr << 8 | b as u32;
            chk_calc = chk_calc.wrapping_add(b);
        }

        // length counts address, data and checksum
        let data_len = len
            .checked_sub(addr_bytes + 1)
            .ok_or(Error::InvalidCharacter { line: line_no })?;
        if addr.checked_add(data_len as u32).map_or(true, |end| end > LEN_IMAGE) {
            return Err(Error::SRecordAddressOverflow { line: line_no });
        }

        let mut idx = 4 + 2 * addr_bytes;
        for i in 0..data_len {
            let b = hex_byte(line, idx, line_no)?;
            image.set(addr + i as u32, b)?;
            chk_calc = chk_calc.wrapping_add(b);
            idx += 2;
        }

        let chk_read = hex_byte(line, idx, line_no)?;
        chk_calc ^= 0xFF;
        if chk_calc != chk_read {
            return Err(Error::SRecordChecksum {
                line: line_no,
                expected: chk_calc,
                found: chk_read,
            });
        }

        if data_len > 0 {
            num_data += data_len;
            first = first.min(addr);
            last = last.max(addr + data_len as u32 - 1);
        }
    }

    if num_data > 0 {
        log::debug!(
            "S-record import: {} bytes in 0x{:04X}-0x{:04X}",
            num_data,
            first,
            last
        );
    } else {
        log::debug!("S-record import: no data");
    }
    Ok(())
}

/// Export the defined bytes of the image as an S-record stream
pub fn encode(image: &MemoryImage) -> Result<String> {
    let blocks = data_blocks(image);

    // narrowest record type that covers the highest emitted address
    let max_addr = blocks
        .last()
        .map(|(addr, data)| addr + data.len() as u32 - 1)
        .unwrap_or(0);
    let rec_type: u8 = if max_addr <= 0xFFFF {
        1
    } else if max_addr <= 0xFF_FFFF {
        2
    } else {
        3
    };
    let addr_bytes = rec_type as usize + 1;

    let mut out = String::new();
    // dummy header record for tool compatibility ("HDR")
    out.push_str("S00600004844521B\n");

    for (addr, data) in &blocks {
        write_record(&mut out, b'0' + rec_type, addr_bytes, *addr, data);
    }

    // matching termination record with a zero start address
    write_record(&mut out, b'0' + (10 - rec_type), addr_bytes, 0, &[]);
    Ok(out)
}

fn write_record(out: &mut String, type_char: u8, addr_bytes: usize, addr: u32, data: &[u8]) {
    let len = (addr_bytes + data.len() + 1) as u8;
    let mut chk = len;
    let _ = write!(out, "S{}{:02X}", type_char as char, len);
    for i in (0..addr_bytes).rev() {
        let b = (addr >> (8 * i)) as u8;
        chk = chk.wrapping_add(b);
        let _ = write!(out, "{:02X}", b);
    }
    for &b in data {
        chk = chk.wrapping_add(b);
        let _ = write!(out, "{:02X}", b);
    }
    let _ = writeln!(out, "{:02X}", chk ^ 0xFF);
}
