//! Intel HEX codec
//!
//! Record types: 00 data, 01 EOF, 03/05 start addresses (ignored), 04
//! extended linear address. Type 02 (extended segment address) is not
//! supported and rejected outright. The record checksum is the two's
//! complement of the low byte of the sum of length, address, type and
//! data bytes.

use alloc::string::String;
use core::fmt::Write;

use super::{data_blocks, hex_byte, lines};
use crate::error::{Error, Result};
use crate::image::{MemoryImage, LEN_IMAGE};

const REC_DATA: u8 = 0x00;
const REC_EOF: u8 = 0x01;
const REC_EXT_SEGMENT: u8 = 0x02;
const REC_START_SEGMENT: u8 = 0x03;
const REC_EXT_LINEAR: u8 = 0x04;
const REC_START_LINEAR: u8 = 0x05;

/// Import an Intel HEX stream into the image
pub fn decode(data: &[u8], image: &mut MemoryImage) -> Result<()> {
    let mut offset = 0u32;
    let mut num_data = 0usize;
    let mut first = u32::MAX;
    let mut last = 0u32;

    for (line_no, line) in lines(data) {
        if line.is_empty() {
            continue;
        }
        if line[0] != b':' {
            return Err(Error::HexInvalidStart { line: line_no });
        }

        let len = hex_byte(line, 1, line_no)? as usize;
        let addr_hi = hex_byte(line, 3, line_no)?;
        let addr_lo = hex_byte(line, 5, line_no)?;
        let rec_type = hex_byte(line, 7, line_no)?;

        let mut chk_calc = (len as u8)
            .wrapping_add(addr_hi)
            .wrapping_add(addr_lo)
            .wrapping_add(rec_type);

        let mut payload = [0u8; 255];
        let mut idx = 9;
        for slot in payload.iter_mut().take(len) {
            let b = hex_byte(line, idx, line_no)?;
            *slot = b;
            chk_calc = chk_calc.wrapping_add(b);
            idx += 2;
        }

        let chk_read = hex_byte(line, idx, line_no)?;
        chk_calc = chk_calc.wrapping_neg();
        if chk_calc != chk_read {
            return Err(Error::HexChecksum {
                line: line_no,
                expected: chk_calc,
                found: chk_read,
            });
        }

        match rec_type {
            REC_DATA => {
                let addr = offset + ((addr_hi as u32) << 8 | addr_lo as u32);
                if addr.checked_add(len as u32).map_or(true, |end| end > LEN_IMAGE) {
                    return Err(Error::HexAddressOverflow { line: line_no });
                }
                for (i, &b) in payload.iter().take(len).enumerate() {
                    image.set(addr + i as u32, b)?;
                }
                if len > 0 {
                    num_data += len;
                    first = first.min(addr);
                    last = last.max(addr + len as u32 - 1);
                }
            }
            REC_EOF => break,
            REC_EXT_LINEAR => {
                offset = ((payload[0] as u32) << 8 | payload[1] as u32) << 16;
            }
            REC_START_SEGMENT | REC_START_LINEAR => {}
            t => {
                return Err(Error::HexUnsupportedType {
                    line: line_no,
                    record_type: t,
                })
            }
        }
    }

    if num_data > 0 {
        log::debug!(
            "Intel HEX import: {} bytes in 0x{:04X}-0x{:04X}",
            num_data,
            first,
            last
        );
    } else {
        log::debug!("Intel HEX import: no data");
    }
    Ok(())
}

/// Export the defined bytes of the image as an Intel HEX stream
pub fn encode(image: &MemoryImage) -> Result<String> {
    let mut out = String::new();
    let mut ela = 0u16;

    for (addr, data) in data_blocks(image) {
        let hi = (addr >> 16) as u16;
        if hi != ela {
            write_record(&mut out, 0, REC_EXT_LINEAR, &hi.to_be_bytes());
            ela = hi;
        }
        write_record(&mut out, addr as u16, REC_DATA, &data);
    }

    out.push_str(":00000001FF\n");
    Ok(out)
}

fn write_record(out: &mut String, addr: u16, rec_type: u8, data: &[u8]) {
    let mut chk = (data.len() as u8)
        .wrapping_add((addr >> 8) as u8)
        .wrapping_add(addr as u8)
        .wrapping_add(rec_type);
    let _ = write!(out, ":{:02X}{:04X}{:02X}", data.len() as u8, addr, rec_type);
    for &b in data {
        chk = chk.wrapping_add(b);
        let _ = write!(out, "{:02X}", b);
    }
    let _ = writeln!(out, "{:02X}", chk.wrapping_neg());
}
