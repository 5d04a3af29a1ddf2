//! ASCII address/value table codec
//!
//! One `<address>\t<value>` pair per line, each token decimal or hex with
//! a `0x`/`0X` prefix. Lines starting with `#` are comments.

use alloc::string::String;
use core::fmt::Write;

use crate::error::{Error, Result};
use crate::image::{MemoryImage, LEN_IMAGE};

use super::lines;

/// Import an address/value table into the image
pub fn decode(data: &[u8], image: &mut MemoryImage) -> Result<()> {
    let mut num_data = 0usize;

    for (line_no, raw) in lines(data) {
        let line = trim(raw);
        if line.is_empty() || line[0] == b'#' {
            continue;
        }

        let mut tokens = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|t| !t.is_empty());
        let addr_tok = tokens.next().ok_or(Error::InvalidCharacter { line: line_no })?;
        let val_tok = tokens.next().ok_or(Error::InvalidCharacter { line: line_no })?;
        if tokens.next().is_some() {
            return Err(Error::InvalidCharacter { line: line_no });
        }

        let addr = parse_num(addr_tok, line_no)?;
        let value = parse_num(val_tok, line_no)?;
        if value > 0xFF {
            return Err(Error::InvalidCharacter { line: line_no });
        }
        if addr >= LEN_IMAGE as u64 {
            log::error!("line {}: table address 0x{:X} beyond image", line_no, addr);
            return Err(Error::FileBufferExceeded);
        }
        image.set(addr as u32, value as u8)?;
        num_data += 1;
    }

    log::debug!("table import: {} bytes", num_data);
    Ok(())
}

/// Export the defined bytes of the image as an address/value table
pub fn encode(image: &MemoryImage) -> Result<String> {
    let mut out = String::from("# address\tvalue\n");
    let e = image.extent(0, LEN_IMAGE - 1)?;
    if e.count == 0 {
        return Ok(out);
    }
    for addr in e.first..=e.last {
        if let Some(value) = image.get(addr) {
            let _ = writeln!(out, "0x{:04x}\t0x{:02x}", addr, value);
        }
    }
    Ok(out)
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &line[start..end]
}

/// Parse a decimal or `0x`-prefixed hex token, validating the character set
fn parse_num(tok: &[u8], line: u32) -> Result<u64> {
    let (digits, radix) = match tok {
        [b'0', b'x' | b'X', rest @ ..] => (rest, 16),
        _ => (tok, 10),
    };
    if digits.is_empty() {
        return Err(Error::InvalidCharacter { line });
    }
    let mut value = 0u64;
    for &c in digits {
        let d = match c {
            b'0'..=b'9' => (c - b'0') as u64,
            b'a'..=b'f' if radix == 16 => (c - b'a' + 10) as u64,
            b'A'..=b'F' if radix == 16 => (c - b'A' + 10) as u64,
            _ => return Err(Error::InvalidCharacter { line }),
        };
        value = value
            .checked_mul(radix)
            .and_then(|v| v.checked_add(d))
            .ok_or(Error::InvalidCharacter { line })?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_radix() {
        let input = b"# comment\n0x8000\t0xAA\n32769\t187\n\n0x8002 0x55\n";
        let mut img = MemoryImage::new();
        decode(input, &mut img).unwrap();
        assert_eq!(img.get(0x8000), Some(0xAA));
        assert_eq!(img.get(0x8001), Some(0xBB));
        assert_eq!(img.get(0x8002), Some(0x55));
    }

    #[test]
    fn invalid_token_reports_line() {
        let input = b"0x8000\t0xAA\n0x80zz\t0x00\n";
        let mut img = MemoryImage::new();
        assert_eq!(
            decode(input, &mut img),
            Err(Error::InvalidCharacter { line: 2 })
        );
    }

    #[test]
    fn value_above_byte_rejected() {
        let mut img = MemoryImage::new();
        assert_eq!(
            decode(b"0x8000\t0x100\n", &mut img),
            Err(Error::InvalidCharacter { line: 1 })
        );
    }

    #[test]
    fn round_trip() {
        let mut img = MemoryImage::new();
        img.set(0x8000, 0xAA).unwrap();
        img.set(0x8005, 0x5A).unwrap();

        let text = encode(&img).unwrap();
        assert!(text.starts_with("# address\tvalue\n"));

        let mut img2 = MemoryImage::new();
        decode(text.as_bytes(), &mut img2).unwrap();
        assert_eq!(img2.get(0x8000), Some(0xAA));
        assert_eq!(img2.get(0x8005), Some(0x5A));
        assert_eq!(img2.get(0x8001), None);
        assert_eq!(img2.extent(0, 0xFFFF).unwrap().count, 2);
    }
}
