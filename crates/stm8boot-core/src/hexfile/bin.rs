//! Raw binary codec
//!
//! Import needs an externally supplied base address; every byte of the
//! file becomes a defined byte. Export writes the contiguous window
//! between the first and last defined address, rendering holes as 0x00
//! since the format cannot represent them.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::image::{MemoryImage, LEN_IMAGE};

/// Import raw bytes at `base` into the image
pub fn decode(data: &[u8], base: u32, image: &mut MemoryImage) -> Result<()> {
    let end = base as u64 + data.len() as u64;
    if end > LEN_IMAGE as u64 {
        log::error!(
            "binary import of {} bytes at 0x{:06X} exceeds image capacity",
            data.len(),
            base
        );
        return Err(Error::FileBufferExceeded);
    }
    for (i, &b) in data.iter().enumerate() {
        image.set(base + i as u32, b)?;
    }
    log::debug!(
        "binary import: {} bytes at 0x{:04X}",
        data.len(),
        base
    );
    Ok(())
}

/// Export the image window `[first, last]` as raw bytes, holes as 0x00
pub fn encode(image: &MemoryImage) -> Result<Vec<u8>> {
    let e = image.extent(0, LEN_IMAGE - 1)?;
    if e.count == 0 {
        return Ok(Vec::new());
    }
    Ok(image.get_bytes(e.first, e.last - e.first + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_defines_every_byte() {
        let mut img = MemoryImage::new();
        decode(&[1, 2, 3], 0x8000, &mut img).unwrap();
        let e = img.extent(0, 0xFFFF).unwrap();
        assert_eq!((e.first, e.last, e.count), (0x8000, 0x8002, 3));
    }

    #[test]
    fn import_beyond_capacity_rejected() {
        let mut img = MemoryImage::new();
        assert_eq!(
            decode(&[0; 2], LEN_IMAGE - 1, &mut img),
            Err(Error::FileBufferExceeded)
        );
    }

    #[test]
    fn export_renders_holes_as_zero() {
        let mut img = MemoryImage::new();
        img.set(0x8000, 0xAA).unwrap();
        img.set(0x8003, 0xBB).unwrap();
        assert_eq!(encode(&img).unwrap(), alloc::vec![0xAA, 0, 0, 0xBB]);
    }

    #[test]
    fn export_empty_image() {
        let img = MemoryImage::new();
        assert!(encode(&img).unwrap().is_empty());
    }
}
