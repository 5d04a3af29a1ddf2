//! Programming session orchestration
//!
//! A [`Session`] owns the transport and the session image for its whole
//! lifetime and composes the lower layers into the top-level actions:
//! connect, load files, program, verify, read out, erase, jump.

use alloc::vec::Vec;

use crate::bsl::Bootloader;
use crate::device::{self, TargetInfo, PFLASH_START};
use crate::error::Result;
use crate::frame::Interface;
use crate::hexfile::{bin, ihex, srec, table, FileFormat};
use crate::image::{MemoryImage, LEN_IMAGE};
use crate::transport::Transport;

/// Reset line pulse width
const RESET_PULSE_US: u32 = 10_000;
/// Settle time after releasing reset, before the first sync byte
const RESET_SETTLE_US: u32 = 50_000;

/// Session phase reported to the progress sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading target memory
    Read,
    /// Writing the image to the target
    Write,
    /// Reading back for comparison
    Verify,
}

/// Progress callback for the long-running phases. All methods have empty
/// defaults; implement the ones the front end displays.
pub trait Progress {
    /// A phase with a known byte total starts
    fn begin(&mut self, phase: Phase, bytes_total: usize) {
        let _ = (phase, bytes_total);
    }

    /// Bytes transferred so far in the current phase
    fn update(&mut self, bytes_done: usize, bytes_total: usize) {
        let _ = (bytes_done, bytes_total);
    }

    /// The current phase completed
    fn finish(&mut self) {}

    /// Polled between transactions; returning `true` aborts the session
    fn cancelled(&self) -> bool {
        false
    }
}

/// A progress sink that ignores everything
pub struct NoProgress;

impl Progress for NoProgress {}

/// One programming session: exclusive owner of the transport and the
/// session image
pub struct Session<T: Transport> {
    bsl: Bootloader<T>,
    image: MemoryImage,
}

impl<T: Transport> Session<T> {
    /// Create a session over `transport` in the given interface mode
    pub fn new(transport: T, interface: Interface) -> Self {
        Self {
            bsl: Bootloader::new(transport, interface),
            image: MemoryImage::new(),
        }
    }

    /// The identified target, once connected
    pub fn target(&self) -> Option<&TargetInfo> {
        self.bsl.target()
    }

    /// The session image
    pub fn image(&self) -> &MemoryImage {
        &self.image
    }

    /// Mutable session image, for transforms between load and program
    pub fn image_mut(&mut self) -> &mut MemoryImage {
        &mut self.image
    }

    /// Bring the target into the bootloader and identify it: optional
    /// reset pulse, synchronize, UART mode detection (or override),
    /// GET-based identification
    pub fn connect(&mut self, reset: bool, uart_mode: Option<Interface>) -> Result<TargetInfo> {
        if reset {
            self.pulse_reset()?;
        }
        self.bsl.sync()?;
        if self.bsl.interface().is_uart() {
            match uart_mode {
                Some(mode) => {
                    log::info!("UART mode forced to {}", mode);
                    self.bsl.set_interface(mode);
                }
                None => {
                    self.bsl.detect_uart_mode()?;
                }
            }
        }
        self.bsl.identify()
    }

    fn pulse_reset(&mut self) -> Result<()> {
        log::debug!("pulsing target reset");
        let t = self.bsl.transport_mut();
        t.set_reset_line(true)?;
        t.delay_us(RESET_PULSE_US);
        t.set_reset_line(false)?;
        t.delay_us(RESET_SETTLE_US);
        Ok(())
    }

    /// Decode a file into the session image. `base` applies to raw
    /// binary only.
    pub fn load(&mut self, format: FileFormat, data: &[u8], base: u32) -> Result<()> {
        match format {
            FileFormat::SRecord => srec::decode(data, &mut self.image),
            FileFormat::IntelHex => ihex::decode(data, &mut self.image),
            FileFormat::Table => table::decode(data, &mut self.image),
            FileFormat::Binary => bin::decode(data, base, &mut self.image),
        }
    }

    /// Export the session image in the given format
    pub fn export(&self, format: FileFormat) -> Result<Vec<u8>> {
        Ok(match format {
            FileFormat::SRecord => srec::encode(&self.image)?.into_bytes(),
            FileFormat::IntelHex => ihex::encode(&self.image)?.into_bytes(),
            FileFormat::Table => table::encode(&self.image)?.into_bytes(),
            FileFormat::Binary => bin::encode(&self.image)?,
        })
    }

    /// Write every defined byte of the session image to the target.
    /// Returns the number of bytes written.
    pub fn program(&mut self, progress: &mut dyn Progress) -> Result<usize> {
        let e = self.image.extent(0, LEN_IMAGE - 1)?;
        if e.count == 0 {
            log::warn!("image holds no data, nothing to program");
            return Ok(0);
        }
        progress.begin(Phase::Write, e.count);
        self.bsl.write_image(&self.image, e.first, e.last, &mut |done, total| {
            progress.update(done, total);
            !progress.cancelled()
        })?;
        progress.finish();
        Ok(e.count)
    }

    /// Read back every defined byte of the image and compare
    pub fn verify(&mut self, progress: &mut dyn Progress) -> Result<()> {
        let e = self.image.extent(0, LEN_IMAGE - 1)?;
        if e.count == 0 {
            return Ok(());
        }
        progress.begin(Phase::Verify, e.count);
        self.bsl.verify(&self.image, e.first, e.last, &mut |done, total| {
            progress.update(done, total);
            !progress.cancelled()
        })?;
        progress.finish();
        Ok(())
    }

    /// Read `[lo, hi]` from the target into a fresh image
    pub fn read_out(
        &mut self,
        lo: u32,
        hi: u32,
        progress: &mut dyn Progress,
    ) -> Result<MemoryImage> {
        let mut out = MemoryImage::new();
        out.check_range(lo, hi)?;
        progress.begin(Phase::Read, (hi - lo + 1) as usize);
        self.bsl.read(lo, hi - lo + 1, &mut out, &mut |done, total| {
            progress.update(done, total);
            !progress.cancelled()
        })?;
        progress.finish();
        Ok(out)
    }

    /// Erase the flash sectors covered by the image's defined bytes
    pub fn erase_for_image(&mut self) -> Result<()> {
        // only the identified flash window maps onto sector numbers
        let flash_end = self
            .bsl
            .target()
            .map_or(LEN_IMAGE, |t| t.flash_end())
            .min(LEN_IMAGE);
        let runs = self.image.defined_runs(PFLASH_START, flash_end - 1)?;
        let mut sectors: Vec<u8> = Vec::new();
        for run in runs {
            let first = device::flash_sector(run.start);
            let last = device::flash_sector(run.start + run.len - 1);
            for s in first..=last {
                if !sectors.contains(&s) {
                    sectors.push(s);
                }
            }
        }
        if sectors.is_empty() {
            return Ok(());
        }
        log::info!("erasing {} sector(s) covered by the image", sectors.len());
        self.bsl.erase_sectors(&sectors)
    }

    /// Erase an explicit list of flash sectors
    pub fn erase_sectors(&mut self, sectors: &[u8]) -> Result<()> {
        self.bsl.erase_sectors(sectors)
    }

    /// Erase the whole flash
    pub fn mass_erase(&mut self) -> Result<()> {
        self.bsl.mass_erase()
    }

    /// Probe whether an address exists on the target
    pub fn mem_check(&mut self, addr: u32) -> Result<bool> {
        self.bsl.mem_check(addr)
    }

    /// Leave the bootloader, jumping to `addr` (flash start by default).
    /// Closes the session for further transactions.
    pub fn go(&mut self, addr: Option<u32>) -> Result<()> {
        self.bsl.go(addr.unwrap_or(PFLASH_START))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsl::{ACK, CMD_ERASE, CMD_GET, CMD_GO, CMD_READ, CMD_WRITE};
    use crate::error::Error;
    use crate::transport::mock::MockTransport;

    fn queue_handshake(mock: &mut MockTransport, version: u8) {
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, version]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
    }

    #[test]
    fn connect_pulses_reset_and_identifies() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock, 0xA1);
        let mut session = Session::new(mock, Interface::Spi);
        let info = session.connect(true, None).unwrap();
        assert_eq!(info.flash_kb, 32);

        // assert then release
        let mock = session.bsl.transport_mut();
        assert_eq!(mock.reset_events, [true, false]);
        assert_eq!(mock.written[0], crate::bsl::SYNCH);
    }

    #[test]
    fn program_writes_loaded_file() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock, 0xA1);
        mock.queue_bytes(&[ACK, ACK, ACK]);

        let mut session = Session::new(mock, Interface::UartDuplex);
        // UART mode override skips the probe
        session.connect(false, Some(Interface::UartDuplex)).unwrap();

        session
            .load(FileFormat::Table, b"0x8000\t0xAA\n0x8001\t0xBB\n", 0)
            .unwrap();
        let written = session.program(&mut NoProgress).unwrap();
        assert_eq!(written, 2);
    }

    #[test]
    fn cancellation_aborts_between_transactions() {
        struct CancelNow;
        impl Progress for CancelNow {
            fn cancelled(&self) -> bool {
                true
            }
        }

        let mut mock = MockTransport::new();
        queue_handshake(&mut mock, 0xA1);
        // two chunks worth of acks; the abort lands after the first
        mock.queue_bytes(&[ACK; 6]);

        let mut session = Session::new(mock, Interface::UartDuplex);
        session.connect(false, Some(Interface::UartDuplex)).unwrap();
        session.image_mut().fill(0x8000, 0x80FF, 0x00).unwrap();
        assert_eq!(session.program(&mut CancelNow), Err(Error::Cancelled));
        // the session is tainted afterwards
        assert_eq!(session.program(&mut NoProgress), Err(Error::PortNotOpen));
    }

    #[test]
    fn read_out_returns_fresh_image() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock, 0xA1);
        mock.queue_bytes(&[ACK, ACK, ACK]);
        mock.queue_bytes(&[0x01, 0x02]);

        let mut session = Session::new(mock, Interface::UartDuplex);
        session.connect(false, Some(Interface::UartDuplex)).unwrap();
        let out = session.read_out(0x4800, 0x4801, &mut NoProgress).unwrap();
        assert_eq!(out.get(0x4800), Some(0x01));
        assert_eq!(out.get(0x4801), Some(0x02));
        // the session image is untouched
        assert_eq!(session.image().extent(0, 0xFFFF).unwrap().count, 0);
    }

    #[test]
    fn erase_sectors_follow_image_extent() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock, 0xA1);
        mock.queue_bytes(&[ACK, ACK]);

        let mut session = Session::new(mock, Interface::UartDuplex);
        session.connect(false, Some(Interface::UartDuplex)).unwrap();
        // spans sectors 0 and 1, plus a byte in sector 4
        session.image_mut().fill(0x83FE, 0x8401, 0xEE).unwrap();
        session.image_mut().set(0x9000, 0x55).unwrap();
        session.erase_for_image().unwrap();

        let written = &session.bsl.transport_mut().written;
        assert_eq!(&written[2..], &[0x02, 0x00, 0x01, 0x04, 0x07]);
    }

    #[test]
    fn export_round_trips_through_load() {
        let mut session = Session::new(MockTransport::new(), Interface::UartDuplex);
        session
            .load(FileFormat::Binary, &[0x11, 0x22, 0x33], 0x8000)
            .unwrap();
        let out = session.export(FileFormat::IntelHex).unwrap();

        let mut session2 = Session::new(MockTransport::new(), Interface::UartDuplex);
        session2.load(FileFormat::IntelHex, &out, 0).unwrap();
        assert_eq!(session2.image().get(0x8002), Some(0x33));
    }
}
