//! Bootloader protocol engine
//!
//! Drives the ROM bootloader through its command set: synchronize,
//! identify, READ, WRITE, ERASE, GO. The engine owns the session state
//! machine; after a fatal error the session is tainted and only a new
//! synchronization reopens it.

pub mod plan;

use alloc::vec;
use alloc::vec::Vec;

use crate::device::{self, CommandSet, TargetInfo};
use crate::error::{Error, Result};
use crate::frame::{
    Ack, Interface, Link, TIMEOUT_BYTE_MS, TIMEOUT_ERASE_MS, TIMEOUT_RESPONSE_MS,
};
use crate::hexfile::ihex;
use crate::image::MemoryImage;
use crate::routine;
use crate::transport::Transport;

/// Synchronization byte
pub const SYNCH: u8 = 0x7F;
/// Acknowledge
pub const ACK: u8 = 0x79;
/// No-acknowledge
pub const NACK: u8 = 0x1F;
/// SPI busy marker
pub const BUSY: u8 = 0xAA;

/// GET command: bootloader version and supported commands
pub const CMD_GET: u8 = 0x00;
/// READ command: up to 256 bytes of memory
pub const CMD_READ: u8 = 0x11;
/// GO command: jump to an address
pub const CMD_GO: u8 = 0x21;
/// WRITE command: up to 128 bytes to RAM or flash
pub const CMD_WRITE: u8 = 0x31;
/// ERASE command: flash sectors or mass erase
pub const CMD_ERASE: u8 = 0x43;

/// Mass erase selector in the ERASE payload
const ERASE_MASS: u8 = 0xFF;

/// Synchronization attempts before giving up
const SYNC_ATTEMPTS: u32 = 5;
/// UART mode probe attempts
const UART_PROBE_ATTEMPTS: u32 = 5;
/// Retries per transaction on timeout or NACK
const TRANSACTION_RETRIES: u32 = 3;

/// Engine session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet synchronized
    Idle,
    /// Synchronized, transactions allowed
    Ready,
    /// GO issued, the target left the bootloader
    Done,
    /// A fatal error occurred; a new sync is required
    Tainted,
}

/// Protocol engine on top of a framed link
pub struct Bootloader<T> {
    link: Link<T>,
    state: SessionState,
    target: Option<TargetInfo>,
    routine_resident: bool,
}

impl<T: Transport> Bootloader<T> {
    /// Create an engine over `transport` in the given interface mode
    pub fn new(transport: T, interface: Interface) -> Self {
        Self {
            link: Link::new(transport, interface),
            state: SessionState::Idle,
            target: None,
            routine_resident: false,
        }
    }

    /// Current interface mode
    pub fn interface(&self) -> Interface {
        self.link.interface()
    }

    /// Force an interface mode instead of probing for it
    pub fn set_interface(&mut self, interface: Interface) {
        self.link.set_interface(interface);
    }

    /// The identified target, if the identify phase has run
    pub fn target(&self) -> Option<&TargetInfo> {
        self.target.as_ref()
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Direct transport access (reset pulsing)
    pub fn transport_mut(&mut self) -> &mut T {
        self.link.transport_mut()
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            _ => Err(Error::PortNotOpen),
        }
    }

    /// Synchronize with the bootloader. ACK and NACK are both accepted
    /// (NACK means the target was already synchronized). Reopens a
    /// tainted session and discards any previous identification.
    pub fn sync(&mut self) -> Result<()> {
        self.link.flush()?;
        for attempt in 1..=SYNC_ATTEMPTS {
            self.link.send(&[SYNCH])?;
            match self.link.recv_byte(TIMEOUT_RESPONSE_MS)? {
                Some(ACK) | Some(NACK) => {
                    log::debug!("synchronized after {} attempt(s)", attempt);
                    self.state = SessionState::Ready;
                    self.target = None;
                    self.routine_resident = false;
                    return Ok(());
                }
                Some(other) => {
                    log::debug!("sync attempt {}: unexpected 0x{:02X}", attempt, other);
                }
                None => {
                    log::debug!("sync attempt {}: timeout", attempt);
                }
            }
        }
        Err(Error::TooManySyncAttempts)
    }

    /// Determine the UART wiring by probing with a synchronization byte
    /// and counting echoes: none means full duplex, a matching echo
    /// reply mode, an inverted echo two-wire. The link switches to the
    /// detected mode.
    pub fn detect_uart_mode(&mut self) -> Result<Interface> {
        if !self.link.interface().is_uart() {
            return Ok(self.link.interface());
        }
        self.ensure_ready()?;

        for _ in 0..UART_PROBE_ATTEMPTS {
            // bypass the link's echo handling, the wiring is what we probe
            self.link.transport_mut().send(&[SYNCH])?;
            let first = self.link.recv_byte(TIMEOUT_RESPONSE_MS)?;
            let mode = match first {
                Some(ACK) | Some(NACK) => Some(Interface::UartDuplex),
                Some(SYNCH) => Some(Interface::UartReply),
                Some(b) if b == !SYNCH => Some(Interface::UartTwoWire),
                _ => None,
            };
            if let Some(mode) = mode {
                if mode != Interface::UartDuplex {
                    // consume the ACK/NACK following the echo
                    let _ = self.link.recv_byte(TIMEOUT_BYTE_MS)?;
                }
                log::info!("detected {}", mode);
                self.link.set_interface(mode);
                return Ok(mode);
            }
            self.link.flush()?;
        }
        Err(Error::CannotDetermineUartMode)
    }

    /// Identify the target: GET the command set and bootloader version,
    /// derive family and flash size
    pub fn identify(&mut self) -> Result<TargetInfo> {
        self.ensure_ready()?;
        let (version, commands) = self.with_retry(|bsl| bsl.get_info())?;

        for (flag, err) in [
            (CommandSet::GET, Error::IncorrectGetCode),
            (CommandSet::READ, Error::IncorrectReadCode),
            (CommandSet::WRITE, Error::IncorrectWriteCode),
            (CommandSet::ERASE, Error::IncorrectEraseCode),
            (CommandSet::GO, Error::IncorrectGoCode),
        ] {
            if !commands.contains(flag) {
                self.state = SessionState::Tainted;
                return Err(err);
            }
        }

        let (family, flash_kb) = device::lookup_version(version).ok_or_else(|| {
            log::error!("unknown BSL version byte 0x{:02X}", version);
            Error::CannotIdentifyFamily(version)
        })?;

        let info = TargetInfo {
            family,
            bsl_version: version,
            flash_kb,
            commands,
        };
        log::info!(
            "found {} with {} kB flash, bootloader v{}",
            info.family,
            info.flash_kb,
            info.version_string()
        );
        self.target = Some(info);
        Ok(info)
    }

    fn get_info(&mut self) -> Result<(u8, CommandSet)> {
        self.link.send_command(CMD_GET)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        let count = self
            .link
            .recv_byte(TIMEOUT_BYTE_MS)?
            .ok_or(Error::ResponseTimeout)?;
        let version = self
            .link
            .recv_byte(TIMEOUT_BYTE_MS)?
            .ok_or(Error::ResponseTimeout)?;

        let mut opcodes = vec![0u8; count as usize];
        self.link.recv_exact(&mut opcodes, TIMEOUT_BYTE_MS)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        let mut commands = CommandSet::empty();
        for op in opcodes {
            match op {
                CMD_GET => commands |= CommandSet::GET,
                CMD_READ => commands |= CommandSet::READ,
                CMD_WRITE => commands |= CommandSet::WRITE,
                CMD_ERASE => commands |= CommandSet::ERASE,
                CMD_GO => commands |= CommandSet::GO,
                other => log::debug!("ignoring advertised command 0x{:02X}", other),
            }
        }
        Ok((version, commands))
    }

    /// Read `count` bytes starting at `addr` into the image, splitting
    /// into transactions of at most 256 bytes
    pub fn read(
        &mut self,
        addr: u32,
        count: u32,
        image: &mut MemoryImage,
        progress: &mut dyn FnMut(usize, usize) -> bool,
    ) -> Result<()> {
        self.ensure_ready()?;
        if count == 0 {
            return Ok(());
        }
        image.check_range(addr, addr + count - 1)?;

        let total = count as usize;
        let mut done = 0usize;
        for chunk in plan::plan_reads(addr, addr + count - 1) {
            let data = self.with_retry(|bsl| bsl.read_chunk(chunk.addr, chunk.len))?;
            for (i, &b) in data.iter().enumerate() {
                image.set(chunk.addr + i as u32, b)?;
            }
            done += data.len();
            if !progress(done, total) {
                self.state = SessionState::Tainted;
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    fn read_chunk(&mut self, addr: u32, len: u32) -> Result<Vec<u8>> {
        self.link.send_command(CMD_READ)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        self.link.send_payload(&addr.to_be_bytes())?;
        match self.link.recv_ack(TIMEOUT_RESPONSE_MS)? {
            Ack::Ack => {}
            Ack::Nack => return Err(Error::AddressNotExist(addr)),
        }

        let n = (len - 1) as u8;
        self.link.send(&[n, n ^ 0xFF])?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        let mut buf = vec![0u8; len as usize];
        self.link.recv_exact(&mut buf, TIMEOUT_BYTE_MS)?;
        Ok(buf)
    }

    /// Probe whether `addr` exists on the target with a one-byte READ.
    /// A NACK after the address phase is the non-fatal "no" answer.
    pub fn mem_check(&mut self, addr: u32) -> Result<bool> {
        self.ensure_ready()?;
        self.link.send_command(CMD_READ)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        self.link.send_payload(&addr.to_be_bytes())?;
        match self.link.recv_ack(TIMEOUT_RESPONSE_MS)? {
            Ack::Nack => return Ok(false),
            Ack::Ack => {}
        }

        self.link.send(&[0x00, 0xFF])?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;
        let mut buf = [0u8; 1];
        self.link.recv_exact(&mut buf, TIMEOUT_BYTE_MS)?;
        Ok(true)
    }

    /// Write the defined bytes of `[lo, hi]` to the target, side-loading
    /// the RAM routine before the first chunk that programs flash,
    /// EEPROM or option bytes on families that need it
    pub fn write_image(
        &mut self,
        image: &MemoryImage,
        lo: u32,
        hi: u32,
        progress: &mut dyn FnMut(usize, usize) -> bool,
    ) -> Result<()> {
        self.ensure_ready()?;
        let chunks = plan::plan_writes(image, lo, hi)?;
        let total: usize = chunks.iter().map(|c| c.len as usize).sum();

        let mut done = 0usize;
        for chunk in chunks {
            self.ensure_routine_for(chunk.addr, chunk.end())?;
            let data = image.get_bytes(chunk.addr, chunk.len);
            self.with_retry(|bsl| bsl.write_chunk(chunk.addr, &data))?;
            done += chunk.len as usize;
            if !progress(done, total) {
                self.state = SessionState::Tainted;
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    fn write_chunk(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        debug_assert!(!data.is_empty() && data.len() <= plan::MAX_WRITE_CHUNK as usize);

        self.link.send_command(CMD_WRITE)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        self.link.send_payload(&addr.to_be_bytes())?;
        match self.link.recv_ack(TIMEOUT_RESPONSE_MS)? {
            Ack::Ack => {}
            Ack::Nack => return Err(Error::AddressNotExist(addr)),
        }

        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push((data.len() - 1) as u8);
        payload.extend_from_slice(data);
        self.link.send_payload(&payload)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;
        Ok(())
    }

    /// Erase the given flash sectors
    pub fn erase_sectors(&mut self, sectors: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        if sectors.is_empty() {
            return Ok(());
        }
        self.ensure_routine_for(device::PFLASH_START, device::PFLASH_START)?;

        let mut payload = Vec::with_capacity(sectors.len() + 1);
        payload.push((sectors.len() - 1) as u8);
        payload.extend_from_slice(sectors);
        self.with_retry(|bsl| {
            bsl.link.send_command(CMD_ERASE)?;
            bsl.link.expect_ack(TIMEOUT_RESPONSE_MS)?;
            bsl.link.send_payload(&payload)?;
            bsl.link.expect_ack(TIMEOUT_ERASE_MS)
        })?;
        log::info!("erased {} flash sector(s)", sectors.len());
        Ok(())
    }

    /// Erase the whole program and data flash
    pub fn mass_erase(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.ensure_routine_for(device::PFLASH_START, device::PFLASH_START)?;

        self.with_retry(|bsl| {
            bsl.link.send_command(CMD_ERASE)?;
            bsl.link.expect_ack(TIMEOUT_RESPONSE_MS)?;
            bsl.link.send(&[ERASE_MASS, !ERASE_MASS])?;
            bsl.link.expect_ack(TIMEOUT_ERASE_MS)
        })?;
        log::info!("mass erase complete");
        Ok(())
    }

    /// Jump to `addr`. The target leaves the bootloader; the session is
    /// closed and refuses further transactions.
    pub fn go(&mut self, addr: u32) -> Result<()> {
        self.ensure_ready()?;

        self.link.send_command(CMD_GO)?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;
        self.link.send_payload(&addr.to_be_bytes())?;
        self.link.expect_ack(TIMEOUT_RESPONSE_MS)?;

        self.state = SessionState::Done;
        log::info!("jumped to 0x{:06X}, session closed", addr);
        Ok(())
    }

    /// Read back every defined byte of `[lo, hi]` and compare against
    /// the image. The first mismatch fails the operation.
    pub fn verify(
        &mut self,
        image: &MemoryImage,
        lo: u32,
        hi: u32,
        progress: &mut dyn FnMut(usize, usize) -> bool,
    ) -> Result<()> {
        self.ensure_ready()?;
        let runs = image.defined_runs(lo, hi)?;
        let total: usize = runs.iter().map(|r| r.len as usize).sum();

        let mut done = 0usize;
        for run in runs {
            for chunk in plan::plan_reads(run.start, run.start + run.len - 1) {
                let data = self.with_retry(|bsl| bsl.read_chunk(chunk.addr, chunk.len))?;
                for (i, &found) in data.iter().enumerate() {
                    let addr = chunk.addr + i as u32;
                    let expected = image.get(addr).unwrap_or(0);
                    if found != expected {
                        log::error!(
                            "verify mismatch at 0x{:06X}: wrote 0x{:02X}, read 0x{:02X}",
                            addr,
                            expected,
                            found
                        );
                        return Err(Error::VerifyMismatch {
                            addr,
                            expected,
                            found,
                        });
                    }
                }
                done += data.len();
                if !progress(done, total) {
                    self.state = SessionState::Tainted;
                    return Err(Error::Cancelled);
                }
            }
        }
        Ok(())
    }

    /// Side-load the RAM routine if a write or erase of `[lo, hi]`
    /// requires it and it is not yet resident
    fn ensure_routine_for(&mut self, lo: u32, hi: u32) -> Result<()> {
        let info = *self.target.as_ref().ok_or(Error::PortNotOpen)?;
        if self.routine_resident || !device::needs_ram_routine(info.family, lo, hi) {
            return Ok(());
        }
        self.load_ram_routine(&info)
    }

    fn load_ram_routine(&mut self, info: &TargetInfo) -> Result<()> {
        let blob = routine::find(info.family, info.flash_kb, info.bsl_version)?;
        log::info!(
            "uploading erase/write RAM routine for {} {} kB v{}",
            info.family,
            info.flash_kb,
            info.version_string()
        );

        let mut scratch = MemoryImage::new();
        ihex::decode(blob.as_bytes(), &mut scratch)?;

        // plain WRITE transactions into RAM, no routine gate here
        for chunk in plan::plan_writes(&scratch, 0, scratch.capacity() - 1)? {
            let data = scratch.get_bytes(chunk.addr, chunk.len);
            self.with_retry(|bsl| bsl.write_chunk(chunk.addr, &data))?;
        }
        self.routine_resident = true;
        Ok(())
    }

    /// Run one transaction, retrying on timeout or NACK and tainting the
    /// session when the transaction finally fails
    fn with_retry<R>(&mut self, mut f: impl FnMut(&mut Self) -> Result<R>) -> Result<R> {
        let mut retries = 0;
        loop {
            match f(self) {
                Ok(r) => return Ok(r),
                Err(e) if e.is_retryable() && retries < TRANSACTION_RETRIES => {
                    retries += 1;
                    log::warn!(
                        "transaction failed ({}), retry {}/{}",
                        e,
                        retries,
                        TRANSACTION_RETRIES
                    );
                    let _ = self.link.flush();
                }
                Err(e) => {
                    self.state = SessionState::Tainted;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Family;
    use crate::transport::mock::MockTransport;

    fn engine(mock: MockTransport) -> Bootloader<MockTransport> {
        Bootloader::new(mock, Interface::UartDuplex)
    }

    /// ACKs for sync, then a GET response for an STM8S 128 kB v2.1
    fn queue_handshake(mock: &mut MockTransport) {
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0x21]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
    }

    fn ready_engine(mock: MockTransport) -> Bootloader<MockTransport> {
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        let info = bsl.identify().unwrap();
        assert_eq!(info.family, Family::Stm8s);
        assert_eq!(info.flash_kb, 128);
        bsl.transport_mut().written.clear();
        bsl
    }

    #[test]
    fn sync_succeeds_within_budget() {
        let mut mock = MockTransport::new();
        for _ in 0..4 {
            mock.queue_timeout();
        }
        mock.queue_bytes(&[ACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.state(), SessionState::Ready);
        assert_eq!(bsl.transport_mut().written, [SYNCH; 5]);
    }

    #[test]
    fn sync_fails_on_sixth_attempt() {
        let mut mock = MockTransport::new();
        for _ in 0..5 {
            mock.queue_timeout();
        }
        mock.queue_bytes(&[ACK]);
        let mut bsl = engine(mock);
        assert_eq!(bsl.sync(), Err(Error::TooManySyncAttempts));
    }

    #[test]
    fn nack_counts_as_synchronized() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[NACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.state(), SessionState::Ready);
    }

    #[test]
    fn identify_parses_get_response() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        let bsl = ready_engine(mock);
        let info = bsl.target().unwrap();
        assert_eq!(info.bsl_version, 0x21);
        assert!(info.commands.contains(CommandSet::ERASE));
    }

    #[test]
    fn identify_reports_missing_write() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 4, 0x21]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.identify(), Err(Error::IncorrectWriteCode));
    }

    #[test]
    fn unknown_version_fails_identification() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0x55]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.identify(), Err(Error::CannotIdentifyFamily(0x55)));
    }

    #[test]
    fn read_framing_is_byte_exact() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_bytes(&[ACK]); // command
        mock.queue_bytes(&[ACK]); // address
        mock.queue_bytes(&[ACK]); // count
        mock.queue_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut bsl = ready_engine(mock);
        let mut img = MemoryImage::new();
        bsl.read(0x8000, 4, &mut img, &mut |_, _| true).unwrap();

        assert_eq!(
            bsl.transport_mut().written,
            [
                0x11, 0xEE, // READ + complement
                0x00, 0x00, 0x80, 0x00, 0x80, // address + XOR
                0x03, 0xFC, // count-1 + complement
            ]
        );
        assert_eq!(img.get(0x8000), Some(0xDE));
        assert_eq!(img.get(0x8003), Some(0xEF));
        assert_eq!(img.extent(0x8000, 0x8003).unwrap().count, 4);
    }

    #[test]
    fn read_retries_on_timeout() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_timeout(); // first attempt: no ack for the command
        mock.queue_bytes(&[ACK, ACK, ACK]);
        mock.queue_bytes(&[0x42]);

        let mut bsl = ready_engine(mock);
        let mut img = MemoryImage::new();
        bsl.read(0x8000, 1, &mut img, &mut |_, _| true).unwrap();
        assert_eq!(img.get(0x8000), Some(0x42));
    }

    #[test]
    fn structural_error_taints_session() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_bytes(&[0x33]); // junk where an ack belongs

        let mut bsl = ready_engine(mock);
        let mut img = MemoryImage::new();
        let err = bsl.read(0x8000, 1, &mut img, &mut |_, _| true);
        assert_eq!(err, Err(Error::ResponseUnexpected(0x33)));
        assert_eq!(bsl.state(), SessionState::Tainted);

        // tainted sessions refuse transactions until a new sync
        assert_eq!(
            bsl.read(0x8000, 1, &mut img, &mut |_, _| true),
            Err(Error::PortNotOpen)
        );
    }

    #[test]
    fn mem_check_returns_false_on_nack() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_bytes(&[ACK, NACK]);

        let mut bsl = ready_engine(mock);
        assert_eq!(bsl.mem_check(0xFFFF00), Ok(false));
        assert_eq!(bsl.state(), SessionState::Ready);
    }

    #[test]
    fn write_to_ram_needs_no_routine() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_bytes(&[ACK, ACK, ACK]);

        let mut bsl = ready_engine(mock);
        let mut img = MemoryImage::new();
        img.fill(0x00A0, 0x00A3, 0x12).unwrap();
        bsl.write_image(&img, 0, 0x3FFF, &mut |_, _| true).unwrap();

        assert_eq!(
            bsl.transport_mut().written,
            [
                0x31, 0xCE, // WRITE + complement
                0x00, 0x00, 0x00, 0xA0, 0xA0, // address + XOR
                0x03, 0x12, 0x12, 0x12, 0x12, 0x03 ^ 0x00, // len-1, data, XOR
            ]
        );
    }

    #[test]
    fn flash_write_uploads_routine_first() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0x24]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        // routine upload: 4 chunks of 3 acks, then the flash chunk
        mock.queue_bytes(&[ACK; 15]);

        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        bsl.identify().unwrap();
        bsl.transport_mut().written.clear();

        let mut img = MemoryImage::new();
        img.fill(0x8000, 0x803F, 0xA5).unwrap();
        bsl.write_image(&img, 0x8000, 0x803F, &mut |_, _| true).unwrap();

        let written = &bsl.transport_mut().written;
        // first transaction programs the routine into RAM at 0x00A0
        assert_eq!(&written[..7], &[0x31, 0xCE, 0x00, 0x00, 0x00, 0xA0, 0xA0]);
        // the flash chunk itself is the last transaction
        let flash_cmd = written
            .windows(7)
            .position(|w| w == [0x31, 0xCE, 0x00, 0x00, 0x80, 0x00, 0x80])
            .expect("flash write transaction present");
        assert!(flash_cmd > 0);
    }

    #[test]
    fn second_flash_write_skips_routine() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0x24]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK; 18]);

        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        bsl.identify().unwrap();

        let mut img = MemoryImage::new();
        img.fill(0x8000, 0x801F, 0xA5).unwrap();
        bsl.write_image(&img, 0x8000, 0x801F, &mut |_, _| true).unwrap();

        bsl.transport_mut().written.clear();
        bsl.write_image(&img, 0x8000, 0x801F, &mut |_, _| true).unwrap();
        // only one WRITE transaction: no second routine upload
        assert_eq!(&bsl.transport_mut().written[..2], &[0x31, 0xCE]);
        assert_eq!(
            bsl.transport_mut()
                .written
                .windows(2)
                .filter(|w| w == &[0x31, 0xCE])
                .count(),
            1
        );
    }

    #[test]
    fn stm8l_never_uploads_routine() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0xA1]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, ACK, ACK]);

        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        bsl.identify().unwrap();
        bsl.transport_mut().written.clear();

        let mut img = MemoryImage::new();
        img.fill(0x8000, 0x8003, 0x5A).unwrap();
        bsl.write_image(&img, 0x8000, 0x8003, &mut |_, _| true).unwrap();
        assert_eq!(&bsl.transport_mut().written[..2], &[0x31, 0xCE]);
    }

    #[test]
    fn mass_erase_framing() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0xA1]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, ACK]);

        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        bsl.identify().unwrap();
        bsl.transport_mut().written.clear();

        bsl.mass_erase().unwrap();
        assert_eq!(bsl.transport_mut().written, [0x43, 0xBC, 0xFF, 0x00]);
    }

    #[test]
    fn sector_erase_framing() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, 5, 0xA1]);
        mock.queue_bytes(&[CMD_GET, CMD_READ, CMD_GO, CMD_WRITE, CMD_ERASE]);
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[ACK, ACK]);

        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        bsl.identify().unwrap();
        bsl.transport_mut().written.clear();

        bsl.erase_sectors(&[0, 1, 2]).unwrap();
        assert_eq!(
            bsl.transport_mut().written,
            [0x43, 0xBC, 0x02, 0x00, 0x01, 0x02, 0x02 ^ 0x01 ^ 0x02]
        );
    }

    #[test]
    fn go_closes_the_session() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_bytes(&[ACK, ACK]);

        let mut bsl = ready_engine(mock);
        bsl.go(0x8000).unwrap();
        assert_eq!(bsl.state(), SessionState::Done);
        assert_eq!(
            bsl.transport_mut().written,
            [0x21, 0xDE, 0x00, 0x00, 0x80, 0x00, 0x80]
        );

        let mut img = MemoryImage::new();
        assert_eq!(
            bsl.read(0x8000, 1, &mut img, &mut |_, _| true),
            Err(Error::PortNotOpen)
        );
    }

    #[test]
    fn verify_reports_first_mismatch() {
        let mut mock = MockTransport::new();
        queue_handshake(&mut mock);
        mock.queue_bytes(&[ACK, ACK, ACK]);
        mock.queue_bytes(&[0xA5, 0xFF]);

        let mut bsl = ready_engine(mock);
        let mut img = MemoryImage::new();
        img.fill(0x8000, 0x8001, 0xA5).unwrap();
        assert_eq!(
            bsl.verify(&img, 0x8000, 0x8001, &mut |_, _| true),
            Err(Error::VerifyMismatch {
                addr: 0x8001,
                expected: 0xA5,
                found: 0xFF
            })
        );
    }

    #[test]
    fn uart_mode_detection() {
        // reply mode: echo of the probe byte, then a NACK
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]); // sync
        mock.queue_bytes(&[SYNCH, NACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.detect_uart_mode(), Ok(Interface::UartReply));
        assert_eq!(bsl.interface(), Interface::UartReply);

        // full duplex: the answer comes with no echo
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[NACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.detect_uart_mode(), Ok(Interface::UartDuplex));

        // two-wire: inverted echo
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        mock.queue_bytes(&[!SYNCH, NACK]);
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.detect_uart_mode(), Ok(Interface::UartTwoWire));
    }

    #[test]
    fn uart_mode_probe_exhausts() {
        let mut mock = MockTransport::new();
        mock.queue_bytes(&[ACK]);
        for _ in 0..UART_PROBE_ATTEMPTS {
            mock.queue_timeout();
        }
        let mut bsl = engine(mock);
        bsl.sync().unwrap();
        assert_eq!(bsl.detect_uart_mode(), Err(Error::CannotDetermineUartMode));
    }
}
