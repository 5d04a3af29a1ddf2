//! Serprog bridge device
//!
//! Opens the serial port, synchronizes the serprog protocol and checks
//! the capabilities the bootloader link needs. Implements the core
//! [`Transport`] trait by mapping `send` to a write-only SPI operation
//! and `recv` to a read-only one (the bridge clocks out idle bytes).

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use stm8boot_core::error::{Error as CoreError, Result as CoreResult};
use stm8boot_core::transport::Transport;

use crate::error::SerprogError;
use crate::protocol::*;
use crate::Result;

/// Bridge response timeout
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Serprog SPI bridge
pub struct SerprogBridge {
    port: Box<dyn SerialPort>,
    cmdmap: CommandMap,
}

impl SerprogBridge {
    /// Open the bridge on `device` at `baud` and initialize it:
    /// synchronize, verify the protocol version, query the command map,
    /// select the SPI bus and optionally set the SPI clock
    pub fn open(device: &str, baud: u32, spi_clock_hz: Option<u32>) -> Result<Self> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(RESPONSE_TIMEOUT)
            .open()?;

        let mut bridge = Self {
            port,
            cmdmap: CommandMap::default(),
        };

        bridge.synchronize()?;
        log::debug!("serprog: synchronized");

        let mut version = [0u8; 2];
        bridge.do_command(S_CMD_Q_IFACE, &[], &mut version)?;
        let version = u16::from_le_bytes(version);
        if version != SERPROG_PROTOCOL_VERSION {
            return Err(SerprogError::UnsupportedVersion(version));
        }

        let mut bitmap = [0u8; CMDMAP_SIZE];
        bridge.do_command(S_CMD_Q_CMDMAP, &[], &mut bitmap)?;
        bridge.cmdmap = CommandMap::new(bitmap);

        if !bridge.cmdmap.is_supported(S_CMD_O_SPIOP) {
            return Err(SerprogError::SpiNotSupported);
        }

        if bridge.cmdmap.is_supported(S_CMD_Q_PGMNAME) {
            let mut name = [0u8; 16];
            if bridge.do_command(S_CMD_Q_PGMNAME, &[], &mut name).is_ok() {
                let len = name.iter().position(|&c| c == 0).unwrap_or(16);
                log::info!(
                    "serprog: programmer is \"{}\"",
                    String::from_utf8_lossy(&name[..len])
                );
            }
        }

        bridge.do_command(S_CMD_S_BUSTYPE, &[BUS_SPI], &mut [])?;

        if let Some(freq) = spi_clock_hz {
            bridge.set_spi_speed(freq)?;
        }

        // enable output drivers if the firmware gates them
        if bridge.cmdmap.is_supported(S_CMD_S_PIN_STATE)
            && bridge.do_command(S_CMD_S_PIN_STATE, &[1], &mut []).is_ok()
        {
            log::debug!("serprog: output drivers enabled");
        }

        Ok(bridge)
    }

    /// Set the SPI clock frequency, returning what the bridge chose
    pub fn set_spi_speed(&mut self, freq_hz: u32) -> Result<u32> {
        if !self.cmdmap.is_supported(S_CMD_S_SPI_FREQ) {
            log::warn!("serprog: bridge cannot set the SPI clock");
            return Err(SerprogError::CommandNotSupported(S_CMD_S_SPI_FREQ));
        }
        let mut actual = [0u8; 4];
        self.do_command(S_CMD_S_SPI_FREQ, &freq_hz.to_le_bytes(), &mut actual)?;
        let actual = u32::from_le_bytes(actual);
        log::info!("serprog: SPI clock {} Hz (requested {})", actual, freq_hz);
        Ok(actual)
    }

    /// One SPI transaction: shift out `write_data`, then clock
    /// `read_buf.len()` response bytes
    fn spi_op(&mut self, write_data: &[u8], read_buf: &mut [u8]) -> Result<()> {
        let mut params = Vec::with_capacity(6 + write_data.len());
        params.extend_from_slice(&(write_data.len() as u32).to_le_bytes()[..3]);
        params.extend_from_slice(&(read_buf.len() as u32).to_le_bytes()[..3]);
        params.extend_from_slice(write_data);
        self.do_command(S_CMD_O_SPIOP, &params, read_buf)
    }

    fn synchronize(&mut self) -> Result<()> {
        if self.test_sync()? {
            return Ok(());
        }

        log::debug!("serprog: attempting to synchronize");

        // NOPs reset the firmware's command parser
        self.port.write_all(&[S_CMD_NOP; 8])?;

        // drain whatever the firmware answered
        let mut buf = [0u8; 512];
        self.port
            .set_timeout(Duration::from_millis(10))
            .map_err(SerprogError::from)?;
        for _ in 0..1024 {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        self.port.set_timeout(RESPONSE_TIMEOUT)?;

        for _ in 0..8 {
            if self.test_sync()? {
                return Ok(());
            }
        }
        Err(SerprogError::SyncFailed)
    }

    /// Probe with SYNCNOP, which answers NAK then ACK when the parser is
    /// in its idle state
    fn test_sync(&mut self) -> Result<bool> {
        self.port.write_all(&[S_CMD_SYNCNOP])?;
        let mut c = [0u8];
        if self.read_byte(&mut c)?.is_none() || c[0] != S_NAK {
            return Ok(false);
        }
        if self.read_byte(&mut c)?.is_none() || c[0] != S_ACK {
            return Ok(false);
        }
        Ok(true)
    }

    fn read_byte(&mut self, buf: &mut [u8; 1]) -> Result<Option<()>> {
        match self.port.read_exact(buf) {
            Ok(()) => Ok(Some(())),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Execute one serprog command: opcode, parameters, ACK, then the
    /// fixed-size response
    fn do_command(&mut self, cmd: u8, params: &[u8], ret_buf: &mut [u8]) -> Result<()> {
        self.port.write_all(&[cmd])?;
        if !params.is_empty() {
            self.port.write_all(params)?;
        }

        let mut response = [0u8];
        self.port.read_exact(&mut response)?;
        match response[0] {
            S_ACK => {}
            S_NAK => return Err(SerprogError::Nak(cmd)),
            other => {
                return Err(SerprogError::InvalidResponse {
                    command: cmd,
                    response: other,
                })
            }
        }

        if !ret_buf.is_empty() {
            self.port.read_exact(ret_buf)?;
        }
        Ok(())
    }
}

impl Transport for SerprogBridge {
    fn send(&mut self, data: &[u8]) -> CoreResult<()> {
        self.spi_op(data, &mut []).map_err(|e| {
            log::error!("serprog: SPI write failed: {}", e);
            CoreError::CannotSend
        })
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> CoreResult<usize> {
        let _ = self
            .port
            .set_timeout(Duration::from_millis(timeout_ms as u64));
        let result = self.spi_op(&[], buf);
        let _ = self.port.set_timeout(RESPONSE_TIMEOUT);
        match result {
            Ok(()) => Ok(buf.len()),
            Err(SerprogError::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                log::error!("serprog: SPI read failed: {}", e);
                Err(CoreError::ResponseTimeout)
            }
        }
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|_| CoreError::PortNotOpen)
    }

    fn set_reset_line(&mut self, _level: bool) -> CoreResult<()> {
        // the serprog protocol has no target reset pin; entry into the
        // bootloader has to happen on the target side
        log::debug!("serprog: bridge cannot drive the target reset line");
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}
