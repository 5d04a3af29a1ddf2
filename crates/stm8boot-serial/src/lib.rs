//! UART transport for the STM8 ROM bootloader
//!
//! Opens a serial port with the 8E1 framing the bootloader expects and
//! implements the core [`Transport`] trait on top of it. The DTR or RTS
//! handshake line can be wired to the target reset for automatic entry
//! into the bootloader.

mod error;

pub use error::SerialError;

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use stm8boot_core::error::{Error as CoreError, Result as CoreResult};
use stm8boot_core::transport::Transport;

/// Result type for serial transport operations
pub type Result<T> = std::result::Result<T, SerialError>;

/// Handshake line wired to the target reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetLine {
    /// No reset wiring, enter the bootloader manually
    #[default]
    None,
    /// Reset on DTR
    Dtr,
    /// Reset on RTS
    Rts,
}

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    reset_line: ResetLine,
}

impl SerialTransport {
    /// Open `device` at `baud` with the bootloader's 8E1 framing
    pub fn open(device: &str, baud: u32, reset_line: ResetLine) -> Result<Self> {
        let port = serialport::new(device, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;

        log::info!("opened serial port {} at {} baud", device, baud);

        Ok(Self { port, reset_line })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, data: &[u8]) -> CoreResult<()> {
        self.port.write_all(data).map_err(|e| {
            log::error!("serial write failed: {}", e);
            CoreError::CannotSend
        })?;
        self.port.flush().map_err(|_| CoreError::CannotSend)
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> CoreResult<usize> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms as u64))
            .map_err(|_| CoreError::PortNotOpen)?;

        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                log::error!("serial read failed: {}", e);
                Err(CoreError::ResponseTimeout)
            }
        }
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|_| CoreError::PortNotOpen)
    }

    fn set_reset_line(&mut self, level: bool) -> CoreResult<()> {
        let result = match self.reset_line {
            ResetLine::None => {
                log::debug!("no reset line configured, skipping reset");
                return Ok(());
            }
            ResetLine::Dtr => self.port.write_data_terminal_ready(level),
            ResetLine::Rts => self.port.write_request_to_send(level),
        };
        result.map_err(|e| {
            log::error!("cannot drive reset line: {}", e);
            CoreError::PortNotOpen
        })
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}
