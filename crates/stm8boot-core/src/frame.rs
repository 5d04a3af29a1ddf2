//! Frame layer
//!
//! Byte-level framing on top of a [`Transport`]: command/complement
//! pairs, payload XOR checksums, ACK handling, half-duplex echo
//! consumption and the SPI BUSY poll. Echo suppression lives entirely
//! here; the protocol engine above never sees echo bytes.

use core::fmt;

use crate::bsl::{ACK, BUSY, NACK};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default timeout for one byte on the wire
pub const TIMEOUT_BYTE_MS: u32 = 100;
/// Default timeout for a full response
pub const TIMEOUT_RESPONSE_MS: u32 = 1_000;
/// Timeout for the acknowledge that terminates an erase
pub const TIMEOUT_ERASE_MS: u32 = 10_000;

/// Spacing between SPI BUSY polls
const BUSY_POLL_DELAY_US: u32 = 5_000;

/// Physical interface and UART wiring mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    /// UART with separate RX/TX, no echo
    UartDuplex,
    /// UART reply mode: the target echoes every received byte
    UartReply,
    /// Two-wire UART: the target echoes the complement of every byte
    UartTwoWire,
    /// SPI: the target signals BUSY until a response is ready
    Spi,
}

impl Interface {
    /// Whether this is a UART wiring (mode detection applies)
    pub fn is_uart(&self) -> bool {
        !matches!(self, Self::Spi)
    }

    /// Whether the target echoes transmitted bytes
    fn has_echo(&self) -> bool {
        matches!(self, Self::UartReply | Self::UartTwoWire)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UartDuplex => write!(f, "UART (full duplex)"),
            Self::UartReply => write!(f, "UART (reply mode)"),
            Self::UartTwoWire => write!(f, "UART (two-wire)"),
            Self::Spi => write!(f, "SPI"),
        }
    }
}

/// Acknowledge byte from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Request accepted
    Ack,
    /// Request rejected
    Nack,
}

/// A framed connection to the target bootloader
pub struct Link<T> {
    transport: T,
    interface: Interface,
}

impl<T: Transport> Link<T> {
    /// Wrap a transport with the given interface mode
    pub fn new(transport: T, interface: Interface) -> Self {
        Self {
            transport,
            interface,
        }
    }

    /// Current interface mode
    pub fn interface(&self) -> Interface {
        self.interface
    }

    /// Switch the interface mode (after UART mode detection)
    pub fn set_interface(&mut self, interface: Interface) {
        self.interface = interface;
    }

    /// Direct access to the transport (reset pulsing, delays)
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Drop pending input
    pub fn flush(&mut self) -> Result<()> {
        self.transport.flush()
    }

    /// Send bytes, consuming one echo per byte in the echoed UART modes.
    /// An echo that differs from the expected value fails the frame.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.interface.has_echo() {
            return self.transport.send(data);
        }
        for &b in data {
            self.transport.send(&[b])?;
            let echo = self
                .recv_byte(TIMEOUT_BYTE_MS)?
                .ok_or(Error::ResponseTimeout)?;
            let expected = match self.interface {
                Interface::UartReply => b,
                Interface::UartTwoWire => !b,
                _ => unreachable!(),
            };
            if echo != expected {
                log::warn!("echo mismatch: sent 0x{:02X}, got 0x{:02X}", b, echo);
                return Err(Error::ResponseUnexpected(echo));
            }
        }
        Ok(())
    }

    /// Send a command byte followed by its complement
    pub fn send_command(&mut self, cmd: u8) -> Result<()> {
        self.send(&[cmd, cmd ^ 0xFF])
    }

    /// Send a payload followed by the XOR of its bytes
    pub fn send_payload(&mut self, data: &[u8]) -> Result<()> {
        self.send(data)?;
        let chk = data.iter().fold(0u8, |acc, b| acc ^ b);
        self.send(&[chk])
    }

    /// One byte from the target, `None` on timeout
    pub fn recv_byte(&mut self, timeout_ms: u32) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.transport.recv(&mut buf, timeout_ms)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// Fill `buf` from the target, with a per-byte timeout ceiling
    pub fn recv_exact(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.transport.recv(&mut buf[done..], timeout_ms)?;
            if n == 0 {
                return Err(Error::ResponseTimeout);
            }
            done += n;
        }
        Ok(())
    }

    /// The target's acknowledge byte. On SPI, BUSY bytes are polled out
    /// of the stream until ACK or NACK appears, within the timeout.
    pub fn recv_ack(&mut self, timeout_ms: u32) -> Result<Ack> {
        let mut waited_us = 0u32;
        loop {
            let byte = self
                .recv_byte(timeout_ms)?
                .ok_or(Error::ResponseTimeout)?;
            match byte {
                ACK => return Ok(Ack::Ack),
                NACK => return Ok(Ack::Nack),
                BUSY if self.interface == Interface::Spi => {
                    waited_us += BUSY_POLL_DELAY_US;
                    if waited_us / 1000 >= timeout_ms {
                        return Err(Error::ResponseTimeout);
                    }
                    self.transport.delay_us(BUSY_POLL_DELAY_US);
                }
                other => return Err(Error::ResponseUnexpected(other)),
            }
        }
    }

    /// The acknowledge, treating NACK as an error
    pub fn expect_ack(&mut self, timeout_ms: u32) -> Result<()> {
        match self.recv_ack(timeout_ms)? {
            Ack::Ack => Ok(()),
            Ack::Nack => Err(Error::ResponseNack),
        }
    }
}
