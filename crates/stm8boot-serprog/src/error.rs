//! Error types for the serprog bridge

use thiserror::Error;

/// Serprog bridge errors
#[derive(Debug, Error)]
pub enum SerprogError {
    /// Failed to synchronize the bridge protocol
    #[error("protocol synchronization failed")]
    SyncFailed,

    /// Unsupported protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Command not supported by the bridge
    #[error("command 0x{0:02X} not supported")]
    CommandNotSupported(u8),

    /// SPI bus not supported by the bridge
    #[error("SPI bus not supported by programmer")]
    SpiNotSupported,

    /// NAK response received
    #[error("NAK received for command 0x{0:02X}")]
    Nak(u8),

    /// Invalid response received
    #[error("invalid response 0x{response:02X} for command 0x{command:02X}")]
    InvalidResponse {
        /// Command that was sent
        command: u8,
        /// Byte that came back instead of ACK/NAK
        response: u8,
    },

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
