//! Error types for the spidev transport

use thiserror::Error;

/// Linux spidev transport errors
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    /// No device path given
    #[error("no SPI device specified (expected /dev/spidevX.Y)")]
    NoDevice,

    /// Failed to open the device node
    #[error("failed to open {path}: {source}")]
    OpenFailed {
        /// Device path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Configuring the device failed
    #[error("failed to configure SPI device: {0}")]
    ConfigFailed(std::io::Error),

    /// An SPI transfer ioctl failed
    #[error("SPI transfer failed: {0}")]
    TransferFailed(std::io::Error),
}
