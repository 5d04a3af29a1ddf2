//! Error types for the serial transport

use thiserror::Error;

/// Serial transport errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
