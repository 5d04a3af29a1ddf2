//! Error types for stm8boot-core
//!
//! A single no_std compatible error type shared by the image, the codecs
//! and the protocol engine. Every variant carries the context needed to
//! diagnose the failure (line number, address, received byte).

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Transport errors
    /// Port is not open or the session has been closed
    PortNotOpen,
    /// Sending bytes to the port failed
    CannotSend,
    /// No response within the timeout
    ResponseTimeout,
    /// Received a byte that does not fit the protocol at this position
    ResponseUnexpected(u8),
    /// Bootloader rejected the request with NACK
    ResponseNack,

    // Protocol errors
    /// Synchronization failed after the retry budget
    TooManySyncAttempts,
    /// UART mode probe exhausted without a conclusive echo pattern
    CannotDetermineUartMode,
    /// BSL version byte is not in the device table
    CannotIdentifyFamily(u8),
    /// No RAM routine available for this device
    CannotIdentifyDevice,
    /// GET opcode missing from the advertised command set
    IncorrectGetCode,
    /// READ opcode missing from the advertised command set
    IncorrectReadCode,
    /// WRITE opcode missing from the advertised command set
    IncorrectWriteCode,
    /// ERASE opcode missing from the advertised command set
    IncorrectEraseCode,
    /// GO opcode missing from the advertised command set
    IncorrectGoCode,
    /// Physical interface not recognized
    UnknownInterface,
    /// Target NACKed the address phase: address does not exist on this device
    AddressNotExist(u32),
    /// Read-back byte differs from the image
    VerifyMismatch {
        /// First differing address
        addr: u32,
        /// Byte expected from the image
        expected: u8,
        /// Byte read from the device
        found: u8,
    },
    /// Operation aborted between transactions
    Cancelled,

    // Memory range errors
    /// Range start is above range end
    AddressStartGreaterEnd {
        /// Requested range start
        start: u32,
        /// Requested range end
        end: u32,
    },
    /// Range start is beyond the image capacity
    AddressStartGreaterBuffer(u32),
    /// Range end is beyond the image capacity
    AddressEndGreaterBuffer(u32),

    // File codec errors
    /// Input file could not be opened
    FailedOpen,
    /// Output file could not be created
    FailedCreate,
    /// File content does not fit the image capacity
    FileBufferExceeded,
    /// S-record line does not start with 'S'
    SRecordInvalidStart {
        /// 1-based line number
        line: u32,
    },
    /// S-record address beyond the image capacity
    SRecordAddressOverflow {
        /// 1-based line number
        line: u32,
    },
    /// S-record checksum mismatch
    SRecordChecksum {
        /// 1-based line number
        line: u32,
        /// Checksum computed over the record
        expected: u8,
        /// Checksum read from the record
        found: u8,
    },
    /// Intel HEX line does not start with ':'
    HexInvalidStart {
        /// 1-based line number
        line: u32,
    },
    /// Intel HEX address beyond the image capacity
    HexAddressOverflow {
        /// 1-based line number
        line: u32,
    },
    /// Intel HEX record type not supported
    HexUnsupportedType {
        /// 1-based line number
        line: u32,
        /// Offending record type
        record_type: u8,
    },
    /// Intel HEX checksum mismatch
    HexChecksum {
        /// 1-based line number
        line: u32,
        /// Checksum computed over the record
        expected: u8,
        /// Checksum read from the record
        found: u8,
    },
    /// Character outside the permitted set for this format
    InvalidCharacter {
        /// 1-based line number
        line: u32,
    },
}

impl Error {
    /// Whether the protocol engine may retry the transaction that failed
    /// with this error. Only timeouts and plain NACKs are retried;
    /// structural protocol errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResponseTimeout | Self::ResponseNack)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortNotOpen => write!(f, "port not open"),
            Self::CannotSend => write!(f, "cannot send to port"),
            Self::ResponseTimeout => write!(f, "response timeout"),
            Self::ResponseUnexpected(b) => write!(f, "unexpected response 0x{:02X}", b),
            Self::ResponseNack => write!(f, "NACK received from bootloader"),
            Self::TooManySyncAttempts => write!(f, "too many synchronization attempts"),
            Self::CannotDetermineUartMode => write!(f, "cannot determine UART mode"),
            Self::CannotIdentifyFamily(v) => {
                write!(f, "cannot identify device family (BSL version 0x{:02X})", v)
            }
            Self::CannotIdentifyDevice => write!(f, "no RAM routine for this device"),
            Self::IncorrectGetCode => write!(f, "bootloader reports no GET command"),
            Self::IncorrectReadCode => write!(f, "bootloader reports no READ command"),
            Self::IncorrectWriteCode => write!(f, "bootloader reports no WRITE command"),
            Self::IncorrectEraseCode => write!(f, "bootloader reports no ERASE command"),
            Self::IncorrectGoCode => write!(f, "bootloader reports no GO command"),
            Self::UnknownInterface => write!(f, "unknown physical interface"),
            Self::AddressNotExist(a) => write!(f, "address 0x{:06X} does not exist", a),
            Self::VerifyMismatch {
                addr,
                expected,
                found,
            } => write!(
                f,
                "verify failed at 0x{:06X} (expected 0x{:02X}, read 0x{:02X})",
                addr, expected, found
            ),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::AddressStartGreaterEnd { start, end } => write!(
                f,
                "start address 0x{:06X} above end address 0x{:06X}",
                start, end
            ),
            Self::AddressStartGreaterBuffer(a) => {
                write!(f, "start address 0x{:06X} beyond image capacity", a)
            }
            Self::AddressEndGreaterBuffer(a) => {
                write!(f, "end address 0x{:06X} beyond image capacity", a)
            }
            Self::FailedOpen => write!(f, "failed to open file"),
            Self::FailedCreate => write!(f, "failed to create file"),
            Self::FileBufferExceeded => write!(f, "file content exceeds image capacity"),
            Self::SRecordInvalidStart { line } => {
                write!(f, "line {}: S-record does not start with 'S'", line)
            }
            Self::SRecordAddressOverflow { line } => {
                write!(f, "line {}: S-record address beyond image capacity", line)
            }
            Self::SRecordChecksum {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {}: S-record checksum error (0x{:02X} vs. 0x{:02X})",
                line, found, expected
            ),
            Self::HexInvalidStart { line } => {
                write!(f, "line {}: Intel HEX record does not start with ':'", line)
            }
            Self::HexAddressOverflow { line } => {
                write!(f, "line {}: Intel HEX address beyond image capacity", line)
            }
            Self::HexUnsupportedType { line, record_type } => write!(
                f,
                "line {}: unsupported Intel HEX record type {:02}",
                line, record_type
            ),
            Self::HexChecksum {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {}: Intel HEX checksum error (0x{:02X} vs. 0x{:02X})",
                line, found, expected
            ),
            Self::InvalidCharacter { line } => write!(f, "line {}: invalid character", line),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
