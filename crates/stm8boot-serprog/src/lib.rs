//! SPI bridge transport speaking the serprog protocol
//!
//! A serprog firmware (flashprog/flashrom's serial programmer protocol)
//! on a USB serial adapter acts as the SPI master for the target's
//! bootloader interface. The bridge is initialized once (synchronize,
//! capability query, bus selection); afterwards every core transport
//! call maps to an `O_SPIOP` transfer.

mod device;
mod error;
pub mod protocol;

pub use device::SerprogBridge;
pub use error::SerprogError;

/// Result type for serprog bridge operations
pub type Result<T> = std::result::Result<T, SerprogError>;
