//! stm8boot-core - Core library for STM8 ROM bootloader programming
//!
//! This crate implements the host side of the STM8 bootloader (BSL)
//! protocol: synchronization, device identification, memory read/write,
//! flash erase and jump-to-address, together with the sparse memory image
//! and the hex file codecs the protocol operates on.
//!
//! The byte transport (UART, SPI device, SPI bridge) is abstracted behind
//! the [`transport::Transport`] trait; concrete implementations live in the
//! sibling transport crates.
//!
//! # Example
//!
//! ```ignore
//! use stm8boot_core::{frame::Interface, session::Session};
//!
//! fn flash<T: stm8boot_core::transport::Transport>(port: T) {
//!     let mut session = Session::new(port, Interface::UartDuplex);
//!     match session.connect(true, None) {
//!         Ok(info) => println!("found {} with {} kB flash", info.family, info.flash_kb),
//!         Err(e) => println!("connect failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bsl;
pub mod device;
pub mod error;
pub mod frame;
pub mod hexfile;
pub mod image;
pub mod routine;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
