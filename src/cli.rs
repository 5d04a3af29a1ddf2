//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stm8boot")]
#[command(author, version, about = "STM8 ROM bootloader programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// How to reach the target bootloader
#[derive(Args)]
pub struct ConnectionArgs {
    /// Serial port or SPI device path
    #[arg(short, long, global = true, default_value = "/dev/ttyUSB0")]
    pub port: String,

    /// Baud rate (UART and serprog bridge)
    #[arg(short, long, global = true, default_value_t = 115_200)]
    pub baud: u32,

    /// Physical interface to the target
    #[arg(short, long, global = true, value_enum, default_value_t = InterfaceArg::Uart)]
    pub interface: InterfaceArg,

    /// Skip UART mode detection and force a wiring
    #[arg(long, global = true, value_enum)]
    pub uart_mode: Option<UartModeArg>,

    /// Handshake line wired to the target reset
    #[arg(long, global = true, value_enum, default_value_t = ResetArg::None)]
    pub reset: ResetArg,

    /// SPI clock in Hz (SPI interfaces only)
    #[arg(long, global = true)]
    pub spi_clock_hz: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InterfaceArg {
    /// UART, directly or through a USB serial adapter
    Uart,
    /// Linux spidev device
    SpiDevice,
    /// serprog SPI bridge on a serial port
    SpiBridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UartModeArg {
    /// Separate RX/TX, no echo
    Duplex,
    /// Target echoes every byte
    Reply,
    /// Single-wire with inverted echo
    TwoWire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetArg {
    /// No automatic reset
    None,
    /// Pulse DTR
    Dtr,
    /// Pulse RTS
    Rts,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the bootloader and show the identified device
    Probe,

    /// Program one or more files into the target
    Write {
        /// Input files (format by extension: .s19/.hex/.txt/raw binary)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Base address for raw binary inputs
        #[arg(long, value_parser = parse_number, default_value = "0x8000")]
        base: u32,

        /// Erase the flash sectors covered by the image first
        #[arg(long)]
        erase: bool,

        /// Mass-erase the whole flash first
        #[arg(long)]
        mass_erase: bool,

        /// Read back and compare after writing
        #[arg(long)]
        verify: bool,

        /// Jump to ADDR (default: flash start) when done
        #[arg(long, value_name = "ADDR", value_parser = parse_number,
              num_args = 0..=1, default_missing_value = "0x8000")]
        go: Option<u32>,

        /// Keep only LO,HI of the loaded image
        #[arg(long, value_name = "LO,HI", value_parser = parse_range)]
        clip: Option<RangeSpec>,

        /// Drop LO,HI from the loaded image (repeatable)
        #[arg(long, value_name = "LO,HI", value_parser = parse_range)]
        cut: Vec<RangeSpec>,

        /// Fill LO,HI with VAL (repeatable)
        #[arg(long, value_name = "LO,HI,VAL", value_parser = parse_fill)]
        fill: Vec<FillSpec>,

        /// Copy LO,HI to DST (repeatable)
        #[arg(long, value_name = "LO,HI,DST", value_parser = parse_move)]
        copy: Vec<MoveSpec>,

        /// Move LO,HI to DST (repeatable)
        #[arg(long = "move", value_name = "LO,HI,DST", value_parser = parse_move)]
        move_range: Vec<MoveSpec>,
    },

    /// Read a memory region into a file
    Read {
        /// Output file (format by extension)
        output: PathBuf,

        /// First address to read
        #[arg(long, value_parser = parse_number)]
        start: u32,

        /// Last address to read (inclusive)
        #[arg(long, value_parser = parse_number)]
        end: u32,
    },

    /// Erase flash sectors or the whole flash
    Erase {
        /// Mass-erase the whole flash
        #[arg(long, conflicts_with_all = ["start", "end"])]
        mass: bool,

        /// First address of the range to erase
        #[arg(long, value_parser = parse_number, requires = "end")]
        start: Option<u32>,

        /// Last address of the range to erase (inclusive)
        #[arg(long, value_parser = parse_number, requires = "start")]
        end: Option<u32>,
    },

    /// Compare files against the target memory
    Verify {
        /// Input files (format by extension)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Base address for raw binary inputs
        #[arg(long, value_parser = parse_number, default_value = "0x8000")]
        base: u32,
    },

    /// Jump out of the bootloader
    Go {
        /// Target address (default: flash start)
        #[arg(value_parser = parse_number)]
        address: Option<u32>,
    },
}

/// An inclusive address range on the command line
#[derive(Debug, Clone, Copy)]
pub struct RangeSpec {
    pub lo: u32,
    pub hi: u32,
}

/// A fill request on the command line
#[derive(Debug, Clone, Copy)]
pub struct FillSpec {
    pub lo: u32,
    pub hi: u32,
    pub value: u8,
}

/// A copy/move request on the command line
#[derive(Debug, Clone, Copy)]
pub struct MoveSpec {
    pub lo: u32,
    pub hi: u32,
    pub dst: u32,
}

/// Parse a decimal or 0x-prefixed hex number
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(rest) => (rest, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn split_fields<const N: usize>(s: &str) -> Result<[u32; N], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated values", N));
    }
    let mut out = [0u32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = parse_number(part)?;
    }
    Ok(out)
}

fn parse_range(s: &str) -> Result<RangeSpec, String> {
    let [lo, hi] = split_fields(s)?;
    Ok(RangeSpec { lo, hi })
}

fn parse_fill(s: &str) -> Result<FillSpec, String> {
    let [lo, hi, value] = split_fields(s)?;
    let value = u8::try_from(value).map_err(|_| "fill value must fit a byte".to_string())?;
    Ok(FillSpec { lo, hi, value })
}

fn parse_move(s: &str) -> Result<MoveSpec, String> {
    let [lo, hi, dst] = split_fields(s)?;
    Ok(MoveSpec { lo, hi, dst })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_number("0x8000"), Ok(0x8000));
        assert_eq!(parse_number("1024"), Ok(1024));
        assert!(parse_number("0xZZ").is_err());
    }

    #[test]
    fn fill_spec_checks_byte_range() {
        assert!(parse_fill("0x8000,0x80FF,0xAA").is_ok());
        assert!(parse_fill("0x8000,0x80FF,0x100").is_err());
        assert!(parse_fill("0x8000,0x80FF").is_err());
    }
}
