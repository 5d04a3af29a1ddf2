//! Transport construction from connection arguments

use stm8boot_core::frame::Interface;
use stm8boot_core::transport::Transport;

use crate::cli::{ConnectionArgs, InterfaceArg, ResetArg, UartModeArg};

/// Open the transport selected by the connection arguments
pub fn open_transport(
    conn: &ConnectionArgs,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    match conn.interface {
        InterfaceArg::Uart => {
            let reset = match conn.reset {
                ResetArg::None => stm8boot_serial::ResetLine::None,
                ResetArg::Dtr => stm8boot_serial::ResetLine::Dtr,
                ResetArg::Rts => stm8boot_serial::ResetLine::Rts,
            };
            let port = stm8boot_serial::SerialTransport::open(&conn.port, conn.baud, reset)?;
            Ok(Box::new(port))
        }
        InterfaceArg::SpiBridge => {
            let bridge =
                stm8boot_serprog::SerprogBridge::open(&conn.port, conn.baud, conn.spi_clock_hz)?;
            Ok(Box::new(bridge))
        }
        #[cfg(target_os = "linux")]
        InterfaceArg::SpiDevice => {
            let dev = stm8boot_linux_spi::SpidevTransport::open(&conn.port, conn.spi_clock_hz)?;
            Ok(Box::new(dev))
        }
        #[cfg(not(target_os = "linux"))]
        InterfaceArg::SpiDevice => Err("the spi-device interface is only available on Linux".into()),
    }
}

/// Initial interface mode for the protocol engine
pub fn initial_interface(conn: &ConnectionArgs) -> Interface {
    match conn.interface {
        InterfaceArg::Uart => match conn.uart_mode {
            Some(UartModeArg::Reply) => Interface::UartReply,
            Some(UartModeArg::TwoWire) => Interface::UartTwoWire,
            _ => Interface::UartDuplex,
        },
        InterfaceArg::SpiDevice | InterfaceArg::SpiBridge => Interface::Spi,
    }
}

/// The UART mode override requested on the command line, if any
pub fn uart_mode_override(conn: &ConnectionArgs) -> Option<Interface> {
    match conn.uart_mode {
        Some(UartModeArg::Duplex) => Some(Interface::UartDuplex),
        Some(UartModeArg::Reply) => Some(Interface::UartReply),
        Some(UartModeArg::TwoWire) => Some(Interface::UartTwoWire),
        None => None,
    }
}
