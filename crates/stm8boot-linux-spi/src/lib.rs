//! Linux spidev transport for the STM8 ROM bootloader
//!
//! Drives the target's SPI bootloader interface through the
//! `/dev/spidevX.Y` character device. The bootloader acts as an SPI
//! slave in mode 0; reads clock out idle bytes to collect the response.

mod error;

pub use error::LinuxSpiError;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use stm8boot_core::error::{Error as CoreError, Result as CoreResult};
use stm8boot_core::transport::Transport;

/// Result type for spidev transport operations
pub type Result<T> = std::result::Result<T, LinuxSpiError>;

/// Default SPI clock: the ROM bootloader samples reliably well below
/// 1 MHz
pub const DEFAULT_SPEED_HZ: u32 = 250_000;

mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of the kernel's struct spi_ioc_transfer
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// Kernel spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// spidev transport
pub struct SpidevTransport {
    file: File,
    speed_hz: u32,
}

impl SpidevTransport {
    /// Open `device` in SPI mode 0 at `speed_hz` (or the default clock)
    pub fn open(device: &str, speed_hz: Option<u32>) -> Result<Self> {
        if device.is_empty() {
            return Err(LinuxSpiError::NoDevice);
        }
        let speed_hz = speed_hz.unwrap_or(DEFAULT_SPEED_HZ);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: device.to_string(),
                source: e,
            })?;

        let fd = file.as_raw_fd();
        let mode: u8 = 0;
        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| {
                LinuxSpiError::ConfigFailed(std::io::Error::from_raw_os_error(e as i32))
            })?;
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::ConfigFailed(std::io::Error::from_raw_os_error(e as i32))
            })?;
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed_hz).map_err(|e| {
                LinuxSpiError::ConfigFailed(std::io::Error::from_raw_os_error(e as i32))
            })?;
        }

        log::info!(
            "opened {} (mode 0, {} kHz)",
            device,
            speed_hz / 1000
        );

        Ok(Self { file, speed_hz })
    }

    fn transfer(&mut self, tx: Option<&[u8]>, rx: Option<&mut [u8]>) -> Result<()> {
        let len = match (&tx, &rx) {
            (Some(t), _) => t.len(),
            (_, Some(r)) => r.len(),
            _ => return Ok(()),
        };

        let xfer = SpiIocTransfer {
            tx_buf: tx.map_or(0, |t| t.as_ptr() as u64),
            rx_buf: rx.map_or(0, |r| r.as_mut_ptr() as u64),
            len: len as u32,
            speed_hz: self.speed_hz,
            bits_per_word: 8,
            ..Default::default()
        };

        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::spi_ioc_message(1),
                &xfer as *const SpiIocTransfer,
            )
        };
        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }
        Ok(())
    }
}

impl Transport for SpidevTransport {
    fn send(&mut self, data: &[u8]) -> CoreResult<()> {
        self.transfer(Some(data), None).map_err(|e| {
            log::error!("SPI write failed: {}", e);
            CoreError::CannotSend
        })
    }

    fn recv(&mut self, buf: &mut [u8], _timeout_ms: u32) -> CoreResult<usize> {
        // the master clocks the bus, so a response byte is always
        // shifted in; the BUSY marker stands in for "not ready yet"
        let len = buf.len();
        self.transfer(None, Some(buf)).map_err(|e| {
            log::error!("SPI read failed: {}", e);
            CoreError::ResponseTimeout
        })?;
        Ok(len)
    }

    fn flush(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn set_reset_line(&mut self, _level: bool) -> CoreResult<()> {
        // reset wiring on SPI setups is board-specific; handled outside
        log::debug!("spidev has no reset line, skipping reset");
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }
}
