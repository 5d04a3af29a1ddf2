//! Byte transport abstraction
//!
//! The protocol engine drives the target through this trait; concrete
//! UART and SPI implementations live in the transport crates. All calls
//! are blocking with explicit timeouts.

use crate::error::Result;

/// A half-duplex-agnostic byte pipe to the target
pub trait Transport {
    /// Write all bytes to the target
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms`.
    /// Returns the number of bytes read; 0 means timeout.
    ///
    /// On SPI transports this clocks out idle bytes to collect the
    /// target's response.
    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;

    /// Drop any unread input
    fn flush(&mut self) -> Result<()>;

    /// Drive the target reset line, if the transport has one. `true`
    /// asserts reset.
    fn set_reset_line(&mut self, level: bool) -> Result<()>;

    /// Block for the given number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<T: Transport + ?Sized> Transport for alloc::boxed::Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        (**self).recv(buf, timeout_ms)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn set_reset_line(&mut self, level: bool) -> Result<()> {
        (**self).set_reset_line(level)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        (**self).recv(buf, timeout_ms)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn set_reset_line(&mut self, level: bool) -> Result<()> {
        (**self).set_reset_line(level)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Scripted transport for protocol tests: records writes, replays a
/// queued sequence of reads and timeouts.
#[cfg(test)]
pub(crate) mod mock {
    use super::Transport;
    use crate::error::Result;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;

    enum ReadStep {
        Bytes(Vec<u8>),
        Timeout,
    }

    pub(crate) struct MockTransport {
        pub written: Vec<u8>,
        pub reset_events: Vec<bool>,
        pub flushes: usize,
        reads: VecDeque<ReadStep>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                written: Vec::new(),
                reset_events: Vec::new(),
                flushes: 0,
                reads: VecDeque::new(),
            }
        }

        /// Queue bytes to be returned by subsequent `recv` calls
        pub fn queue_bytes(&mut self, data: &[u8]) {
            self.reads.push_back(ReadStep::Bytes(data.to_vec()));
        }

        /// Queue one `recv` call that times out
        pub fn queue_timeout(&mut self) {
            self.reads.push_back(ReadStep::Timeout);
        }
    }

    impl Transport for MockTransport {
        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize> {
            match self.reads.pop_front() {
                None | Some(ReadStep::Timeout) => Ok(0),
                Some(ReadStep::Bytes(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        let rest = data.split_off(n);
                        self.reads.push_front(ReadStep::Bytes(rest));
                    }
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }

        fn set_reset_line(&mut self, level: bool) -> Result<()> {
            self.reset_events.push(level);
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {}
    }
}
