//! Byte-oriented serial channel to the modem.
//!
//! This module contains:
//! - [`Transport`]: the capability the uplink controller consumes
//! - [`sim`]: simulated modem for host tests
//! - [`serial`]: host serial port transport (`host-serial` feature)
//! - [`uart`]: ESP-IDF UART transport (ESP32 only)

pub mod sim;

#[cfg(feature = "host-serial")]
mod serial;
#[cfg(feature = "esp32")]
mod uart;

pub use sim::SimulatedModem;

#[cfg(feature = "host-serial")]
pub use serial::{find_serial_port, SerialTransport};
#[cfg(feature = "esp32")]
pub use uart::UartTransport;

use std::fmt;
use std::time::Duration;

/// Serial channel with reconfigurable speed.
///
/// Implementations only need the primitive operations; delimiter reads and
/// input draining are provided on top of [`Transport::read_timeout`].
pub trait Transport {
    /// Change the line speed.
    fn reconfigure(&mut self, baud: u32) -> Result<(), TransportError>;

    /// Write all bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Block until written bytes have left the output buffer.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout` for them.
    ///
    /// Returns the number of bytes read; `Ok(0)` means the timeout expired
    /// with nothing received.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration)
        -> Result<usize, TransportError>;

    /// Whether at least one inbound byte is waiting.
    fn bytes_available(&mut self) -> bool;

    /// Read into `buf` until `delimiter` is seen, `buf` is full, or a single
    /// byte takes longer than `timeout` to arrive.
    ///
    /// The delimiter is consumed but not stored.
    fn read_until(
        &mut self,
        delimiter: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut len = 0;
        let mut byte = [0u8; 1];
        while len < buf.len() {
            if self.read_timeout(&mut byte, timeout)? == 0 {
                break;
            }
            if byte[0] == delimiter {
                break;
            }
            buf[len] = byte[0];
            len += 1;
        }
        Ok(len)
    }

    /// Read and return everything currently waiting, without blocking.
    fn drain_input(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut drained = Vec::new();
        let mut chunk = [0u8; 64];
        while self.bytes_available() {
            let n = self.read_timeout(&mut chunk, Duration::ZERO)?;
            if n == 0 {
                break;
            }
            drained.extend_from_slice(&chunk[..n]);
        }
        Ok(drained)
    }
}

/// Transport errors.
#[derive(Debug)]
pub enum TransportError {
    /// Underlying I/O failure.
    Io(std::io::Error),
    /// The port rejected the requested line speed.
    UnsupportedBaud(u32),
    /// The port is closed or the device went away.
    Closed,
    /// ESP-IDF driver error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::UnsupportedBaud(baud) => write!(f, "unsupported baud rate: {}", baud),
            Self::Closed => write!(f, "transport closed"),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for TransportError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}
