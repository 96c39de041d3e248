//! Host serial port transport.
//!
//! Drives a modem attached through a USB serial adapter, using the
//! `serialport` crate.

use super::{Transport, TransportError};
use log::debug;
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Per-read timeout used while polling the port.
const POLL_TIMEOUT: Duration = Duration::from_millis(20);

/// Serial port transport.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at the given speed.
    pub fn open(path: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Io(e.into()))?;
        debug!("Opened serial port {} at {} baud", path, baud);
        Ok(Self { port })
    }

    /// Wrap an already opened port.
    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn reconfigure(&mut self, baud: u32) -> Result<(), TransportError> {
        self.port
            .set_baud_rate(baud)
            .map_err(|_| TransportError::UnsupportedBaud(baud))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }

    fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut len = 0;
        while len < buf.len() {
            match self.port.read(&mut buf[len..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => len += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(len)
    }

    fn bytes_available(&mut self) -> bool {
        self.port.bytes_to_read().map(|n| n > 0).unwrap_or(false)
    }
}

/// Find a USB serial adapter by scanning common device patterns.
///
/// Returns the first matching port, or None if no adapter is found.
pub fn find_serial_port() -> Option<String> {
    let patterns = [
        "/dev/cu.usbserial-*",
        "/dev/cu.SLAB_USBtoUART*",
        "/dev/ttyUSB*",
        "/dev/ttyACM*",
    ];

    for pattern in patterns {
        if let Ok(paths) = glob::glob(pattern) {
            if let Some(path) = paths.flatten().next() {
                return Some(path.to_string_lossy().to_string());
            }
        }
    }

    None
}
