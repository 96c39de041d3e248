//! ESP-IDF UART transport.
//!
//! # Pin Configuration
//!
//! | Signal | GPIO | Notes |
//! |--------|------|-------|
//! | UART1 TX | 17 | To modem DIN |
//! | UART1 RX | 16 | From modem DOUT |

use super::{Transport, TransportError};
use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{Gpio16, Gpio17};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver, UART1};
use esp_idf_hal::units::Hertz;
use std::time::Duration;

/// Maximum time to wait for the TX FIFO to empty on flush.
const TX_DONE_TIMEOUT: Duration = Duration::from_secs(1);

/// UART transport to the modem.
pub struct UartTransport<'d> {
    uart: UartDriver<'d>,
}

impl<'d> UartTransport<'d> {
    /// Create the UART driver at the given initial speed.
    pub fn new(
        uart: impl Peripheral<P = UART1> + 'd,
        tx: impl Peripheral<P = Gpio17> + 'd,
        rx: impl Peripheral<P = Gpio16> + 'd,
        baud: u32,
    ) -> Result<Self, TransportError> {
        let config = UartConfig::new().baudrate(Hertz(baud));
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<esp_idf_hal::gpio::AnyIOPin>::None,
            Option::<esp_idf_hal::gpio::AnyIOPin>::None,
            &config,
        )?;
        Ok(Self { uart })
    }
}

fn ticks(duration: Duration) -> u32 {
    TickType::new_millis(duration.as_millis() as u64).ticks()
}

impl Transport for UartTransport<'_> {
    fn reconfigure(&mut self, baud: u32) -> Result<(), TransportError> {
        self.uart
            .change_baudrate(Hertz(baud))
            .map_err(|_| TransportError::UnsupportedBaud(baud))?;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut written = 0;
        while written < bytes.len() {
            written += self.uart.write(&bytes[written..])?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.uart.wait_tx_done(ticks(TX_DONE_TIMEOUT))?;
        Ok(())
    }

    fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut len = 0;
        while len < buf.len() {
            let n = self.uart.read(&mut buf[len..], ticks(timeout))?;
            if n == 0 {
                break;
            }
            len += n;
        }
        Ok(len)
    }

    fn bytes_available(&mut self) -> bool {
        self.uart.remaining_read().map(|n| n > 0).unwrap_or(false)
    }
}
