//! AT command session over the modem's serial line.
//!
//! The modem has two protocols on the same wire:
//!
//! - **AT command mode**: line-oriented `AT<cmd>\r` requests answered by a
//!   `\r`-terminated line. Entered with a guarded `+++` escape and left with
//!   `ATCN`. Only works while the module is in transparent mode.
//! - **API mode**: binary frames. Once the module is switched to API mode the
//!   escape sequence is ignored, so local configuration goes out as
//!   `0x08` command frames and comes back as `0x88` responses.
//!
//! [`CommandSession`] owns the transport and provides both. It keeps a single
//! response buffer: each [`CommandSession::send_command`] overwrites the
//! previous response, and the returned `&str` borrows the session so the
//! compiler enforces one exchange in flight.

use super::config::{
    ControllerConfig, COMMAND_MODE_ACK, ESCAPE_SEQUENCE, EXIT_COMMAND, RESPONSE_CAPACITY,
};
use super::frame::{ApiFrame, AtCommandFrame, AtCommandResponse, START_DELIMITER};
use crate::clock::Clock;
use crate::transport::{Transport, TransportError};
use log::{debug, trace, warn};
use std::time::Duration;

/// Frames read while waiting for an API command response before giving up.
const MAX_FRAMES_PER_RESPONSE: usize = 8;

/// Bytes skipped while hunting for a start delimiter before giving up.
const MAX_RESYNC_BYTES: usize = 256;

/// Fixed-capacity buffer holding the last command response.
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    bytes: [u8; RESPONSE_CAPACITY],
    len: usize,
}

impl ResponseBuffer {
    fn new() -> Self {
        Self {
            bytes: [0; RESPONSE_CAPACITY],
            len: 0,
        }
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    /// Raw response bytes, without the terminating carriage return.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Response as text; empty if the modem sent non-UTF-8 bytes.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    /// Number of response bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if no response was received.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Command exchange with the modem.
pub struct CommandSession<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    guard_time: Duration,
    read_timeout: Duration,
    api_timeout: Duration,
    response: ResponseBuffer,
    last_frame_id: u8,
}

impl<T: Transport, C: Clock> CommandSession<T, C> {
    /// Create a session over `transport` with the timing of `config`.
    pub fn new(transport: T, clock: C, config: &ControllerConfig) -> Self {
        Self {
            transport,
            clock,
            guard_time: config.guard_time,
            read_timeout: config.read_timeout,
            api_timeout: config.api_timeout,
            response: ResponseBuffer::new(),
            last_frame_id: 0,
        }
    }

    /// The clock driving guard delays.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Direct access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The last command response.
    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    /// Switch the modem into AT command mode.
    ///
    /// Returns `true` if the modem acknowledged with `OK\r`. Not retried.
    pub fn enter_command_mode(&mut self) -> bool {
        if let Err(e) = self.transport.drain_input() {
            trace!("Failed to drain input before escape: {}", e);
        }

        self.clock.delay(self.guard_time);
        if let Err(e) = self
            .transport
            .write(ESCAPE_SEQUENCE)
            .and_then(|_| self.transport.flush())
        {
            trace!("Failed to write escape sequence: {}", e);
            return false;
        }
        self.clock.delay(self.guard_time);

        let mut ack = [0u8; 3];
        match self.read_exact(&mut ack, self.read_timeout) {
            Ok(true) if &ack == COMMAND_MODE_ACK => true,
            Ok(true) => {
                trace!("Unexpected command mode reply: {:02X?}", ack);
                false
            }
            Ok(false) => {
                trace!("No command mode acknowledgment");
                false
            }
            Err(e) => {
                trace!("Command mode read failed: {}", e);
                false
            }
        }
    }

    /// Leave AT command mode.
    pub fn exit_command_mode(&mut self) {
        let line = format!("AT{}\r", EXIT_COMMAND);
        if let Err(e) = self.transport.write(line.as_bytes()) {
            trace!("Failed to write exit command: {}", e);
            return;
        }

        let mut discard = [0u8; RESPONSE_CAPACITY];
        if let Err(e) = self
            .transport
            .read_until(b'\r', &mut discard, self.read_timeout)
        {
            trace!("Exit command read failed: {}", e);
        }
        if let Err(e) = self.transport.drain_input() {
            trace!("Failed to drain input after exit: {}", e);
        }
    }

    /// Send `AT<command>\r` and return the response line.
    ///
    /// With `atomic`, the exchange is wrapped in its own enter/exit of command
    /// mode; if the modem does not acknowledge the escape, nothing is sent and
    /// the response is empty. A silent modem yields an empty or partial
    /// response, never an error.
    pub fn send_command(&mut self, command: &str, atomic: bool) -> &str {
        self.response.clear();

        if atomic && !self.enter_command_mode() {
            return self.response.as_str();
        }

        let line = format!("AT{}\r", command);
        match self
            .transport
            .write(line.as_bytes())
            .and_then(|_| self.transport.flush())
        {
            Ok(()) => {
                match self
                    .transport
                    .read_until(b'\r', &mut self.response.bytes, self.read_timeout)
                {
                    Ok(n) => self.response.len = n,
                    Err(e) => trace!("AT{} read failed: {}", command, e),
                }
            }
            Err(e) => trace!("AT{} write failed: {}", command, e),
        }
        trace!("AT{} -> {:?}", command, self.response.as_str());

        if atomic {
            self.exit_command_mode();
        }
        self.response.as_str()
    }

    /// Send a local AT command as an API frame and wait for its response.
    ///
    /// Only usable while the module is in API mode. Returns `None` if no
    /// matching response arrived in time.
    pub fn api_command(&mut self, command: [u8; 2], parameter: &[u8]) -> Option<AtCommandResponse> {
        let frame_id = self.next_frame_id();
        let bytes = match AtCommandFrame::new(frame_id, command, parameter).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot encode API command: {}", e);
                return None;
            }
        };

        if let Err(e) = self.transport.drain_input() {
            trace!("Failed to drain input before API command: {}", e);
        }
        if let Err(e) = self
            .transport
            .write(&bytes)
            .and_then(|_| self.transport.flush())
        {
            debug!("API command write failed: {}", e);
            return None;
        }

        for _ in 0..MAX_FRAMES_PER_RESPONSE {
            let frame = match self.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!("API response read failed: {}", e);
                    break;
                }
            };
            match AtCommandResponse::try_from(&frame) {
                Ok(response) if response.frame_id == frame_id && response.command == command => {
                    return Some(response);
                }
                Ok(other) => trace!("Skipping response to frame {}", other.frame_id),
                Err(_) => trace!("Skipping API frame type 0x{:02X}", frame.frame_type),
            }
        }

        debug!(
            "No response to API command {}",
            String::from_utf8_lossy(&command)
        );
        None
    }

    /// Frame ids cycle through 1..=255; zero would suppress the response.
    fn next_frame_id(&mut self) -> u8 {
        self.last_frame_id = self.last_frame_id.checked_add(1).unwrap_or(1);
        self.last_frame_id
    }

    /// Read one API frame. `Ok(None)` on timeout or undecodable data.
    fn read_frame(&mut self) -> Result<Option<ApiFrame>, TransportError> {
        let mut byte = [0u8; 1];
        let mut skipped = 0;
        loop {
            if self.transport.read_timeout(&mut byte, self.api_timeout)? == 0 {
                return Ok(None);
            }
            if byte[0] == START_DELIMITER {
                break;
            }
            skipped += 1;
            if skipped >= MAX_RESYNC_BYTES {
                return Ok(None);
            }
        }

        let mut length = [0u8; 2];
        if !self.read_exact(&mut length, self.api_timeout)? {
            return Ok(None);
        }
        let frame_len = u16::from_be_bytes(length) as usize;

        let mut raw = Vec::with_capacity(frame_len + 4);
        raw.push(START_DELIMITER);
        raw.extend_from_slice(&length);
        raw.resize(frame_len + 4, 0);
        if !self.read_exact(&mut raw[3..], self.api_timeout)? {
            return Ok(None);
        }

        match ApiFrame::decode(&raw) {
            Ok((frame, _)) => Ok(Some(frame)),
            Err(e) => {
                debug!("Dropping malformed API frame: {}", e);
                Ok(None)
            }
        }
    }

    /// Fill `buf` completely. `Ok(false)` if the data stopped arriving.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<bool, TransportError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.transport.read_timeout(&mut buf[filled..], timeout)?;
            if n == 0 {
                return Ok(false);
            }
            filled += n;
        }
        Ok(true)
    }
}
