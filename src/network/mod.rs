//! IP network capability consumed by the reporting client.
//!
//! This module provides a transport-independent interface to "some IP uplink":
//! - [`crate::xbee::WirelessController`]: the serial Wi-Fi modem
//! - [`LoopbackNetwork`]: in-memory fake for consumer tests
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use rover_uplink::network::{deliver, IpNetwork, LoopbackNetwork};
//!
//! let mut net = LoopbackNetwork::new();
//! assert!(!deliver(&mut net, Ipv4Addr::new(10, 0, 0, 2), 80, b"status"));
//!
//! net.set_available(true);
//! assert!(deliver(&mut net, Ipv4Addr::new(10, 0, 0, 2), 80, b"status"));
//! assert_eq!(net.sent()[0].payload, b"status");
//! ```

use crate::transport::TransportError;
use crate::xbee::frame::FrameError;
use log::warn;
use std::collections::VecDeque;
use std::net::Ipv4Addr;

/// Uplink able to carry payloads to an IPv4 destination.
pub trait IpNetwork {
    /// Whether payloads can be sent now.
    ///
    /// May advance connection setup as a side effect; call once per control
    /// cycle.
    fn is_available(&mut self) -> bool;

    /// Send `payload` to `address:port`.
    ///
    /// Success means the payload was handed to the uplink; no delivery
    /// acknowledgment is read back.
    fn send(&mut self, address: Ipv4Addr, port: u16, payload: &[u8]) -> Result<(), NetworkError>;

    /// Consume and log everything received since the last call.
    ///
    /// Returns the number of bytes drained.
    fn drain_response(&mut self) -> usize;
}

/// Drain the previous response, then send `payload` if the uplink is up.
///
/// Returns `true` if the payload was sent.
pub fn deliver<N: IpNetwork + ?Sized>(
    net: &mut N,
    address: Ipv4Addr,
    port: u16,
    payload: &[u8],
) -> bool {
    net.drain_response();
    if !net.is_available() {
        return false;
    }
    match net.send(address, port, payload) {
        Ok(()) => true,
        Err(e) => {
            warn!("Send to {}:{} failed: {}", address, port, e);
            false
        }
    }
}

/// A payload recorded by [`LoopbackNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayload {
    /// Destination address.
    pub address: Ipv4Addr,
    /// Destination port.
    pub port: u16,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// In-memory network that records sends and replays queued responses.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    available: bool,
    sent: Vec<SentPayload>,
    responses: VecDeque<Vec<u8>>,
}

impl LoopbackNetwork {
    /// Create an unavailable network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set availability.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Queue bytes to be returned by the next drain.
    pub fn queue_response(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }

    /// Everything sent so far.
    pub fn sent(&self) -> &[SentPayload] {
        &self.sent
    }
}

impl IpNetwork for LoopbackNetwork {
    fn is_available(&mut self) -> bool {
        self.available
    }

    fn send(&mut self, address: Ipv4Addr, port: u16, payload: &[u8]) -> Result<(), NetworkError> {
        if !self.available {
            return Err(NetworkError::NotAvailable);
        }
        self.sent.push(SentPayload {
            address,
            port,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn drain_response(&mut self) -> usize {
        self.responses.drain(..).map(|r| r.len()).sum()
    }
}

/// Network errors.
#[derive(Debug)]
pub enum NetworkError {
    /// The uplink is not connected.
    NotAvailable,
    /// The payload could not be framed.
    Frame(FrameError),
    /// Writing to the modem failed.
    Transport(TransportError),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAvailable => write!(f, "network not available"),
            Self::Frame(e) => write!(f, "frame error: {}", e),
            Self::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Frame(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for NetworkError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<TransportError> for NetworkError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    #[test]
    fn test_loopback_unavailable_rejects_send() {
        let mut net = LoopbackNetwork::new();
        assert!(!net.is_available());
        assert!(matches!(
            net.send(DEST, 8080, b"x"),
            Err(NetworkError::NotAvailable)
        ));
        assert!(net.sent().is_empty());
    }

    #[test]
    fn test_loopback_records_sends() {
        let mut net = LoopbackNetwork::new();
        net.set_available(true);
        net.send(DEST, 8080, b"one").unwrap();
        net.send(DEST, 9090, b"two").unwrap();

        assert_eq!(net.sent().len(), 2);
        assert_eq!(net.sent()[1].port, 9090);
        assert_eq!(net.sent()[1].payload, b"two");
    }

    #[test]
    fn test_loopback_drain() {
        let mut net = LoopbackNetwork::new();
        net.queue_response(b"HTTP/1.1 200 OK\r\n");
        net.queue_response(b"\r\n");
        assert_eq!(net.drain_response(), 19);
        assert_eq!(net.drain_response(), 0);
    }

    #[test]
    fn test_deliver_drains_first() {
        let mut net = LoopbackNetwork::new();
        net.set_available(true);
        net.queue_response(b"stale");

        assert!(deliver(&mut net, DEST, 80, b"report"));
        assert_eq!(net.drain_response(), 0);
        assert_eq!(net.sent().len(), 1);
    }

    #[test]
    fn test_deliver_unavailable() {
        let mut net = LoopbackNetwork::new();
        assert!(!deliver(&mut net, DEST, 80, b"report"));
        assert!(net.sent().is_empty());
    }

    #[test]
    fn test_deliver_through_trait_object() {
        let mut net = LoopbackNetwork::new();
        net.set_available(true);
        let dyn_net: &mut dyn IpNetwork = &mut net;
        assert!(deliver(dyn_net, DEST, 80, b"report"));
    }

    #[test]
    fn test_error_display() {
        let err = NetworkError::from(FrameError::BadDelimiter(0x00));
        assert_eq!(err.to_string(), "frame error: bad start delimiter: 0x00");
        assert_eq!(
            NetworkError::NotAvailable.to_string(),
            "network not available"
        );
    }
}
