//! Wireless controller: the modem behind the [`IpNetwork`] capability.
//!
//! Composes the join state machine, the credential store and the frame
//! builder. The controller exclusively owns the transport.
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::time::Duration;
//! use rover_uplink::clock::ManualClock;
//! use rover_uplink::credentials::MemoryStore;
//! use rover_uplink::network::IpNetwork;
//! use rover_uplink::transport::SimulatedModem;
//! use rover_uplink::xbee::{ControllerConfig, WirelessController};
//!
//! let modem = SimulatedModem::new(9600);
//! modem.set_association(&["0"]);
//!
//! let mut controller = WirelessController::new(
//!     modem.clone(),
//!     MemoryStore::new(),
//!     ManualClock::new(),
//!     ControllerConfig::default(),
//! )
//! .unwrap();
//! controller.init();
//!
//! assert!(controller.is_available());
//! controller.send(Ipv4Addr::new(10, 0, 0, 2), 80, b"ping").unwrap();
//! assert_eq!(modem.frames().len(), 1);
//! ```

use super::config::{ConfigError, ControllerConfig, API_DNS_LOOKUP};
use super::frame::TxIpv4Request;
use super::join::{ConnectionState, NetworkJoin};
use super::retry::RetryTimer;
use crate::clock::Clock;
use crate::credentials::CredentialStore;
use crate::network::{IpNetwork, NetworkError};
use crate::transport::Transport;
use log::{debug, info, trace, warn};
use std::net::Ipv4Addr;

/// Bytes shown per line when logging a drained response.
const HEX_DUMP_WIDTH: usize = 16;

/// The serial Wi-Fi modem uplink.
pub struct WirelessController<T: Transport, S: CredentialStore, C: Clock> {
    join: NetworkJoin<T, C>,
    store: S,
    config: ControllerConfig,
    resolved: Option<Ipv4Addr>,
    lookup_timer: Option<RetryTimer>,
}

impl<T: Transport, S: CredentialStore, C: Clock> WirelessController<T, S, C> {
    /// Create a controller. Nothing is sent until [`Self::init`].
    pub fn new(transport: T, store: S, clock: C, config: ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            join: NetworkJoin::new(transport, clock, &config),
            store,
            config,
            resolved: None,
            lookup_timer: None,
        })
    }

    /// Reinitialize from scratch and scan for the modem.
    ///
    /// Resets the attempt counter and returns a modem in API mode to
    /// transparent mode first. Returns the resulting state.
    pub fn init(&mut self) -> ConnectionState {
        self.join.reset();
        self.resolved = None;
        self.lookup_timer = None;
        self.join.scan_for_module();
        info!("Uplink {}", self.join.state());
        self.join.state()
    }

    /// Scan again if no modem has been found yet.
    ///
    /// Returns whether a modem is detected afterwards.
    pub fn rescan(&mut self) -> bool {
        if self.join.state() == ConnectionState::ModuleAbsent {
            return self.join.scan_for_module();
        }
        self.join.is_detected()
    }

    /// Advance the join if needed and report whether the link is up.
    pub fn is_ready(&mut self) -> bool {
        self.join.is_ready(&self.store)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.join.state()
    }

    /// Last credential slot tried.
    pub fn attempt_counter(&self) -> u8 {
        self.join.attempt_counter()
    }

    /// Line speed of the detected modem.
    pub fn detected_baud(&self) -> Option<u32> {
        self.join.detected_baud()
    }

    /// Address of the configured report host, once resolved.
    pub fn resolved_address(&self) -> Option<Ipv4Addr> {
        self.resolved
    }

    /// The credential store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the configured host through the modem, at most once per
    /// retry interval until it succeeds.
    fn resolve_destination(&mut self) -> bool {
        if self.resolved.is_some() {
            return true;
        }
        let Some(host) = self.config.resolve_host.clone() else {
            return true;
        };

        let now = self.join.session_mut().clock().now();
        if self.lookup_timer.is_some_and(|timer| !timer.is_due(now)) {
            return false;
        }

        let response = self
            .join
            .session_mut()
            .api_command(API_DNS_LOOKUP, host.as_bytes());
        match response {
            Some(r) if r.is_ok() && r.data.len() == 4 => {
                let address = Ipv4Addr::new(r.data[0], r.data[1], r.data[2], r.data[3]);
                info!("Resolved {} to {}", host, address);
                self.resolved = Some(address);
                return true;
            }
            Some(r) => warn!("Lookup of {} failed (status {})", host, r.status),
            None => warn!("No reply to lookup of {}", host),
        }
        self.lookup_timer = Some(RetryTimer::new(now, self.config.retry_interval));
        false
    }

    /// Frame `payload` and write it to the modem.
    pub fn send_request(
        &mut self,
        address: Ipv4Addr,
        port: u16,
        payload: &[u8],
    ) -> Result<(), NetworkError> {
        if self.join.state() != ConnectionState::Connected || !self.join.api_mode() {
            return Err(NetworkError::NotAvailable);
        }

        let request = TxIpv4Request::new(address, port, payload);
        let bytes = request.encode()?;

        let transport = self.join.session_mut().transport_mut();
        let stale = transport.drain_input()?;
        if !stale.is_empty() {
            trace!("Discarded {} stale bytes before send", stale.len());
        }
        transport.write(&bytes)?;
        transport.flush()?;

        info!(
            "Sent {} bytes to {}:{} (frame length {}, checksum 0x{:02X})",
            payload.len(),
            address,
            port,
            request.frame_len(),
            request.checksum()
        );
        Ok(())
    }

    /// Read and log everything the modem has sent.
    pub fn drain_response(&mut self) -> usize {
        let bytes = match self.join.session_mut().transport_mut().drain_input() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read response: {}", e);
                return 0;
            }
        };
        if bytes.is_empty() {
            return 0;
        }

        debug!("Received {} bytes", bytes.len());
        for chunk in bytes.chunks(HEX_DUMP_WIDTH) {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
            info!("< {}", hex.join(" "));
        }
        bytes.len()
    }
}

impl<T: Transport, S: CredentialStore, C: Clock> IpNetwork for WirelessController<T, S, C> {
    fn is_available(&mut self) -> bool {
        self.is_ready() && self.resolve_destination()
    }

    fn send(&mut self, address: Ipv4Addr, port: u16, payload: &[u8]) -> Result<(), NetworkError> {
        self.send_request(address, port, payload)
    }

    fn drain_response(&mut self) -> usize {
        WirelessController::drain_response(self)
    }
}
