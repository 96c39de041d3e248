//! Rover wireless uplink library.
//!
//! Drives an XBee-style serial Wi-Fi modem: detects its line speed, joins one
//! of the configured networks and sends payloads as binary API frames.
//!
//! Everything except the hardware transports and the NVS store can be tested
//! on the host machine without a modem attached.

pub mod clock;
pub mod credentials;
pub mod network;
pub mod report;
pub mod transport;
pub mod xbee;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialSlot, CredentialStore, MemoryStore, PropertiesStore, SecurityMode};
pub use network::{deliver, IpNetwork, LoopbackNetwork, NetworkError};
pub use report::ReportTarget;
pub use transport::{SimulatedModem, Transport, TransportError};
pub use xbee::{ConnectionState, ControllerConfig, WirelessController};
