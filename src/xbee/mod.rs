//! Serial Wi-Fi modem support.
//!
//! This module contains:
//! - [`config`]: Modem constants and controller timing
//! - [`frame`]: Binary API frame codec (transmit-IPv4, local AT command)
//! - [`command`]: AT command session over the serial line
//! - [`retry`]: Elapsed-time gate between join attempts
//! - [`join`]: Baud detection and network join state machine
//! - [`controller`]: The modem as an [`crate::network::IpNetwork`]

pub mod command;
pub mod config;
pub mod frame;
pub mod join;
pub mod retry;

mod controller;

pub use command::{CommandSession, ResponseBuffer};
pub use config::{ConfigError, ControllerConfig, BAUD_CANDIDATES, MAX_CREDENTIAL_SLOTS};
pub use controller::WirelessController;
pub use frame::{FrameError, Protocol, TxIpv4Request};
pub use join::{Association, ConnectionState, NetworkJoin};
pub use retry::RetryTimer;
