//! Destination of the periodic status report.
//!
//! Read from the same store as the credentials:
//!
//! ```text
//! report.ip=<dotted IPv4 address>
//! report.host=<host name, resolved through the modem>
//! report.port=<TCP port, default 80>
//! ```
//!
//! A fixed address wins over a host name.

use crate::credentials::{CredentialStore, MAX_VALUE_LEN};
use log::warn;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Key holding a fixed report address.
pub const REPORT_IP_KEY: &str = "report.ip";

/// Key holding the report host name.
pub const REPORT_HOST_KEY: &str = "report.host";

/// Key holding the report port.
pub const REPORT_PORT_KEY: &str = "report.port";

/// Port used when none is configured.
pub const DEFAULT_REPORT_PORT: u16 = 80;

/// Minimum time between two reports.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Where reports are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    /// Fixed address.
    Address(Ipv4Addr, u16),
    /// Host name to resolve through the modem.
    Host(String, u16),
}

impl ReportTarget {
    /// Read the target from `store`. `None` if neither address nor host is set.
    pub fn from_store<S: CredentialStore + ?Sized>(store: &S) -> Option<Self> {
        let port = match store.get(REPORT_PORT_KEY) {
            Some(value) => match value.trim().parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => {
                    warn!("Invalid {} {:?}, using {}", REPORT_PORT_KEY, value, DEFAULT_REPORT_PORT);
                    DEFAULT_REPORT_PORT
                }
            },
            None => DEFAULT_REPORT_PORT,
        };

        if let Some(ip) = store.get(REPORT_IP_KEY) {
            match ip.trim().parse::<Ipv4Addr>() {
                Ok(address) => return Some(Self::Address(address, port)),
                Err(_) => warn!("Invalid {} {:?}", REPORT_IP_KEY, ip),
            }
        }

        let host = store
            .get(REPORT_HOST_KEY)
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())?;
        if host.len() > MAX_VALUE_LEN {
            warn!("{} longer than {} bytes, ignored", REPORT_HOST_KEY, MAX_VALUE_LEN);
            return None;
        }
        Some(Self::Host(host, port))
    }

    /// Host name the modem must resolve, if any.
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Host(host, _) => Some(host.as_str()),
            Self::Address(..) => None,
        }
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        match self {
            Self::Address(_, port) | Self::Host(_, port) => *port,
        }
    }

    /// Destination address: the fixed one, or `resolved` for a host name.
    pub fn address(&self, resolved: Option<Ipv4Addr>) -> Option<Ipv4Addr> {
        match self {
            Self::Address(address, _) => Some(*address),
            Self::Host(..) => resolved,
        }
    }
}
