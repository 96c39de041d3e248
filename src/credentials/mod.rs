//! Wi-Fi credential slots and the stores that hold them.
//!
//! Credentials live in an external key-value store under indexed keys:
//!
//! ```text
//! wifi.ssid.<n>=<network name>
//! wifi.mode.<n>=<0=none|1=WPA|2=WPA2|3=WEP>
//! wifi.psk.<n>=<pre-shared key>
//! ```
//!
//! for `n` in `0..=9`. Slots are resolved lazily, one per join attempt, and
//! never cached.
//!
//! # Components
//!
//! - [`CredentialStore`] - lookup capability consumed by the join logic
//! - [`MemoryStore`] - in-memory store
//! - [`properties`] - `key=value` properties file store
//! - [`nvs`] - ESP-IDF NVS store (ESP32 only)
//!
//! # Example
//!
//! ```
//! use rover_uplink::credentials::{CredentialSlot, MemoryStore, SecurityMode};
//!
//! let mut store = MemoryStore::new();
//! store.set("wifi.ssid.2", "RobotNet");
//! store.set("wifi.mode.2", "2");
//!
//! let slot = CredentialSlot::resolve(&store, 2).unwrap();
//! assert_eq!(slot.ssid, "RobotNet");
//! assert_eq!(slot.security, Some(SecurityMode::Wpa2));
//! assert!(CredentialSlot::resolve(&store, 3).is_none());
//! ```

pub mod properties;

#[cfg(feature = "esp32")]
mod nvs;

pub use properties::PropertiesStore;

#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

use log::warn;
use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum pre-shared key length for WPA2.
pub const MAX_PSK_LEN: usize = 64;

/// Longest value a store has to hold: a full DNS host name.
pub const MAX_VALUE_LEN: usize = 253;

/// Key-value lookup of configuration strings.
pub trait CredentialStore {
    /// Value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Option<String>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for &S {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Key holding the network name of `slot`.
pub fn ssid_key(slot: u8) -> String {
    format!("wifi.ssid.{}", slot)
}

/// Key holding the security mode of `slot`.
pub fn mode_key(slot: u8) -> String {
    format!("wifi.mode.{}", slot)
}

/// Key holding the pre-shared key of `slot`.
pub fn psk_key(slot: u8) -> String {
    format!("wifi.psk.{}", slot)
}

/// Wireless security mode, numbered as the modem's encryption register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Open network.
    None = 0,
    /// WPA.
    Wpa = 1,
    /// WPA2.
    Wpa2 = 2,
    /// WEP.
    Wep = 3,
}

impl SecurityMode {
    /// Register value sent to the modem.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::str::FromStr for SecurityMode {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "none" | "open" => Ok(Self::None),
            "1" | "wpa" => Ok(Self::Wpa),
            "2" | "wpa2" => Ok(Self::Wpa2),
            "3" | "wep" => Ok(Self::Wep),
            _ => Err(CredentialError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Wpa => "WPA",
            Self::Wpa2 => "WPA2",
            Self::Wep => "WEP",
        };
        write!(f, "{}", name)
    }
}

/// One resolved credential slot.
///
/// The key is wiped from memory when the slot is dropped.
#[derive(Debug, Clone)]
pub struct CredentialSlot {
    /// Slot index (0-9).
    pub index: u8,
    /// Network name.
    pub ssid: String,
    /// Security mode, if configured.
    pub security: Option<SecurityMode>,
    /// Pre-shared key, if configured.
    pub psk: Option<Zeroizing<String>>,
}

impl CredentialSlot {
    /// Look up slot `index` in `store`.
    ///
    /// Returns `None` when the slot has no usable SSID. A malformed security
    /// mode or key is dropped with a warning and the slot is treated as an
    /// open network.
    pub fn resolve<S: CredentialStore + ?Sized>(store: &S, index: u8) -> Option<Self> {
        let ssid = store.get(&ssid_key(index))?;
        if let Err(e) = validate_ssid(&ssid) {
            warn!("Ignoring credential slot {}: {}", index, e);
            return None;
        }

        let mut security = store
            .get(&mode_key(index))
            .filter(|m| !m.trim().is_empty())
            .and_then(|m| match m.parse::<SecurityMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    warn!("Slot {}: {}, treating as open network", index, e);
                    None
                }
            });

        let stored_psk = store
            .get(&psk_key(index))
            .map(Zeroizing::new)
            .filter(|k| !k.is_empty());
        let key_dropped = stored_psk.as_ref().is_some_and(|k| k.len() > MAX_PSK_LEN);
        let psk = stored_psk.and_then(|k| {
            if k.len() > MAX_PSK_LEN {
                warn!(
                    "Slot {}: {}, treating as open network",
                    index,
                    CredentialError::PskTooLong {
                        len: k.len(),
                        max: MAX_PSK_LEN
                    }
                );
                None
            } else {
                Some(k)
            }
        });

        // A key that was dropped leaves an open network, not a keyless WPA one
        if key_dropped {
            security = Some(SecurityMode::None);
        }

        Some(Self {
            index,
            ssid,
            security,
            psk,
        })
    }

    /// Check if this is an open network (no key).
    pub fn is_open(&self) -> bool {
        self.psk.is_none()
    }
}

fn validate_ssid(ssid: &str) -> Result<(), CredentialError> {
    if ssid.is_empty() {
        return Err(CredentialError::SsidEmpty);
    }
    if ssid.len() > MAX_SSID_LEN {
        return Err(CredentialError::SsidTooLong {
            len: ssid.len(),
            max: MAX_SSID_LEN,
        });
    }
    Ok(())
}

/// In-memory credential store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Store a complete slot.
    pub fn set_slot(&mut self, index: u8, ssid: &str, mode: Option<&str>, psk: Option<&str>) {
        self.set(ssid_key(index), ssid);
        if let Some(mode) = mode {
            self.set(mode_key(index), mode);
        }
        if let Some(psk) = psk {
            self.set(psk_key(index), psk);
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// Errors in credential data or storage.
#[derive(Debug)]
pub enum CredentialError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Pre-shared key exceeds maximum length.
    PskTooLong { len: usize, max: usize },
    /// Security mode is not one of the known values.
    UnknownMode(String),
    /// Configuration file could not be read or written.
    Io(std::io::Error),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PskTooLong { len, max } => {
                write!(f, "key too long: {} bytes (max {})", len, max)
            }
            Self::UnknownMode(mode) => write!(f, "unknown security mode: {}", mode),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CredentialError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
