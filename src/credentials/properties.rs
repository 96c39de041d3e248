//! Credential store backed by a `key=value` properties file.
//!
//! Lines starting with `#` are comments. Spaces inside keys are removed and
//! leading spaces of values are trimmed. A missing file is created with a
//! header comment on first load.
//!
//! Uses `~/.rover-uplink/uplink.cfg` by default.
//!
//! # Usage
//!
//! ```ignore
//! use rover_uplink::credentials::PropertiesStore;
//!
//! let store = PropertiesStore::load_default()?;
//! log::info!("Loaded {} settings", store.len());
//! ```

use super::{CredentialError, CredentialStore};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Header written to a newly created file.
const FILE_HEADER: &str = "# Rover uplink configuration\n";

/// Get the default configuration file path.
///
/// Returns `~/.rover-uplink/uplink.cfg`
pub fn default_config_path() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".rover-uplink").join("uplink.cfg"))
}

/// Settings loaded from a properties file.
#[derive(Debug, Clone, Default)]
pub struct PropertiesStore {
    entries: HashMap<String, String>,
}

impl PropertiesStore {
    /// Parse properties text.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim_start().starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("Skipping line {} without '='", line_no + 1);
                continue;
            };
            let key: String = key.chars().filter(|c| *c != ' ').collect();
            if key.is_empty() {
                continue;
            }
            entries.insert(key, value.trim_start_matches(' ').to_string());
        }
        Self { entries }
    }

    /// Load settings from `path`, creating an empty file if none exists.
    pub fn load_from(path: &Path) -> Result<Self, CredentialError> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let store = Self::parse(&text);
                info!("Loaded {} settings from {:?}", store.len(), path);
                Ok(store)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No configuration at {:?}, creating it", path);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, FILE_HEADER)?;
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load settings from the default path.
    pub fn load_default() -> Result<Self, CredentialError> {
        let path = default_config_path()?;
        Self::load_from(&path)
    }

    /// Number of settings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no settings were loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialStore for PropertiesStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSlot;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn test_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        env::temp_dir()
            .join(format!("rover-uplink-test-{}-{}", std::process::id(), id))
            .join("uplink.cfg")
    }

    fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn test_parse_basic() {
        let store = PropertiesStore::parse("wifi.ssid.0=HomeNet\nwifi.mode.0=2\n");
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("wifi.ssid.0").as_deref(), Some("HomeNet"));
        assert_eq!(store.get("wifi.mode.0").as_deref(), Some("2"));
    }

    #[test]
    fn test_parse_comments_and_blanks() {
        let store = PropertiesStore::parse("# header\n\n  # indented comment\nkey=value\n");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_parse_key_spaces_removed() {
        let store = PropertiesStore::parse("wifi. ssid .1 = Lab Net\n");
        assert_eq!(store.get("wifi.ssid.1").as_deref(), Some("Lab Net"));
    }

    #[test]
    fn test_parse_value_keeps_equals() {
        let store = PropertiesStore::parse("wifi.psk.0=a=b\n");
        assert_eq!(store.get("wifi.psk.0").as_deref(), Some("a=b"));
    }

    #[test]
    fn test_parse_crlf() {
        let store = PropertiesStore::parse("wifi.ssid.0=HomeNet\r\n");
        assert_eq!(store.get("wifi.ssid.0").as_deref(), Some("HomeNet"));
    }

    #[test]
    fn test_parse_line_without_equals() {
        let store = PropertiesStore::parse("garbage\nkey=1\n");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_creates_missing_file() {
        let path = test_path();
        cleanup(&path);

        let store = PropertiesStore::load_from(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), FILE_HEADER);

        cleanup(&path);
    }

    #[test]
    fn test_load_existing_file() {
        let path = test_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "wifi.ssid.3=RobotNet\nwifi.psk.3=secret\n").unwrap();

        let store = PropertiesStore::load_from(&path).unwrap();
        let slot = CredentialSlot::resolve(&store, 3).unwrap();
        assert_eq!(slot.ssid, "RobotNet");
        assert!(!slot.is_open());

        cleanup(&path);
    }

    #[test]
    fn test_default_path() {
        if env::var("HOME").is_ok() {
            let path = default_config_path().unwrap();
            assert!(path.ends_with(".rover-uplink/uplink.cfg"));
        }
    }
}
