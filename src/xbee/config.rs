//! Modem constants and controller timing configuration.

use std::fmt;
use std::time::Duration;

/// Line speeds probed during detection, most likely first.
pub const BAUD_CANDIDATES: [u32; 5] = [115_200, 9_600, 38_400, 57_600, 230_400];

/// Escape sequence that switches the modem into AT command mode.
pub const ESCAPE_SEQUENCE: &[u8] = b"+++";

/// Acknowledgment sent by the modem on entering command mode.
pub const COMMAND_MODE_ACK: &[u8; 3] = b"OK\r";

/// Leave command mode and apply pending changes.
pub const EXIT_COMMAND: &str = "CN";

/// Association status query.
pub const ASSOCIATION_QUERY: &str = "AI";

/// Network name (SSID) query.
pub const NETWORK_ID_QUERY: &str = "ID";

/// Device type query.
pub const DEVICE_TYPE_QUERY: &str = "DD";

/// Apply pending changes and write them to non-volatile memory.
pub const APPLY_AND_WRITE: &str = "AC,WR";

/// Apply pending changes.
pub const APPLY: &str = "AC";

/// Switch to binary API frame mode.
pub const ENABLE_API_MODE: &str = "AP 1";

/// Association status query as an API command mnemonic.
pub const API_ASSOCIATION_QUERY: [u8; 2] = *b"AI";

/// DNS lookup as an API command mnemonic.
pub const API_DNS_LOOKUP: [u8; 2] = *b"LA";

/// API enable register as an API command mnemonic.
pub const API_MODE_REGISTER: [u8; 2] = *b"AP";

/// `AP` value selecting transparent mode.
pub const TRANSPARENT_MODE: u8 = 0;

/// Capacity of the shared command response buffer.
pub const RESPONSE_CAPACITY: usize = 255;

/// Number of credential slots (`wifi.*.0` through `wifi.*.9`).
pub const MAX_CREDENTIAL_SLOTS: u8 = 10;

/// Association code for a fully joined network.
pub const ASSOCIATED: &str = "0";

/// Association codes reported while a join is still underway.
pub const JOIN_IN_PROGRESS: [&str; 4] = ["1", "2", "41", "42"];

/// One-time module setup sent right after the modem is detected.
///
/// Each entry is the command and a label for the log line.
pub const DEVICE_SETUP_COMMANDS: &[(&str, &str)] = &[
    ("DO 0", "device options"),
    ("AP 0", "transparent mode"),
    ("AO 2", "API output"),
    ("IP 1", "TCP sockets"),
    ("AH 2", "infrastructure network"),
];

/// Baseline network configuration sent before the first credential slot.
pub const BASELINE_COMMANDS: &[(&str, &str)] = &[
    ("MA 0", "DHCP addressing"),
    ("AH 2", "infrastructure network"),
];

/// Default guard time around the escape sequence.
pub const GUARD_TIME: Duration = Duration::from_millis(1000);

/// Default timeout for reading a command response.
pub const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default minimum interval between join attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(5000);

/// Default interval while the modem reports a join in progress.
pub const JOIN_SETTLE_INTERVAL: Duration = Duration::from_millis(10_000);

/// Default interval between association checks while connected.
pub const REVALIDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Default timeout for an API-mode command response frame.
pub const API_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Timing and behavior of the wireless controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Silence required before and after the escape sequence.
    pub guard_time: Duration,

    /// Maximum wait for a command mode acknowledgment or response byte.
    pub read_timeout: Duration,

    /// Minimum interval between join attempts.
    pub retry_interval: Duration,

    /// Interval used while the modem reports a join in progress.
    pub join_settle_interval: Duration,

    /// How often to re-check association while connected (`None` disables).
    pub revalidate_interval: Option<Duration>,

    /// Maximum wait for an API-mode command response.
    pub api_timeout: Duration,

    /// Host name to resolve through the modem before reporting available.
    pub resolve_host: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            guard_time: GUARD_TIME,
            read_timeout: COMMAND_READ_TIMEOUT,
            retry_interval: RETRY_INTERVAL,
            join_settle_interval: JOIN_SETTLE_INTERVAL,
            revalidate_interval: Some(REVALIDATE_INTERVAL),
            api_timeout: API_RESPONSE_TIMEOUT,
            resolve_host: None,
        }
    }
}

impl ControllerConfig {
    /// Config that resolves `host` before reporting the network available.
    pub fn with_resolve_host(host: impl Into<String>) -> Self {
        Self {
            resolve_host: Some(host.into()),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guard_time.is_zero() {
            return Err(ConfigError::InvalidTiming("guard_time must be > 0"));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::InvalidTiming("read_timeout must be > 0"));
        }
        if self.join_settle_interval < self.retry_interval {
            return Err(ConfigError::InvalidTiming(
                "join_settle_interval must be >= retry_interval",
            ));
        }
        if self.revalidate_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidTiming(
                "revalidate_interval must be > 0 when enabled",
            ));
        }
        if let Some(host) = &self.resolve_host {
            if host.trim().is_empty() {
                return Err(ConfigError::EmptyResolveHost);
            }
        }
        Ok(())
    }
}

/// Controller configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A timing parameter is out of range.
    InvalidTiming(&'static str),
    /// `resolve_host` is set but blank.
    EmptyResolveHost,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTiming(msg) => write!(f, "invalid controller config: {}", msg),
            Self::EmptyResolveHost => write!(f, "resolve host cannot be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_intervals() {
        let config = ControllerConfig::default();
        assert_eq!(config.retry_interval, Duration::from_millis(5000));
        assert_eq!(config.join_settle_interval, Duration::from_millis(10_000));
        assert_eq!(config.guard_time, Duration::from_millis(1000));
    }

    #[test]
    fn test_baud_candidate_order() {
        assert_eq!(BAUD_CANDIDATES[0], 115_200);
        assert_eq!(BAUD_CANDIDATES[1], 9_600);
        assert_eq!(BAUD_CANDIDATES[2], 38_400);
    }

    #[test]
    fn test_zero_guard_time_rejected() {
        let config = ControllerConfig {
            guard_time: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTiming(_))
        ));
    }

    #[test]
    fn test_settle_shorter_than_retry_rejected() {
        let config = ControllerConfig {
            join_settle_interval: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_resolve_host_rejected() {
        let config = ControllerConfig::with_resolve_host("  ");
        assert_eq!(config.validate(), Err(ConfigError::EmptyResolveHost));
    }

    #[test]
    fn test_resolve_host_config() {
        let config = ControllerConfig::with_resolve_host("reports.example.net");
        assert_eq!(config.resolve_host.as_deref(), Some("reports.example.net"));
        assert!(config.validate().is_ok());
    }
}
