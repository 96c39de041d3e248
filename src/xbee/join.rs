//! Network join state machine.
//!
//! Brings the modem from power-on to an associated Wi-Fi link, trying the
//! configured credential slots one per attempt.
//!
//! # States
//!
//! ```text
//! Uninitialized --scan success--> Idle
//! Uninitialized --scan failure--> ModuleAbsent
//! Idle/Connecting --association "0"--> Connected
//! Connecting --all slots tried--> PermanentlyUnavailable
//! Idle --no slot configured--> PermanentlyUnavailable
//! Connected --link lost--> Connecting (polls until the modem rejoins)
//! ```
//!
//! # Polling
//!
//! [`NetworkJoin::connect_to_network`] is safe to call every control cycle:
//! it returns immediately until the retry timer is due, and only then spends
//! the guard delays of a command mode exchange.

use super::command::CommandSession;
use super::config::{
    ControllerConfig, API_ASSOCIATION_QUERY, API_MODE_REGISTER, APPLY, APPLY_AND_WRITE,
    ASSOCIATED, ASSOCIATION_QUERY, BASELINE_COMMANDS, BAUD_CANDIDATES, DEVICE_SETUP_COMMANDS,
    DEVICE_TYPE_QUERY, ENABLE_API_MODE, JOIN_IN_PROGRESS, MAX_CREDENTIAL_SLOTS, NETWORK_ID_QUERY,
    TRANSPARENT_MODE,
};
use super::retry::RetryTimer;
use crate::clock::Clock;
use crate::credentials::{CredentialSlot, CredentialStore};
use crate::transport::Transport;
use log::{debug, info, trace, warn};
use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

/// Connection state of the uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No module scan has run yet.
    Uninitialized,
    /// No candidate speed produced a command mode acknowledgment.
    ModuleAbsent,
    /// Modem detected, no join attempted yet.
    Idle,
    /// A credential slot has been applied and the join is pending.
    Connecting,
    /// The modem reported a completed association.
    Connected,
    /// Every configured network was tried, or none is configured.
    PermanentlyUnavailable,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::ModuleAbsent => "module absent",
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::PermanentlyUnavailable => "permanently unavailable",
        };
        write!(f, "{}", name)
    }
}

/// Interpretation of an association status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Fully joined.
    Joined,
    /// The module is still working on the join.
    InProgress,
    /// Not associated.
    NotJoined,
}

impl Association {
    /// Classify an `AI` response.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        if code == ASSOCIATED {
            Self::Joined
        } else if JOIN_IN_PROGRESS.contains(&code) {
            Self::InProgress
        } else {
            Self::NotJoined
        }
    }
}

/// Join state machine driving a [`CommandSession`].
pub struct NetworkJoin<T: Transport, C: Clock> {
    session: CommandSession<T, C>,
    state: ConnectionState,
    detected_baud: Option<u32>,
    /// Index of the last credential slot tried, or 10 once all were scanned.
    attempt_counter: u8,
    /// Set once the first pass over the slots has run.
    slots_started: bool,
    /// Whether the module has been switched to binary API mode.
    api_mode: bool,
    /// Set when re-validation saw a joined link drop; cleared on rejoin.
    link_lost: bool,
    retry: RetryTimer,
    revalidate: Option<RetryTimer>,
    retry_interval: Duration,
    join_settle_interval: Duration,
}

impl<T: Transport, C: Clock> NetworkJoin<T, C> {
    /// Create an uninitialized state machine.
    pub fn new(transport: T, clock: C, config: &ControllerConfig) -> Self {
        let now = clock.now();
        Self {
            session: CommandSession::new(transport, clock, config),
            state: ConnectionState::Uninitialized,
            detected_baud: None,
            attempt_counter: 0,
            slots_started: false,
            api_mode: false,
            link_lost: false,
            retry: RetryTimer::new(now, config.retry_interval),
            revalidate: config
                .revalidate_interval
                .map(|interval| RetryTimer::new(now, interval)),
            retry_interval: config.retry_interval,
            join_settle_interval: config.join_settle_interval,
        }
    }

    /// Forget everything learned about the modem and the join.
    ///
    /// A modem in API mode is first switched back to transparent mode, since
    /// it would otherwise ignore the escape sequence of the next scan.
    pub fn reset(&mut self) {
        if self.api_mode {
            self.leave_api_mode();
        }
        let now = self.session.clock().now();
        self.state = ConnectionState::Uninitialized;
        self.detected_baud = None;
        self.attempt_counter = 0;
        self.slots_started = false;
        self.api_mode = false;
        self.link_lost = false;
        self.retry.restart(now, self.retry_interval);
    }

    /// Send `AP 0` as an API frame. `true` if the modem confirmed it.
    fn leave_api_mode(&mut self) -> bool {
        let confirmed = self
            .session
            .api_command(API_MODE_REGISTER, &[TRANSPARENT_MODE])
            .is_some_and(|response| response.is_ok());
        if confirmed {
            debug!("Modem switched to transparent mode");
        } else {
            debug!("No reply to transparent mode switch");
        }
        self.api_mode = false;
        confirmed
    }

    /// Whether a dropped link is waiting for the modem to rejoin on its own.
    pub fn is_link_lost(&self) -> bool {
        self.link_lost
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Line speed the modem answered at, once detected.
    pub fn detected_baud(&self) -> Option<u32> {
        self.detected_baud
    }

    /// Whether a working line speed has been found.
    pub fn is_detected(&self) -> bool {
        self.detected_baud.is_some()
    }

    /// Last credential slot tried (10 once all slots were scanned).
    pub fn attempt_counter(&self) -> u8 {
        self.attempt_counter
    }

    /// Whether the modem is in binary API mode.
    pub fn api_mode(&self) -> bool {
        self.api_mode
    }

    /// The command session (and through it the transport).
    pub fn session_mut(&mut self) -> &mut CommandSession<T, C> {
        &mut self.session
    }

    /// Probe each candidate speed until the modem answers the escape sequence.
    ///
    /// A modem left in API mode ignores the escape, so a speed that gets no
    /// acknowledgment is also offered an API `AP 0` frame; if that is
    /// answered, the escape is tried once more.
    ///
    /// On success the module is configured, its association is checked once,
    /// and the state becomes `Idle` (or `Connected` if it was already joined).
    /// Otherwise the state becomes `ModuleAbsent`.
    pub fn scan_for_module(&mut self) -> bool {
        info!("Scanning for modem");

        let mut found = None;
        for &baud in BAUD_CANDIDATES.iter() {
            trace!("Probing {} baud", baud);
            if let Err(e) = self.session.transport_mut().reconfigure(baud) {
                warn!("Cannot switch line to {} baud: {}", baud, e);
                continue;
            }
            if self.session.enter_command_mode() {
                found = Some(baud);
                break;
            }
            if self.leave_api_mode() && self.session.enter_command_mode() {
                info!("Modem was left in API mode at {} baud", baud);
                found = Some(baud);
                break;
            }
        }

        let Some(baud) = found else {
            warn!("No modem answered at any supported baud rate");
            self.state = ConnectionState::ModuleAbsent;
            return false;
        };

        info!("Modem detected at {} baud", baud);
        self.detected_baud = Some(baud);
        self.state = ConnectionState::Idle;
        self.api_mode = false;

        self.configure_device();
        let association = self.query_association(true);
        self.session.exit_command_mode();

        if association != Association::InProgress {
            let now = self.session.clock().now();
            self.retry.restart(now, self.retry_interval);
        }
        true
    }

    /// One-time module setup. Must be called in command mode.
    fn configure_device(&mut self) {
        let device = self.session.send_command(DEVICE_TYPE_QUERY, false);
        info!("Device type: {}", device);

        for (command, label) in DEVICE_SETUP_COMMANDS {
            let reply = self.session.send_command(command, false);
            if reply == "OK" {
                debug!("Configured {} ({})", label, command);
            } else {
                warn!("Setting {} ({}) not confirmed: {:?}", label, command, reply);
            }
        }
    }

    /// Query association and update the state.
    ///
    /// With `atomic`, the query runs in its own command mode session. Once
    /// the module is in API mode the query goes out as an API frame instead.
    pub fn is_connected(&mut self, log_on_success: bool, atomic: bool) -> bool {
        if self.api_mode {
            self.check_link();
        } else if atomic {
            if !self.session.enter_command_mode() {
                trace!("Association check skipped, no command mode");
                return self.state == ConnectionState::Connected;
            }
            self.query_association(log_on_success);
            self.session.exit_command_mode();
        } else {
            self.query_association(log_on_success);
        }
        self.state == ConnectionState::Connected
    }

    /// AT-mode association query. Must be called in command mode.
    fn query_association(&mut self, log_on_success: bool) -> Association {
        let code = self
            .session
            .send_command(ASSOCIATION_QUERY, false)
            .trim()
            .to_string();
        let association = Association::from_code(&code);
        let now = self.session.clock().now();

        match association {
            Association::Joined => {
                if self.state != ConnectionState::Connected {
                    info!("Wireless network joined");
                }
                self.state = ConnectionState::Connected;
                self.link_lost = false;

                if log_on_success {
                    let network = self.session.send_command(NETWORK_ID_QUERY, false);
                    info!("Connected to network '{}'", network);
                }
                if !self.api_mode {
                    self.session.send_command(ENABLE_API_MODE, false);
                    self.session.send_command(APPLY, false);
                    self.api_mode = true;
                    debug!("Modem switched to API mode");
                }
                if let Some(timer) = &mut self.revalidate {
                    timer.restart(now, timer.interval());
                }
            }
            Association::InProgress => {
                debug!("Join in progress (AI={})", code);
                self.retry.restart(now, self.join_settle_interval);
            }
            Association::NotJoined => {
                trace!("Not associated (AI={:?})", code);
            }
        }
        association
    }

    /// Advance the join by at most one credential slot.
    ///
    /// Returns immediately with the current state unless the retry timer is
    /// due and the state is `Idle` or `Connecting`.
    pub fn connect_to_network<S: CredentialStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> ConnectionState {
        match self.state {
            ConnectionState::Idle | ConnectionState::Connecting => {}
            other => return other,
        }

        let now = self.session.clock().now();
        if !self.retry.is_due(now) {
            return self.state;
        }

        if !self.session.enter_command_mode() {
            debug!("Modem did not enter command mode, retrying later");
            self.retry.restart(now, self.retry_interval);
            return self.state;
        }

        if self.query_association(true) != Association::NotJoined {
            self.session.exit_command_mode();
            return self.state;
        }

        // The saved credentials are still in the modem; wait for it to rejoin
        if self.link_lost {
            self.session.exit_command_mode();
            debug!("Waiting for the saved network to return");
            self.retry.restart(now, self.retry_interval);
            return self.state;
        }

        if self.slots_started && self.attempt_counter >= MAX_CREDENTIAL_SLOTS {
            self.session.exit_command_mode();
            info!("No configured wireless network available");
            self.state = ConnectionState::PermanentlyUnavailable;
            return self.state;
        }

        let first_pass = !self.slots_started;
        let start = if first_pass {
            0
        } else {
            self.attempt_counter + 1
        };
        self.slots_started = true;

        let slot = (start..MAX_CREDENTIAL_SLOTS).find_map(|index| CredentialSlot::resolve(store, index));
        let Some(slot) = slot else {
            self.attempt_counter = MAX_CREDENTIAL_SLOTS;
            self.session.exit_command_mode();
            if first_pass {
                info!("No wireless networks configured");
                self.state = ConnectionState::PermanentlyUnavailable;
            } else {
                let now = self.session.clock().now();
                self.retry.restart(now, self.retry_interval);
            }
            return self.state;
        };

        if first_pass {
            for (command, label) in BASELINE_COMMANDS {
                let reply = self.session.send_command(command, false);
                debug!("Baseline {} ({}): {}", label, command, reply);
            }
        }

        self.attempt_counter = slot.index;
        self.state = ConnectionState::Connecting;
        self.apply_slot(&slot);
        self.session.exit_command_mode();

        let now = self.session.clock().now();
        self.retry.restart(now, self.retry_interval);
        self.state
    }

    /// Send one slot's credentials and save them. Must be called in command mode.
    fn apply_slot(&mut self, slot: &CredentialSlot) {
        info!("Trying network '{}' (slot {})", slot.ssid, slot.index);

        let command = format!("ID {}", slot.ssid);
        let reply = self.session.send_command(&command, false);
        info!("Set SSID '{}': {}", slot.ssid, reply);

        if let Some(mode) = slot.security {
            let command = format!("EE {}", mode.code());
            let reply = self.session.send_command(&command, false);
            info!("Set security {}: {}", mode, reply);
        }

        if let Some(psk) = &slot.psk {
            let command = Zeroizing::new(format!("PK {}", psk.as_str()));
            let reply = self.session.send_command(&command, false);
            info!("Set key ****: {}", reply);
        }

        info!("Saving wireless configuration");
        self.session.send_command(APPLY_AND_WRITE, false);
    }

    /// Whether the uplink can carry traffic, advancing the join if not.
    pub fn is_ready<S: CredentialStore + ?Sized>(&mut self, store: &S) -> bool {
        self.revalidate();
        match self.state {
            ConnectionState::Connected => true,
            ConnectionState::Uninitialized
            | ConnectionState::ModuleAbsent
            | ConnectionState::PermanentlyUnavailable => false,
            ConnectionState::Idle | ConnectionState::Connecting => {
                self.connect_to_network(store) == ConnectionState::Connected
            }
        }
    }

    /// Re-check the association of a connected link when its timer is due.
    pub fn revalidate(&mut self) -> ConnectionState {
        if self.state != ConnectionState::Connected || !self.api_mode {
            return self.state;
        }
        let now = self.session.clock().now();
        let due = self.revalidate.is_some_and(|timer| timer.is_due(now));
        if due {
            self.check_link();
        }
        self.state
    }

    /// API-mode association check. A lost link returns the module to
    /// transparent mode and the state to `Connecting`.
    fn check_link(&mut self) {
        let reply = self.session.api_command(API_ASSOCIATION_QUERY, &[]);
        let now = self.session.clock().now();

        match reply {
            Some(response) if response.is_ok() => {
                let code = response.data.first().copied().unwrap_or(0xFF);
                if code == 0 {
                    trace!("Link confirmed");
                    self.state = ConnectionState::Connected;
                } else {
                    warn!("Wireless link lost (AI=0x{:02X})", code);
                    self.state = ConnectionState::Connecting;
                    self.link_lost = true;
                    self.leave_api_mode();
                    self.retry.restart(now, self.join_settle_interval);
                    return;
                }
            }
            Some(response) => debug!("Association check rejected (status {})", response.status),
            None => debug!("No reply to association check"),
        }

        if let Some(timer) = &mut self.revalidate {
            timer.restart(now, timer.interval());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::credentials::MemoryStore;
    use crate::transport::SimulatedModem;

    type Join = NetworkJoin<SimulatedModem, ManualClock>;

    fn join_over(modem: &SimulatedModem, config: &ControllerConfig) -> (Join, ManualClock) {
        let clock = ManualClock::new();
        (NetworkJoin::new(modem.clone(), clock.clone(), config), clock)
    }

    /// A detected modem at 9600 baud with the scan traffic cleared.
    fn detected(modem: &SimulatedModem) -> (Join, ManualClock) {
        let (mut join, clock) = join_over(modem, &ControllerConfig::default());
        assert!(join.scan_for_module());
        modem.clear_commands();
        (join, clock)
    }

    /// Enough time for any retry interval, guard delays included.
    const PAST_RETRY: Duration = Duration::from_secs(11);

    fn count_prefixed(commands: &[String], prefix: &str) -> usize {
        commands.iter().filter(|c| c.starts_with(prefix)).count()
    }

    // ==================== Association Code Tests ====================

    #[test]
    fn test_association_codes() {
        assert_eq!(Association::from_code("0"), Association::Joined);
        assert_eq!(Association::from_code(" 0 "), Association::Joined);
        for code in ["1", "2", "41", "42"] {
            assert_eq!(Association::from_code(code), Association::InProgress);
        }
        assert_eq!(Association::from_code("23"), Association::NotJoined);
        assert_eq!(Association::from_code(""), Association::NotJoined);
        assert_eq!(Association::from_code("FF"), Association::NotJoined);
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_scan_detects_third_candidate() {
        let modem = SimulatedModem::new(BAUD_CANDIDATES[2]);
        let (mut join, _clock) = join_over(&modem, &ControllerConfig::default());

        assert!(join.scan_for_module());
        assert!(join.is_detected());
        assert_eq!(join.detected_baud(), Some(38_400));
        assert_eq!(join.state(), ConnectionState::Idle);
        assert_eq!(modem.baud_history(), vec![115_200, 9_600, 38_400]);
    }

    #[test]
    fn test_scan_without_modem() {
        let modem = SimulatedModem::absent();
        let (mut join, _clock) = join_over(&modem, &ControllerConfig::default());

        assert!(!join.scan_for_module());
        assert!(!join.is_detected());
        assert_eq!(join.state(), ConnectionState::ModuleAbsent);
        assert_eq!(modem.baud_history(), BAUD_CANDIDATES.to_vec());
    }

    #[test]
    fn test_scan_configures_device() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, _clock) = join_over(&modem, &ControllerConfig::default());

        join.scan_for_module();
        assert_eq!(
            modem.commands(),
            vec!["DD", "DO 0", "AP 0", "AO 2", "IP 1", "AH 2", "AI", "CN"]
        );
        assert!(!modem.in_command_mode());
    }

    #[test]
    fn test_scan_finds_module_already_joined() {
        let modem = SimulatedModem::new(9_600);
        modem.set_association(&["0"]);
        let (mut join, _clock) = join_over(&modem, &ControllerConfig::default());

        join.scan_for_module();
        assert_eq!(join.state(), ConnectionState::Connected);
        assert!(join.api_mode());
        assert!(modem.in_api_mode());
        let commands = modem.commands();
        assert!(commands.ends_with(&[
            "AI".to_string(),
            "ID".to_string(),
            "AP 1".to_string(),
            "AC".to_string(),
            "CN".to_string()
        ]));
    }

    #[test]
    fn test_absent_module_never_ready() {
        let modem = SimulatedModem::absent();
        let (mut join, clock) = join_over(&modem, &ControllerConfig::default());
        let mut store = MemoryStore::new();
        store.set_slot(0, "HomeNet", None, None);

        join.scan_for_module();
        clock.advance(PAST_RETRY);
        assert!(!join.is_ready(&store));
        assert_eq!(join.connect_to_network(&store), ConnectionState::ModuleAbsent);
    }

    #[test]
    fn test_uninitialized_not_ready() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = join_over(&modem, &ControllerConfig::default());

        clock.advance(PAST_RETRY);
        assert!(!join.is_ready(&MemoryStore::new()));
        assert!(modem.commands().is_empty());
    }

    // ==================== Join Tests ====================

    #[test]
    fn test_poll_before_interval_is_noop() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, _clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "HomeNet", None, None);

        assert_eq!(join.connect_to_network(&store), ConnectionState::Idle);
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn test_empty_store_gives_up_on_first_call() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let store = MemoryStore::new();

        assert_eq!(join.state(), ConnectionState::Idle);
        clock.advance(PAST_RETRY);
        assert_eq!(
            join.connect_to_network(&store),
            ConnectionState::PermanentlyUnavailable
        );
        let commands = modem.commands();
        assert_eq!(count_prefixed(&commands, "ID "), 0);
        assert_eq!(count_prefixed(&commands, "MA"), 0);

        // Terminal: no further traffic
        modem.clear_commands();
        clock.advance(PAST_RETRY);
        assert!(!join.is_ready(&store));
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn test_single_slot_three() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set("wifi.ssid.3", "RobotNet");

        clock.advance(PAST_RETRY);
        assert_eq!(join.connect_to_network(&store), ConnectionState::Connecting);

        let commands = modem.commands();
        assert_eq!(count_prefixed(&commands, "ID "), 1);
        assert!(commands.contains(&"ID RobotNet".to_string()));
        assert_eq!(count_prefixed(&commands, "EE"), 0);
        assert_eq!(count_prefixed(&commands, "PK"), 0);
        assert!(commands.contains(&"MA 0".to_string()));
        assert!(commands.contains(&"AC,WR".to_string()));
        assert_eq!(join.attempt_counter(), 3);

        // Timer restarted: an immediate poll does nothing
        modem.clear_commands();
        join.connect_to_network(&store);
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn test_slot_with_security() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "HomeNet", Some("wpa2"), Some("password123"));

        clock.advance(PAST_RETRY);
        join.connect_to_network(&store);

        assert_eq!(modem.register("ID").as_deref(), Some("HomeNet"));
        assert_eq!(modem.register("EE").as_deref(), Some("2"));
        assert_eq!(modem.register("PK").as_deref(), Some("password123"));
    }

    #[test]
    fn test_slot_with_unusable_key_joins_open() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "HomeNet", Some("wpa2"), Some(&"k".repeat(65)));

        clock.advance(PAST_RETRY);
        join.connect_to_network(&store);

        assert_eq!(modem.register("EE").as_deref(), Some("0"));
        assert_eq!(count_prefixed(&modem.commands(), "PK"), 0);
    }

    #[test]
    fn test_baseline_only_on_first_pass() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "A", None, None);
        store.set_slot(1, "B", None, None);

        clock.advance(PAST_RETRY);
        join.connect_to_network(&store);
        assert_eq!(count_prefixed(&modem.commands(), "MA 0"), 1);

        modem.clear_commands();
        clock.advance(PAST_RETRY);
        join.connect_to_network(&store);
        assert_eq!(count_prefixed(&modem.commands(), "MA 0"), 0);
        assert!(modem.commands().contains(&"ID B".to_string()));
    }

    #[test]
    fn test_in_progress_defers_next_slot() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "A", None, None);
        store.set_slot(1, "B", None, None);

        clock.advance(PAST_RETRY);
        join.connect_to_network(&store);
        assert_eq!(join.attempt_counter(), 0);

        modem.set_association(&["41"]);
        modem.clear_commands();
        clock.advance(PAST_RETRY);
        assert_eq!(join.connect_to_network(&store), ConnectionState::Connecting);
        assert_eq!(join.attempt_counter(), 0);
        assert_eq!(modem.commands(), vec!["AI", "CN"]);

        // Extended interval: 5 s later is still too early
        modem.clear_commands();
        clock.advance(Duration::from_secs(5));
        join.connect_to_network(&store);
        assert!(modem.commands().is_empty());

        modem.set_association(&["FF"]);
        clock.advance(Duration::from_secs(5));
        join.connect_to_network(&store);
        assert_eq!(join.attempt_counter(), 1);
        assert!(modem.commands().contains(&"ID B".to_string()));
    }

    #[test]
    fn test_counter_monotonic_and_bounded() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "A", None, None);
        store.set_slot(2, "C", None, None);
        store.set_slot(5, "F", None, None);

        let mut counters = Vec::new();
        let mut states = Vec::new();
        for _ in 0..7 {
            clock.advance(PAST_RETRY);
            states.push(join.connect_to_network(&store));
            counters.push(join.attempt_counter());
        }

        assert_eq!(counters, vec![0, 2, 5, 10, 10, 10, 10]);
        assert!(counters.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(states[3], ConnectionState::Connecting);
        assert_eq!(states[4], ConnectionState::PermanentlyUnavailable);
        assert_eq!(join.state(), ConnectionState::PermanentlyUnavailable);
    }

    #[test]
    fn test_join_completes() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, clock) = detected(&modem);
        let mut store = MemoryStore::new();
        store.set_slot(0, "HomeNet", None, None);

        clock.advance(PAST_RETRY);
        assert!(!join.is_ready(&store));

        modem.set_association(&["0"]);
        clock.advance(PAST_RETRY);
        assert!(join.is_ready(&store));
        assert_eq!(join.state(), ConnectionState::Connected);
        assert!(modem.in_api_mode());
        assert_eq!(join.attempt_counter(), 0);
    }

    #[test]
    fn test_is_connected_atomic() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, _clock) = detected(&modem);

        modem.set_association(&["0"]);
        assert!(join.is_connected(false, true));
        assert_eq!(modem.commands(), vec!["AI", "AP 1", "AC", "CN"]);
    }

    #[test]
    fn test_is_connected_not_joined() {
        let modem = SimulatedModem::new(9_600);
        let (mut join, _clock) = detected(&modem);

        assert!(!join.is_connected(true, true));
        assert_eq!(join.state(), ConnectionState::Idle);
    }

    // ==================== Re-validation Tests ====================

    fn connected(config: &ControllerConfig) -> (SimulatedModem, Join, ManualClock) {
        let modem = SimulatedModem::new(9_600);
        modem.set_association(&["0"]);
        let (mut join, clock) = join_over(&modem, config);
        join.scan_for_module();
        assert_eq!(join.state(), ConnectionState::Connected);
        modem.clear_commands();
        (modem, join, clock)
    }

    #[test]
    fn test_revalidate_not_due() {
        let (modem, mut join, clock) = connected(&ControllerConfig::default());

        clock.advance(Duration::from_secs(10));
        assert_eq!(join.revalidate(), ConnectionState::Connected);
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn test_revalidate_link_still_up() {
        let (modem, mut join, clock) = connected(&ControllerConfig::default());

        clock.advance(Duration::from_secs(61));
        assert_eq!(join.revalidate(), ConnectionState::Connected);
        assert_eq!(modem.commands(), vec!["API:AI"]);
    }

    #[test]
    fn test_revalidate_link_lost() {
        let (modem, mut join, clock) = connected(&ControllerConfig::default());

        modem.set_association(&["23"]);
        clock.advance(Duration::from_secs(61));
        assert_eq!(join.revalidate(), ConnectionState::Connecting);
        assert_eq!(modem.commands(), vec!["API:AI", "API:AP"]);
        assert!(!join.api_mode());
        assert!(!modem.in_api_mode());

        // Back in transparent mode, command mode works again
        modem.set_association(&["0"]);
        clock.advance(PAST_RETRY);
        assert!(join.is_ready(&MemoryStore::new()));
        assert!(modem.in_api_mode());
    }

    #[test]
    fn test_revalidate_disabled() {
        let config = ControllerConfig {
            revalidate_interval: None,
            ..Default::default()
        };
        let (modem, mut join, clock) = connected(&config);

        clock.advance(Duration::from_secs(600));
        assert_eq!(join.revalidate(), ConnectionState::Connected);
        assert!(modem.commands().is_empty());
    }

    #[test]
    fn test_dropped_link_waits_for_rejoin() {
        let (modem, mut join, clock) = connected(&ControllerConfig::default());
        let mut store = MemoryStore::new();
        store.set_slot(0, "HomeNet", None, None);

        modem.set_association(&["23"]);
        clock.advance(Duration::from_secs(61));
        assert_eq!(join.revalidate(), ConnectionState::Connecting);
        assert!(join.is_link_lost());

        let mut states = Vec::new();
        for _ in 0..5 {
            clock.advance(PAST_RETRY);
            assert!(!join.is_ready(&store));
            states.push(join.state());
        }
        assert!(states.iter().all(|s| *s == ConnectionState::Connecting));
        assert_eq!(count_prefixed(&modem.commands(), "ID "), 0);
        assert_eq!(join.attempt_counter(), 0);

        // Access point back: the modem rejoins with its saved network
        modem.set_association(&["0"]);
        clock.advance(PAST_RETRY);
        assert!(join.is_ready(&store));
        assert!(!join.is_link_lost());
        assert!(modem.in_api_mode());
    }

    #[test]
    fn test_scan_finds_modem_left_in_api_mode() {
        let modem = SimulatedModem::new(57_600);
        modem.set_association(&["0"]);
        let (mut first, _clock) = join_over(&modem, &ControllerConfig::default());
        assert!(first.scan_for_module());
        assert!(modem.in_api_mode());

        // A restarted controller knows nothing about the modem's mode
        modem.clear_commands();
        let (mut join, _clock) = join_over(&modem, &ControllerConfig::default());
        assert!(join.scan_for_module());
        assert_eq!(join.detected_baud(), Some(57_600));
        assert_eq!(join.state(), ConnectionState::Connected);
        assert_eq!(modem.commands().first().map(String::as_str), Some("API:AP"));
    }

    #[test]
    fn test_reset() {
        let (modem, mut join, _clock) = connected(&ControllerConfig::default());

        join.reset();
        assert_eq!(join.state(), ConnectionState::Uninitialized);
        assert!(!join.is_detected());
        assert!(!join.api_mode());
        assert!(!modem.in_api_mode());
        assert_eq!(modem.commands(), vec!["API:AP"]);
        assert_eq!(join.attempt_counter(), 0);
    }
}
