//! Simulated modem for host tests.
//!
//! [`SimulatedModem`] behaves like the radio modem at the byte level:
//!
//! - it only understands traffic at its own line speed; anything written at
//!   another speed is lost;
//! - `+++` switches it to command mode and is acknowledged with `OK\r`;
//! - `AT` lines are answered like the real module, `ATCN` leaves command mode;
//! - association codes returned by `ATAI` are scripted by the test;
//! - `ATAP 1` followed by apply (`AC` or `CN`) switches it to API mode, where
//!   it records every frame and answers local AT command frames.
//!
//! Clones share state, so a test keeps one handle for inspection while the
//! controller owns another.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rover_uplink::transport::{SimulatedModem, Transport};
//!
//! let mut modem = SimulatedModem::new(9600);
//! modem.reconfigure(9600).unwrap();
//! modem.write(b"+++").unwrap();
//!
//! let mut ack = [0u8; 3];
//! modem.read_timeout(&mut ack, Duration::from_secs(1)).unwrap();
//! assert_eq!(&ack, b"OK\r");
//! ```

use super::{Transport, TransportError};
use crate::xbee::frame::{ApiFrame, FRAME_TYPE_AT_COMMAND, FRAME_TYPE_AT_RESPONSE};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

/// Response code for a rejected API command.
const API_STATUS_ERROR: u8 = 1;

#[derive(Debug)]
struct ModemState {
    /// Speed the modem listens at; `None` when nothing is attached.
    modem_baud: Option<u32>,
    line_baud: u32,
    baud_history: Vec<u32>,
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    command_mode: bool,
    api_mode: bool,
    commands: Vec<String>,
    association: VecDeque<String>,
    registers: HashMap<String, String>,
    lookups: HashMap<String, Ipv4Addr>,
    frames: Vec<Vec<u8>>,
    transparent: Vec<u8>,
}

impl ModemState {
    fn listening(&self) -> bool {
        self.modem_baud == Some(self.line_baud)
    }

    fn reply(&mut self, text: &str) {
        self.rx.extend(text.as_bytes());
        self.rx.push_back(b'\r');
    }

    /// Current association code; the last scripted code is sticky.
    fn next_association(&mut self) -> String {
        if self.association.len() > 1 {
            self.association.pop_front().unwrap_or_default()
        } else {
            self.association.front().cloned().unwrap_or_else(|| "FF".into())
        }
    }

    fn apply_registers(&mut self) {
        self.api_mode = self.registers.get("AP").map(String::as_str) == Some("1");
    }

    fn process(&mut self) {
        if !self.listening() {
            self.pending.clear();
            return;
        }

        if self.command_mode {
            self.process_command_lines();
        } else if self.api_mode {
            self.process_frames();
        } else if self.pending.ends_with(b"+++") {
            self.pending.clear();
            self.command_mode = true;
            self.reply("OK");
        } else {
            self.transparent.append(&mut self.pending);
        }
    }

    fn process_command_lines(&mut self) {
        if self.pending == b"+++" {
            self.pending.clear();
            self.reply("OK");
            return;
        }

        while let Some(end) = self.pending.iter().position(|b| *b == b'\r') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
            match text.strip_prefix("AT") {
                Some(command) => self.handle_command(command),
                None => self.reply("ERROR"),
            }
            if !self.command_mode {
                // Anything after ATCN is data again
                self.pending.clear();
                break;
            }
        }
    }

    fn handle_command(&mut self, command: &str) {
        self.commands.push(command.to_string());

        // AC,WR style: several commands, one reply
        let parts: Vec<&str> = command.split(',').collect();
        let mut reply = String::from("OK");
        for part in parts {
            let part = part.trim();
            let (mnemonic, argument) = match (part.get(..2), part.get(2..)) {
                (Some(m), Some(a)) => (m.to_ascii_uppercase(), a.trim().to_string()),
                _ => (part.to_ascii_uppercase(), String::new()),
            };

            reply = match mnemonic.as_str() {
                "CN" => {
                    self.command_mode = false;
                    self.apply_registers();
                    "OK".into()
                }
                "AC" => {
                    self.apply_registers();
                    "OK".into()
                }
                "WR" => "OK".into(),
                "AI" => self.next_association(),
                "DD" => "50000".into(),
                "LA" => match self.lookups.get(&argument) {
                    Some(ip) => ip.to_string(),
                    None => "ERROR".into(),
                },
                _ if argument.is_empty() => self
                    .registers
                    .get(&mnemonic)
                    .cloned()
                    .unwrap_or_else(|| "0".into()),
                _ => {
                    self.registers.insert(mnemonic.clone(), argument);
                    "OK".into()
                }
            };
        }
        self.reply(&reply);
    }

    fn process_frames(&mut self) {
        loop {
            match self.pending.iter().position(|b| *b == 0x7E) {
                Some(0) => {}
                Some(start) => {
                    self.pending.drain(..start);
                }
                None => {
                    self.pending.clear();
                    return;
                }
            }
            if self.pending.len() < 3 {
                return;
            }
            let len = u16::from_be_bytes([self.pending[1], self.pending[2]]) as usize;
            if self.pending.len() < len + 4 {
                return;
            }
            let raw: Vec<u8> = self.pending.drain(..len + 4).collect();
            if let Ok((frame, _)) = ApiFrame::decode(&raw) {
                if frame.frame_type == FRAME_TYPE_AT_COMMAND {
                    self.handle_api_command(&frame);
                }
            }
            self.frames.push(raw);
        }
    }

    fn handle_api_command(&mut self, frame: &ApiFrame) {
        if frame.data.len() < 3 {
            return;
        }
        let frame_id = frame.data[0];
        let command = [frame.data[1], frame.data[2]];
        let parameter = &frame.data[3..];
        self.commands
            .push(format!("API:{}", String::from_utf8_lossy(&command)));

        let (status, value) = match &command {
            b"AI" => {
                let code = self.next_association();
                (0, vec![u8::from_str_radix(&code, 16).unwrap_or(0xFF)])
            }
            b"LA" => {
                let host = String::from_utf8_lossy(parameter).to_string();
                match self.lookups.get(&host) {
                    Some(ip) => (0, ip.octets().to_vec()),
                    None => (API_STATUS_ERROR, Vec::new()),
                }
            }
            b"AP" => {
                if let Some(mode) = parameter.first() {
                    self.registers.insert("AP".into(), mode.to_string());
                    self.apply_registers();
                }
                (0, Vec::new())
            }
            _ => (0, Vec::new()),
        };

        if frame_id == 0 {
            return;
        }
        let mut data = vec![frame_id, command[0], command[1], status];
        data.extend_from_slice(&value);
        if let Ok(bytes) = ApiFrame::new(FRAME_TYPE_AT_RESPONSE, data).encode() {
            self.rx.extend(bytes);
        }
    }
}

/// In-memory stand-in for the radio modem.
#[derive(Debug, Clone)]
pub struct SimulatedModem {
    state: Rc<RefCell<ModemState>>,
}

impl SimulatedModem {
    /// A modem listening at `baud`, not yet associated.
    pub fn new(baud: u32) -> Self {
        Self::with_modem_baud(Some(baud))
    }

    /// Nothing attached: no speed gets an answer.
    pub fn absent() -> Self {
        Self::with_modem_baud(None)
    }

    fn with_modem_baud(modem_baud: Option<u32>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ModemState {
                modem_baud,
                line_baud: 0,
                baud_history: Vec::new(),
                rx: VecDeque::new(),
                pending: Vec::new(),
                command_mode: false,
                api_mode: false,
                commands: Vec::new(),
                association: VecDeque::new(),
                registers: HashMap::new(),
                lookups: HashMap::new(),
                frames: Vec::new(),
                transparent: Vec::new(),
            })),
        }
    }

    /// Attach a modem listening at `baud`, as if it was just powered up.
    pub fn attach(&self, baud: u32) {
        self.state.borrow_mut().modem_baud = Some(baud);
    }

    /// Script the codes returned by successive association queries.
    ///
    /// The last code keeps being returned once the others are used up.
    pub fn set_association(&self, codes: &[&str]) {
        let mut state = self.state.borrow_mut();
        state.association = codes.iter().map(|c| c.to_string()).collect();
    }

    /// Make a DNS lookup of `host` succeed.
    pub fn add_lookup(&self, host: &str, ip: Ipv4Addr) {
        self.state.borrow_mut().lookups.insert(host.to_string(), ip);
    }

    /// Queue inbound bytes as if the modem sent them.
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes);
    }

    /// Every AT command received, without the `AT` prefix.
    ///
    /// Commands sent as API frames appear as `API:<mnemonic>`.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    /// Every complete API frame received.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.borrow().frames.clone()
    }

    /// Bytes received in transparent mode.
    pub fn transparent_data(&self) -> Vec<u8> {
        self.state.borrow().transparent.clone()
    }

    /// Value of a register set through `AT<XX> <value>`.
    pub fn register(&self, mnemonic: &str) -> Option<String> {
        self.state.borrow().registers.get(mnemonic).cloned()
    }

    /// Speeds the line was switched to, in order.
    pub fn baud_history(&self) -> Vec<u32> {
        self.state.borrow().baud_history.clone()
    }

    /// Current line speed.
    pub fn line_baud(&self) -> u32 {
        self.state.borrow().line_baud
    }

    /// Whether the modem is in AT command mode.
    pub fn in_command_mode(&self) -> bool {
        self.state.borrow().command_mode
    }

    /// Whether the modem is in binary API mode.
    pub fn in_api_mode(&self) -> bool {
        self.state.borrow().api_mode
    }

    /// Number of inbound bytes not yet read.
    pub fn unread(&self) -> usize {
        self.state.borrow().rx.len()
    }
}

impl Transport for SimulatedModem {
    fn reconfigure(&mut self, baud: u32) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.line_baud = baud;
        state.baud_history.push(baud);
        state.pending.clear();
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.pending.extend_from_slice(bytes);
        state.process();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_timeout(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> bool {
        !self.state.borrow().rx.is_empty()
    }
}
