//! Option negotiation policy.
//!
//! Supported options are accepted exactly once; unsupported options are
//! always refused; requests for an option already in the requested state are
//! not re-answered, which keeps rogue servers from driving negotiation
//! loops. The option map lives exactly as long as its owning session.

use std::collections::HashMap;

use super::parser::{command, option, sequence, subnegotiation, subopt, TelnetEvent};

/// Whether we perform an option on our side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Will,
    Wont,
    Unknown,
}

/// Whether the remote end performs an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Do,
    Dont,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationOption {
    pub code: u8,
    pub local: LocalState,
    pub remote: RemoteState,
}

const DEFAULT_TERMINAL_TYPE: &str = "VT100";
// Wide and tall to keep devices from paginating output.
const DEFAULT_WINDOW_WIDTH: u16 = 132;
const DEFAULT_WINDOW_HEIGHT: u16 = 100;

#[derive(Debug)]
pub struct Negotiator {
    options: HashMap<u8, NegotiationOption>,
    terminal_type: String,
    window_width: u16,
    window_height: u16,
    naws_sent: bool,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Negotiator {
    pub fn new() -> Self {
        Self {
            options: HashMap::new(),
            terminal_type: DEFAULT_TERMINAL_TYPE.to_string(),
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            naws_sent: false,
        }
    }

    /// The opening sequence sent right after connecting: announce SGA both
    /// ways, decline local echo, and offer terminal type and window size.
    pub fn initial_negotiation(&mut self) -> Vec<u8> {
        let mut opening = Vec::new();

        opening.extend(sequence(command::WILL, option::SGA));
        self.entry(option::SGA).local = LocalState::Will;
        opening.extend(sequence(command::DO, option::SGA));
        self.entry(option::SGA).remote = RemoteState::Do;

        opening.extend(sequence(command::WONT, option::ECHO));
        self.entry(option::ECHO).local = LocalState::Wont;

        opening.extend(sequence(command::WILL, option::TERMINAL_TYPE));
        self.entry(option::TERMINAL_TYPE).local = LocalState::Will;

        opening.extend(sequence(command::WILL, option::NAWS));
        self.entry(option::NAWS).local = LocalState::Will;

        opening
    }

    /// Produce the wire response for one parsed event; empty when the event
    /// needs no answer.
    pub fn respond(&mut self, event: &TelnetEvent) -> Vec<u8> {
        match event {
            TelnetEvent::Negotiate { verb, option } => match *verb {
                command::WILL => self.on_will(*option),
                command::WONT => self.on_wont(*option),
                command::DO => self.on_do(*option),
                command::DONT => self.on_dont(*option),
                _ => Vec::new(),
            },
            TelnetEvent::Subnegotiation { option, data } => self.on_subnegotiation(*option, data),
        }
    }

    pub fn option_state(&self, code: u8) -> Option<NegotiationOption> {
        self.options.get(&code).copied()
    }

    /// Drop all negotiated state. Called on session close; option state is
    /// never carried across sessions.
    pub fn reset(&mut self) {
        self.options.clear();
        self.naws_sent = false;
    }

    fn supported(code: u8) -> bool {
        matches!(
            code,
            option::BINARY | option::ECHO | option::SGA | option::TERMINAL_TYPE | option::NAWS
        )
    }

    /// Remote announces it will perform `code`: accept supported options
    /// with DO, refuse the rest with DONT.
    fn on_will(&mut self, code: u8) -> Vec<u8> {
        let desired = if Self::supported(code) {
            RemoteState::Do
        } else {
            RemoteState::Dont
        };
        let entry = self.entry(code);
        if entry.remote == desired {
            return Vec::new();
        }
        entry.remote = desired;
        let verb = if desired == RemoteState::Do {
            command::DO
        } else {
            command::DONT
        };
        sequence(verb, code)
    }

    /// Remote refuses an option: acknowledge once.
    fn on_wont(&mut self, code: u8) -> Vec<u8> {
        let entry = self.entry(code);
        if entry.remote == RemoteState::Dont {
            return Vec::new();
        }
        entry.remote = RemoteState::Dont;
        sequence(command::DONT, code)
    }

    /// Remote asks us to perform `code`: agree with WILL for supported
    /// options, refuse with WONT otherwise. Accepting NAWS also sends the
    /// window size subnegotiation the first time.
    fn on_do(&mut self, code: u8) -> Vec<u8> {
        let desired = if Self::supported(code) {
            LocalState::Will
        } else {
            LocalState::Wont
        };

        let entry = self.entry(code);
        let mut response = Vec::new();
        if entry.local != desired {
            entry.local = desired;
            let verb = if desired == LocalState::Will {
                command::WILL
            } else {
                command::WONT
            };
            response.extend(sequence(verb, code));
        }

        if code == option::NAWS && desired == LocalState::Will && !self.naws_sent {
            self.naws_sent = true;
            response.extend(self.window_size_subnegotiation());
        }

        response
    }

    /// Remote asks us to stop performing an option: acknowledge once.
    fn on_dont(&mut self, code: u8) -> Vec<u8> {
        let entry = self.entry(code);
        if entry.local == LocalState::Wont {
            return Vec::new();
        }
        entry.local = LocalState::Wont;
        sequence(command::WONT, code)
    }

    /// Answer TERMINAL-TYPE SEND; every other subnegotiation is consumed
    /// without error.
    fn on_subnegotiation(&mut self, code: u8, data: &[u8]) -> Vec<u8> {
        match code {
            option::TERMINAL_TYPE if data.first() == Some(&subopt::SEND) => {
                let mut payload = vec![subopt::IS];
                payload.extend_from_slice(self.terminal_type.as_bytes());
                subnegotiation(option::TERMINAL_TYPE, &payload)
            }
            _ => Vec::new(),
        }
    }

    fn window_size_subnegotiation(&self) -> Vec<u8> {
        let data = [
            (self.window_width >> 8) as u8,
            self.window_width as u8,
            (self.window_height >> 8) as u8,
            self.window_height as u8,
        ];
        subnegotiation(option::NAWS, &data)
    }

    fn entry(&mut self, code: u8) -> &mut NegotiationOption {
        self.options.entry(code).or_insert(NegotiationOption {
            code,
            local: LocalState::Unknown,
            remote: RemoteState::Unknown,
        })
    }
}
