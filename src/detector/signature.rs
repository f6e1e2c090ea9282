//! Pure signature classification: raw bytes in, protocol verdict out.
//!
//! The matching order is fixed so ambiguity resolves deterministically:
//! passive signatures (Telnet negotiation, SSH, FTP) are checked before the
//! probe-dependent HTTP check, and exact byte signatures always outrank
//! port-number guesses.

use crate::detector::results::{Confidence, Protocol};
use crate::telnet::parser::command;

/// How the classified bytes were obtained. An `HTTP/` response only counts
/// when we actually asked for it, and it means HTTPS when the probe went
/// over a TLS-wrapped channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Passive,
    ActiveHttp,
    ActiveTls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub protocol: Protocol,
    pub confidence: Confidence,
    pub evidence: Vec<u8>,
}

/// Classify a probe response. Pure and deterministic: no I/O, first match
/// wins in the documented order.
pub fn classify(bytes: &[u8], port: u16, probe: ProbeKind) -> Verdict {
    if is_telnet_negotiation(bytes) {
        return Verdict {
            protocol: Protocol::Telnet,
            confidence: Confidence::High,
            evidence: bytes.to_vec(),
        };
    }

    if bytes.starts_with(b"SSH-") {
        return Verdict {
            protocol: Protocol::Ssh,
            confidence: Confidence::High,
            evidence: bytes.to_vec(),
        };
    }

    if bytes.starts_with(b"220 ") {
        return Verdict {
            protocol: Protocol::Ftp,
            confidence: Confidence::High,
            evidence: bytes.to_vec(),
        };
    }

    if probe != ProbeKind::Passive && bytes.starts_with(b"HTTP/") {
        let protocol = if probe == ProbeKind::ActiveTls {
            Protocol::Https
        } else {
            Protocol::Http
        };
        return Verdict {
            protocol,
            confidence: Confidence::High,
            evidence: bytes.to_vec(),
        };
    }

    // Connected but silent: fall back to what the port number suggests.
    if bytes.is_empty() {
        let guess = port_fallback(port);
        if guess != Protocol::Unknown {
            return Verdict {
                protocol: guess,
                confidence: Confidence::Medium,
                evidence: Vec::new(),
            };
        }
    }

    Verdict {
        protocol: Protocol::Unknown,
        confidence: Confidence::None,
        evidence: bytes.to_vec(),
    }
}

/// IAC followed by any of WILL/WONT/DO/DONT is the telnet fingerprint: no
/// other common protocol opens with 0xFF.
fn is_telnet_negotiation(bytes: &[u8]) -> bool {
    bytes.len() >= 2
        && bytes[0] == command::IAC
        && (command::WILL..=command::DONT).contains(&bytes[1])
}

/// Port-to-protocol heuristic used only for endpoints that accept and stay
/// silent. Defaults, not contracts.
pub fn port_fallback(port: u16) -> Protocol {
    match port {
        21 => Protocol::Ftp,
        22 => Protocol::Ssh,
        23 => Protocol::Telnet,
        80 => Protocol::Http,
        443 => Protocol::Https,
        _ => Protocol::Unknown,
    }
}
