use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProbeFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Ssh,
    Http,
    Https,
    Telnet,
    Ftp,
    Unknown,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Ssh => write!(f, "SSH"),
            Protocol::Http => write!(f, "HTTP"),
            Protocol::Https => write!(f, "HTTPS"),
            Protocol::Telnet => write!(f, "TELNET"),
            Protocol::Ftp => write!(f, "FTP"),
            Protocol::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Strength of a verdict: `High` for an exact byte signature, `Medium` for a
/// port-number heuristic only, `None` for no match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    None,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::High => write!(f, "HIGH"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::None => write!(f, "NONE"),
        }
    }
}

/// Outcome of one detection attempt. Immutable once produced; `error` is set
/// only when the endpoint could not be probed at all, never for a clean
/// "connected but no match".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub confidence: Confidence,
    #[serde(with = "evidence_text")]
    pub evidence: Vec<u8>,
    pub error: Option<ProbeFailure>,
    pub elapsed_ms: u64,
}

impl DetectionResult {
    pub fn detected(
        host: &str,
        port: u16,
        protocol: Protocol,
        confidence: Confidence,
        evidence: Vec<u8>,
    ) -> Self {
        debug_assert!(!(confidence == Confidence::High && protocol == Protocol::Unknown));
        Self {
            host: host.to_string(),
            port,
            protocol,
            confidence,
            evidence,
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn failed(host: &str, port: u16, failure: ProbeFailure) -> Self {
        Self {
            host: host.to_string(),
            port,
            protocol: Protocol::Unknown,
            confidence: Confidence::None,
            evidence: Vec::new(),
            error: Some(failure),
            elapsed_ms: 0,
        }
    }
}

/// Batch container for a set of detection attempts. Results carry no
/// ordering relative to each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub total_targets: usize,
    pub results: Vec<DetectionResult>,
}

/// Banners are almost always text; serialise evidence as a lossy string so
/// reports stay readable.
mod evidence_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}
