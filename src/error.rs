//! Error taxonomy for the detection engine and the telnet client.
//!
//! Connection-layer failures observed while detecting are captured into the
//! [`DetectionResult`](crate::detector::results::DetectionResult) rather than
//! propagated, so a batch keeps moving host by host. Telnet session errors
//! after handoff surface directly from `start`/`run` because at that point
//! the caller owns the session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::results::Protocol;

/// Connection-layer failures reported by the prober.
///
/// `ConnectRefused` and `ConnectTimeout` are distinguished from "connected
/// but silent": a silent endpoint is a valid (if ambiguous) signature input,
/// a refused or unreachable one is not.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailure {
    #[error("connection refused")]
    ConnectRefused,

    #[error("connect timed out")]
    ConnectTimeout,

    /// The overall detection budget ran out mid-strategy.
    #[error("detection timed out")]
    Timeout,

    /// The connection was reset or closed after connecting.
    #[error("read failed: {0}")]
    Read(String),
}

/// Failures from the telnet session engine.
#[derive(Error, Debug)]
pub enum TelnetError {
    #[error("connect timed out")]
    ConnectTimeout,

    /// Negotiation did not settle inside the negotiation window. Non-fatal:
    /// the session degrades to best-effort defaults.
    #[error("negotiation timed out")]
    NegotiationTimeout,

    /// A command did not produce the expected prompt in time. Carries
    /// whatever output was captured before the cut-off.
    #[error("command timed out with {} bytes of partial output", .partial.len())]
    CommandTimeout { partial: Vec<u8> },

    #[error("invalid prompt pattern: {0}")]
    InvalidPrompt(#[from] regex::Error),

    #[error("session is not ready")]
    NotReady,

    #[error("session closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures constructing or closing a protocol client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The caller asked for a client for a detection that has none.
    #[error("no client available for a {0} detection")]
    InvalidState(Protocol),

    #[error("client connect timed out")]
    ConnectTimeout,

    #[error("ssh connection failed: {0}")]
    Ssh(#[from] russh::Error),

    #[error("http client failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telnet session failed: {0}")]
    Telnet(#[from] TelnetError),
}
