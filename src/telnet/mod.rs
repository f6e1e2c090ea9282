//! Telnet client engine.
//!
//! No mature external telnet implementation exists to delegate to, so the
//! session engine here is built from raw byte negotiation: RFC 854 option
//! negotiation, IAC byte-stuffing, and prompt-driven command framing.

pub mod negotiate;
pub mod parser;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

use crate::error::TelnetError;
pub use negotiate::{LocalState, NegotiationOption, Negotiator, RemoteState};
pub use parser::{TelnetEvent, TelnetParser};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Negotiating,
    Ready,
    /// Terminal: a session never leaves this state.
    Closed,
}

/// One telnet connection: negotiation state, a read buffer awaiting pattern
/// matches, and the underlying socket. The socket is released on every exit
/// path, including errors, because it lives inside the session.
#[derive(Debug)]
pub struct TelnetSession {
    host: String,
    port: u16,
    connect_timeout: Duration,
    negotiation_timeout: Duration,
    quiet_period: Duration,
    state: SessionState,
    stream: Option<TcpStream>,
    parser: TelnetParser,
    negotiator: Negotiator,
    buffer: Vec<u8>,
}

enum PumpOutcome {
    /// Plain data bytes were appended to the buffer.
    Data,
    /// Only negotiation traffic arrived.
    NegotiationOnly,
    /// The read window elapsed without any bytes.
    Quiet,
}

impl TelnetSession {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            quiet_period: DEFAULT_QUIET_PERIOD,
            state: SessionState::Connecting,
            stream: None,
            parser: TelnetParser::new(),
            negotiator: Negotiator::new(),
            buffer: Vec::new(),
        }
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Tune how long negotiation may run overall and how much silence ends
    /// it early. Defaults are conventional, not contractual.
    pub fn negotiation_window(mut self, total: Duration, quiet_period: Duration) -> Self {
        self.negotiation_timeout = total;
        self.quiet_period = quiet_period;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn option_state(&self, code: u8) -> Option<NegotiationOption> {
        self.negotiator.option_state(code)
    }

    /// Connect and negotiate. Negotiation failure is not fatal: if the
    /// window elapses while the server is still talking options, the session
    /// degrades to defaults and comes up READY anyway.
    pub async fn start(&mut self) -> Result<(), TelnetError> {
        match self.state {
            SessionState::Closed => return Err(TelnetError::Closed),
            SessionState::Ready => return Ok(()),
            _ => {}
        }

        tracing::debug!(host = %self.host, port = self.port, "connecting with telnet");
        let stream = match timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(TelnetError::Io(e)),
            Err(_) => return Err(TelnetError::ConnectTimeout),
        };
        self.stream = Some(stream);
        self.state = SessionState::Negotiating;

        let opening = self.negotiator.initial_negotiation();
        if let Err(e) = self.write_raw(&opening).await {
            self.close().await;
            return Err(e);
        }

        match self.negotiate().await {
            Ok(()) => {}
            Err(TelnetError::NegotiationTimeout) => {
                tracing::debug!(
                    host = %self.host,
                    port = self.port,
                    "negotiation window elapsed, continuing with defaults"
                );
            }
            Err(e) => {
                self.close().await;
                return Err(e);
            }
        }

        self.state = SessionState::Ready;
        tracing::debug!(host = %self.host, port = self.port, "telnet session ready");
        Ok(())
    }

    /// Send `command` and collect output until `prompt_pattern` (a regex,
    /// matched against the raw tail of the buffer) appears or `time_limit`
    /// elapses. The echoed command prefix and the matched prompt are
    /// stripped from the returned bytes. A timeout is an error carrying the
    /// partial output, never a silent truncated success.
    pub async fn run(
        &mut self,
        command: &str,
        prompt_pattern: &str,
        time_limit: Duration,
    ) -> Result<Vec<u8>, TelnetError> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Closed => return Err(TelnetError::Closed),
            _ => return Err(TelnetError::NotReady),
        }
        let pattern = regex::bytes::Regex::new(prompt_pattern)?;

        let mut line = Vec::with_capacity(command.len() + 2);
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(b"\r\n");
        if let Err(e) = self.write_data(&line).await {
            self.close().await;
            return Err(e);
        }

        let deadline = Instant::now() + time_limit;
        loop {
            if let Some((start, end)) = tail_match(&pattern, &self.buffer) {
                let body = self.buffer[..start].to_vec();
                self.buffer.drain(..end);
                return Ok(strip_echo(&body, command.as_bytes()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TelnetError::CommandTimeout {
                    partial: std::mem::take(&mut self.buffer),
                });
            }

            match self.pump(deadline - now).await {
                Ok(PumpOutcome::Quiet) => {
                    return Err(TelnetError::CommandTimeout {
                        partial: std::mem::take(&mut self.buffer),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    self.close().await;
                    return Err(e);
                }
            }
        }
    }

    /// Write application data, IAC-escaped for the wire.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<(), TelnetError> {
        let escaped = TelnetParser::escape(data);
        self.write_raw(&escaped).await
    }

    /// Close the session. Idempotent: closing a closed session is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            tracing::debug!(host = %self.host, port = self.port, "telnet session closed");
        }
        self.negotiator.reset();
        self.buffer.clear();
        self.state = SessionState::Closed;
    }

    /// Run negotiation until the stream goes quiet or the window closes.
    async fn negotiate(&mut self) -> Result<(), TelnetError> {
        let deadline = Instant::now() + self.negotiation_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(TelnetError::NegotiationTimeout);
            }
            let window = self.quiet_period.min(deadline - now);
            match self.pump(window).await? {
                // Silence, or the server moving on to plain data, both mean
                // negotiation has settled.
                PumpOutcome::Quiet | PumpOutcome::Data => return Ok(()),
                PumpOutcome::NegotiationOnly => {}
            }
        }
    }

    /// One bounded read: strip negotiation traffic, answer it, and append
    /// plain data to the buffer. Fatal I/O closes the session.
    async fn pump(&mut self, window: Duration) -> Result<PumpOutcome, TelnetError> {
        let mut chunk = [0u8; 1024];
        let read_result = {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Err(TelnetError::NotReady),
            };
            timeout(window, stream.read(&mut chunk)).await
        };

        match read_result {
            Err(_) => Ok(PumpOutcome::Quiet),
            Ok(Err(e)) => {
                self.state = SessionState::Closed;
                self.stream = None;
                Err(TelnetError::Io(e))
            }
            Ok(Ok(0)) => {
                self.state = SessionState::Closed;
                self.stream = None;
                Err(TelnetError::Closed)
            }
            Ok(Ok(n)) => {
                let (data, events) = self.parser.feed(&chunk[..n]);
                let mut responses = Vec::new();
                for event in &events {
                    responses.extend(self.negotiator.respond(event));
                }
                if !responses.is_empty() {
                    self.write_raw(&responses).await?;
                }
                if data.is_empty() {
                    Ok(PumpOutcome::NegotiationOnly)
                } else {
                    self.buffer.extend_from_slice(&data);
                    Ok(PumpOutcome::Data)
                }
            }
        }
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TelnetError> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(TelnetError::NotReady),
        };
        stream.write_all(bytes).await?;
        Ok(())
    }
}

/// Find the last pattern match, accepted only when it reaches the end of
/// the buffer: prompts announce readiness, so they sit at the tail.
fn tail_match(pattern: &regex::bytes::Regex, buffer: &[u8]) -> Option<(usize, usize)> {
    pattern
        .find_iter(buffer)
        .last()
        .filter(|m| m.end() == buffer.len())
        .map(|m| (m.start(), m.end()))
}

/// Remove the echoed command (plus its line terminator) from the front of a
/// captured response.
fn strip_echo(body: &[u8], command: &[u8]) -> Vec<u8> {
    let mut rest = body;
    if rest.starts_with(command) {
        rest = &rest[command.len()..];
        for terminator in [b"\r\n".as_slice(), b"\n".as_slice(), b"\r".as_slice()] {
            if rest.starts_with(terminator) {
                rest = &rest[terminator.len()..];
                break;
            }
        }
    }
    rest.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_echo_removes_command_and_terminator() {
        let body = b"show version\r\nVersion 1.0\r\n";
        assert_eq!(strip_echo(body, b"show version"), b"Version 1.0\r\n");
    }

    #[test]
    fn test_strip_echo_without_echo_is_identity() {
        let body = b"Version 1.0\r\n";
        assert_eq!(strip_echo(body, b"show version"), b"Version 1.0\r\n");
    }

    #[test]
    fn test_tail_match_requires_tail() {
        let pattern = regex::bytes::Regex::new("> ").unwrap();
        assert_eq!(tail_match(&pattern, b"output> "), Some((6, 8)));
        assert_eq!(tail_match(&pattern, b"output> more"), None);
        assert_eq!(tail_match(&pattern, b"no prompt"), None);
    }

    #[test]
    fn test_new_session_is_connecting() {
        let session = TelnetSession::new("gw.example", 23);
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.host(), "gw.example");
        assert_eq!(session.port(), 23);
    }
}
