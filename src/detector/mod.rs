//! Protocol detection orchestration.
//!
//! Drives the prober and the signature matcher through an ordered strategy
//! under one timeout budget, and hands confirmed detections off to a
//! protocol-appropriate client.

pub mod probe;
pub mod results;
pub mod signature;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::cli::ProtocolHint;
use crate::client::{self, ClientHandle, HttpClient};
use crate::error::{ClientError, ProbeFailure};
use crate::network::Target;
use crate::telnet::TelnetSession;
use results::{Confidence, DetectionReport, DetectionResult, Protocol};
use signature::{classify, ProbeKind, Verdict};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Detects which protocol answers on a TCP endpoint.
///
/// Holds only read-only timing configuration, so one detector can drive any
/// number of concurrent detections.
#[derive(Debug, Clone)]
pub struct ProtocolDetector {
    connect_timeout: Duration,
    banner_timeout: Duration,
    probe_timeout: Duration,
}

impl Default for ProtocolDetector {
    fn default() -> Self {
        Self::with_timeouts(
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_BANNER_TIMEOUT,
            DEFAULT_PROBE_TIMEOUT,
        )
    }
}

impl ProtocolDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connect_timeout` bounds each TCP connect, `banner_timeout` the
    /// passive banner wait, `probe_timeout` each active probe read.
    pub fn with_timeouts(
        connect_timeout: Duration,
        banner_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            connect_timeout,
            banner_timeout,
            probe_timeout,
        }
    }

    /// Detect the protocol on `host:port`, never blocking past `budget`.
    ///
    /// A specific `hint` selects the probe strategy but does not force the
    /// verdict: probing an SSH server with an HTTP hint still reports SSH.
    pub async fn detect(
        &self,
        host: &str,
        port: u16,
        hint: ProtocolHint,
        budget: Duration,
    ) -> DetectionResult {
        let started = Instant::now();
        let mut result = match timeout(budget, self.run_strategy(host, port, hint, budget)).await {
            Ok(result) => result,
            Err(_) => DetectionResult::failed(host, port, ProbeFailure::Timeout),
        };
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            host,
            port,
            protocol = %result.protocol,
            confidence = %result.confidence,
            elapsed_ms = result.elapsed_ms,
            "detection finished"
        );
        result
    }

    async fn run_strategy(
        &self,
        host: &str,
        port: u16,
        hint: ProtocolHint,
        budget: Duration,
    ) -> DetectionResult {
        match hint {
            ProtocolHint::Auto => self.detect_auto(host, port, budget).await,
            // Passive-signature protocols announce themselves unprompted.
            ProtocolHint::Ssh | ProtocolHint::Telnet | ProtocolHint::Ftp => {
                self.passive_probe(host, port, self.banner_timeout).await
            }
            ProtocolHint::Http => self.http_probe(host, port).await,
            ProtocolHint::Https => match self.tls_probe(host, port).await {
                Ok(evidence) => to_result(host, port, classify(&evidence, port, ProbeKind::ActiveTls)),
                Err(ProbeFailure::ConnectTimeout) => {
                    DetectionResult::failed(host, port, ProbeFailure::ConnectTimeout)
                }
                Err(ProbeFailure::ConnectRefused) => {
                    DetectionResult::failed(host, port, ProbeFailure::ConnectRefused)
                }
                // Connected but the TLS handshake went nowhere: a clean no-match.
                Err(_) => to_result(host, port, classify(&[], port, ProbeKind::ActiveTls)),
            },
        }
    }

    /// Auto strategy: one passive listen first. If the verdict is not an
    /// exact signature and budget remains, one active phase follows (TLS
    /// check, then an HTTP-style probe). A port-heuristic verdict from the
    /// passive phase is kept as fallback and only replaced by something
    /// stronger.
    async fn detect_auto(&self, host: &str, port: u16, budget: Duration) -> DetectionResult {
        let started = Instant::now();

        let fallback = match probe::probe(host, port, self.connect_timeout, self.banner_timeout, &[])
            .await
        {
            Ok(bytes) => {
                let verdict = classify(&bytes, port, ProbeKind::Passive);
                if verdict.confidence == Confidence::High {
                    return to_result(host, port, verdict);
                }
                to_result(host, port, verdict)
            }
            Err(failure) => return DetectionResult::failed(host, port, failure),
        };

        if budget_exhausted(started, budget) {
            return budget_verdict(fallback, host, port);
        }

        if let Ok(evidence) = self.tls_probe(host, port).await {
            let verdict = classify(&evidence, port, ProbeKind::ActiveTls);
            if verdict.confidence == Confidence::High {
                return to_result(host, port, verdict);
            }
        }

        if budget_exhausted(started, budget) {
            return budget_verdict(fallback, host, port);
        }

        match self.http_probe(host, port).await {
            result if result.confidence == Confidence::High => result,
            result if fallback.confidence == Confidence::Medium => {
                // Keep the earlier port guess over an empty active outcome.
                if result.confidence == Confidence::Medium {
                    result
                } else {
                    fallback
                }
            }
            result => result,
        }
    }

    async fn passive_probe(&self, host: &str, port: u16, read_timeout: Duration) -> DetectionResult {
        match probe::probe(host, port, self.connect_timeout, read_timeout, &[]).await {
            Ok(bytes) => to_result(host, port, classify(&bytes, port, ProbeKind::Passive)),
            Err(failure) => DetectionResult::failed(host, port, failure),
        }
    }

    async fn http_probe(&self, host: &str, port: u16) -> DetectionResult {
        let payload = http_probe_payload(host);
        match probe::probe(host, port, self.connect_timeout, self.probe_timeout, &payload).await {
            Ok(bytes) => to_result(host, port, classify(&bytes, port, ProbeKind::ActiveHttp)),
            Err(failure) => DetectionResult::failed(host, port, failure),
        }
    }

    /// Ask the endpoint to complete a TLS handshake by issuing a HEAD request
    /// over HTTPS. Certificate validity is irrelevant for detection.
    async fn tls_probe(&self, host: &str, port: u16) -> Result<Vec<u8>, ProbeFailure> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .connect_timeout(self.connect_timeout)
            .timeout(self.probe_timeout)
            .build()
            .map_err(|e| ProbeFailure::Read(e.to_string()))?;

        match client.head(format!("https://{host}:{port}/")).send().await {
            Ok(response) => {
                Ok(format!("{:?} {}", response.version(), response.status()).into_bytes())
            }
            Err(e) => Err(reqwest_failure(&e)),
        }
    }

    /// Build the client matching a confirmed detection. SSH and HTTP(S) are
    /// delegated to external libraries; Telnet gets a fresh, not-yet-started
    /// session from the built-in engine.
    pub async fn get_client(
        &self,
        result: &DetectionResult,
        host: &str,
        port: u16,
    ) -> Result<ClientHandle, ClientError> {
        match result.protocol {
            Protocol::Ssh => Ok(ClientHandle::Ssh(
                client::connect_ssh(host, port, self.connect_timeout).await?,
            )),
            Protocol::Http => Ok(ClientHandle::Http(HttpClient::new(host, port, false)?)),
            Protocol::Https => Ok(ClientHandle::Https(HttpClient::new(host, port, true)?)),
            Protocol::Telnet => Ok(ClientHandle::Telnet(TelnetSession::new(host, port))),
            Protocol::Ftp | Protocol::Unknown => Err(ClientError::InvalidState(result.protocol)),
        }
    }

    /// Run detection across a batch of targets with at most `concurrency`
    /// connections open at once. One target's failure never aborts the rest,
    /// and results carry no ordering guarantee.
    pub async fn detect_all(
        &self,
        targets: &[Target],
        hint: ProtocolHint,
        concurrency: usize,
        per_host_timeout: Duration,
        progress: Option<ProgressBar>,
    ) -> DetectionReport {
        let started = chrono::Utc::now();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = Vec::with_capacity(targets.len());

        for target in targets {
            let semaphore = semaphore.clone();
            let detector = self.clone();
            let target = target.clone();
            let progress = progress.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                let result = detector
                    .detect(&target.host, target.port, hint, per_host_timeout)
                    .await;
                if let Some(progress) = progress {
                    progress.inc(1);
                }
                result
            }));
        }

        let results: Vec<DetectionResult> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();

        DetectionReport {
            started,
            finished: chrono::Utc::now(),
            total_targets: targets.len(),
            results,
        }
    }
}

fn to_result(host: &str, port: u16, verdict: Verdict) -> DetectionResult {
    DetectionResult::detected(host, port, verdict.protocol, verdict.confidence, verdict.evidence)
}

fn budget_exhausted(started: Instant, budget: Duration) -> bool {
    started.elapsed() >= budget
}

/// Out of budget mid-strategy: keep a port-heuristic verdict if the passive
/// phase produced one, otherwise report the exhaustion.
fn budget_verdict(fallback: DetectionResult, host: &str, port: u16) -> DetectionResult {
    if fallback.confidence == Confidence::Medium {
        fallback
    } else {
        DetectionResult::failed(host, port, ProbeFailure::Timeout)
    }
}

fn http_probe_payload(host: &str) -> Vec<u8> {
    format!("HEAD / HTTP/1.1\r\nHost: {host}\r\n\r\n").into_bytes()
}

fn reqwest_failure(error: &reqwest::Error) -> ProbeFailure {
    if error.is_timeout() {
        return ProbeFailure::ConnectTimeout;
    }
    // Dig for the io error to tell refusal apart from a failed handshake.
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if let Some(io_error) = inner.downcast_ref::<std::io::Error>() {
            if io_error.kind() == std::io::ErrorKind::ConnectionRefused {
                return ProbeFailure::ConnectRefused;
            }
        }
        source = std::error::Error::source(inner);
    }
    ProbeFailure::Read(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_probe_payload_carries_host_header() {
        let payload = http_probe_payload("gw.example");
        let text = String::from_utf8(payload).unwrap();
        assert!(text.starts_with("HEAD / HTTP/1.1\r\n"));
        assert!(text.contains("Host: gw.example\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_budget_verdict_prefers_port_guess() {
        let fallback = DetectionResult::detected(
            "gw.example",
            23,
            Protocol::Telnet,
            Confidence::Medium,
            Vec::new(),
        );
        let kept = budget_verdict(fallback, "gw.example", 23);
        assert_eq!(kept.protocol, Protocol::Telnet);

        let none = DetectionResult::detected(
            "gw.example",
            9999,
            Protocol::Unknown,
            Confidence::None,
            Vec::new(),
        );
        let timed_out = budget_verdict(none, "gw.example", 9999);
        assert_eq!(timed_out.error, Some(ProbeFailure::Timeout));
    }
}
