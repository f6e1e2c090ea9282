use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use protoscope::cli::ProtocolHint;
use protoscope::network::Target;
use protoscope::telnet::SessionState;
use protoscope::{Confidence, ProbeFailure, Protocol, ProtocolDetector};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Short windows keep the test suite quick without changing behaviour.
fn fast_detector() -> ProtocolDetector {
    ProtocolDetector::with_timeouts(ms(500), ms(200), ms(200))
}

/// Serve a fixed banner to every connection, then hold the socket open.
async fn banner_server(banner: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = sock.write_all(banner).await;
                let mut buf = [0u8; 256];
                while matches!(sock.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    });
    addr
}

/// Accept and stay completely silent until the client hangs up.
async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                while matches!(sock.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    });
    addr
}

/// Speak only when spoken to, like a web server.
async fn http_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 512];
                loop {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            request.extend_from_slice(&buf[..n]);
                            if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = sock
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                    .await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_ssh_banner_detected() {
    let addr = banner_server(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Auto, ms(3000))
        .await;

    assert_eq!(result.protocol, Protocol::Ssh);
    assert_eq!(result.confidence, Confidence::High);
    assert!(result.evidence.starts_with(b"SSH-2.0-OpenSSH_9.6"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_ftp_banner_detected() {
    let addr = banner_server(b"220 ftp.example FTP ready\r\n").await;
    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Auto, ms(3000))
        .await;

    assert_eq!(result.protocol, Protocol::Ftp);
    assert_eq!(result.confidence, Confidence::High);
}

#[tokio::test]
async fn test_telnet_negotiation_detected() {
    // IAC DO ECHO, IAC WILL SGA: a typical telnet opening.
    let addr = banner_server(&[255, 253, 1, 255, 251, 3]).await;
    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Auto, ms(3000))
        .await;

    assert_eq!(result.protocol, Protocol::Telnet);
    assert_eq!(result.confidence, Confidence::High);
    assert_eq!(result.evidence, vec![255, 253, 1, 255, 251, 3]);
}

#[tokio::test]
async fn test_http_detected_via_active_probe() {
    let addr = http_server().await;
    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Auto, ms(5000))
        .await;

    assert_eq!(result.protocol, Protocol::Http);
    assert_eq!(result.confidence, Confidence::High);
    assert!(result.evidence.starts_with(b"HTTP/1.1 200 OK"));
}

#[tokio::test]
async fn test_hint_tunes_probe_but_verdict_is_observational() {
    // An HTTP hint against an SSH server still reports SSH.
    let addr = banner_server(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Http, ms(3000))
        .await;

    assert_eq!(result.protocol, Protocol::Ssh);
    assert_eq!(result.confidence, Confidence::High);
}

#[tokio::test]
async fn test_silent_endpoint_is_clean_unknown() {
    let addr = silent_server().await;
    let budget = ms(3000);
    let started = Instant::now();
    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Auto, budget)
        .await;

    assert_eq!(result.protocol, Protocol::Unknown);
    assert_eq!(result.confidence, Confidence::None);
    assert!(result.error.is_none(), "clean silence is not an error");
    assert!(started.elapsed() < budget + ms(300));
}

#[tokio::test]
async fn test_detect_never_blocks_past_budget() {
    let addr = silent_server().await;
    // Probe windows far larger than the budget force the outer cut-off.
    let detector = ProtocolDetector::with_timeouts(ms(5000), ms(5000), ms(5000));
    let budget = ms(300);
    let started = Instant::now();
    let result = detector
        .detect("127.0.0.1", addr.port(), ProtocolHint::Auto, budget)
        .await;

    assert!(started.elapsed() < budget + ms(300));
    assert_eq!(result.protocol, Protocol::Unknown);
    assert_eq!(result.error, Some(ProbeFailure::Timeout));
}

#[tokio::test]
async fn test_refused_connection_is_reported() {
    // Bind then drop to find a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = fast_detector()
        .detect("127.0.0.1", addr.port(), ProtocolHint::Ssh, ms(2000))
        .await;

    assert_eq!(result.protocol, Protocol::Unknown);
    assert_eq!(result.error, Some(ProbeFailure::ConnectRefused));
}

#[tokio::test]
async fn test_batch_respects_concurrency_limit() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    {
        let current = current.clone();
        let peak = peak.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let current = current.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let mut buf = [0u8; 64];
                    while matches!(sock.read(&mut buf).await, Ok(n) if n > 0) {}
                    current.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }

    let targets: Vec<Target> = (0..24)
        .map(|_| Target {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        })
        .collect();

    // A passive-only hint keeps it to exactly one connection per target.
    let report = fast_detector()
        .detect_all(&targets, ProtocolHint::Ssh, 6, ms(2000), None)
        .await;

    assert_eq!(report.results.len(), 24);
    assert_eq!(report.total_targets, 24);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 6, "peak concurrency {peak} exceeded the limit of 6");
}

#[tokio::test]
async fn test_batch_survives_individual_failures() {
    let live = banner_server(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let targets = vec![
        Target {
            host: "127.0.0.1".to_string(),
            port: live.port(),
        },
        Target {
            host: "127.0.0.1".to_string(),
            port: dead_addr.port(),
        },
    ];

    let report = fast_detector()
        .detect_all(&targets, ProtocolHint::Auto, 4, ms(3000), None)
        .await;

    assert_eq!(report.results.len(), 2);
    let detected = report
        .results
        .iter()
        .filter(|r| r.protocol == Protocol::Ssh)
        .count();
    let failed = report.results.iter().filter(|r| r.error.is_some()).count();
    assert_eq!(detected, 1);
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn test_get_client_for_unknown_is_invalid_state() {
    use protoscope::ClientError;
    use protoscope::DetectionResult;

    let detector = fast_detector();
    let result = DetectionResult::failed("127.0.0.1", 9999, ProbeFailure::ConnectRefused);
    let client = detector.get_client(&result, "127.0.0.1", 9999).await;
    assert!(matches!(client, Err(ClientError::InvalidState(_))));
}

#[tokio::test]
async fn test_get_client_for_telnet_returns_unstarted_session() {
    use protoscope::DetectionResult;

    let detector = fast_detector();
    let result = DetectionResult::detected(
        "127.0.0.1",
        2323,
        Protocol::Telnet,
        Confidence::High,
        vec![255, 253, 1],
    );
    let mut handle = detector
        .get_client(&result, "127.0.0.1", 2323)
        .await
        .unwrap();

    assert_eq!(handle.protocol(), Protocol::Telnet);
    let session = handle.as_telnet_mut().unwrap();
    assert_eq!(session.state(), SessionState::Connecting);
}
