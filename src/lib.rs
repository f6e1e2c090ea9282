//! Active protocol detection for TCP endpoints.
//!
//! protoscope probes a `host:port` pair, classifies whatever bytes come back
//! against exact protocol signatures (SSH, FTP, Telnet negotiation, HTTP),
//! and falls back to a port-number heuristic only when the endpoint stays
//! silent. A confirmed detection can then be handed off to a matching
//! client: SSH and HTTP(S) go to external libraries, Telnet is served by the
//! built-in [`TelnetSession`] engine since no mature external implementation
//! exists to delegate to.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use protoscope::cli::ProtocolHint;
//! use protoscope::{Protocol, ProtocolDetector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let detector = ProtocolDetector::new();
//!     let result = detector
//!         .detect("192.0.2.10", 22, ProtocolHint::Auto, Duration::from_secs(10))
//!         .await;
//!     if result.protocol == Protocol::Ssh {
//!         println!("ssh endpoint: {}:{}", result.host, result.port);
//!     }
//! }
//! ```

pub mod cli;
pub mod client;
pub mod detector;
pub mod error;
pub mod network;
pub mod output;
pub mod telnet;

pub use client::ClientHandle;
pub use detector::results::{Confidence, DetectionReport, DetectionResult, Protocol};
pub use detector::ProtocolDetector;
pub use error::{ClientError, ProbeFailure, TelnetError};
pub use telnet::TelnetSession;
