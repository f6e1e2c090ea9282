//! Connection prober: raw TCP I/O with no protocol knowledge.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ProbeFailure;

/// Banners rarely exceed a few hundred bytes; 1 KiB is plenty for a verdict.
const READ_BUFFER_SIZE: usize = 1024;

/// Connect to `host:port`, optionally write `payload`, and return whatever
/// bytes arrive before `read_timeout` elapses.
///
/// A read timeout with zero bytes is not an error: it is a valid (if
/// ambiguous) signature input. An endpoint that closes without sending
/// anything is a `Read` failure, because the connection did not stay open.
/// No retries here; retry policy belongs to the caller.
pub async fn probe(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    payload: &[u8],
) -> Result<Vec<u8>, ProbeFailure> {
    let mut stream = match timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            return Err(ProbeFailure::ConnectRefused);
        }
        // Unreachable networks and the like behave as firewalled.
        Ok(Err(_)) | Err(_) => return Err(ProbeFailure::ConnectTimeout),
    };

    if !payload.is_empty() {
        stream
            .write_all(payload)
            .await
            .map_err(|e| ProbeFailure::Read(e.to_string()))?;
    }

    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    match timeout(read_timeout, stream.read(&mut buffer)).await {
        Ok(Ok(0)) => Err(ProbeFailure::Read("connection closed before any data".to_string())),
        Ok(Ok(n)) => {
            buffer.truncate(n);
            tracing::debug!(host, port, bytes = n, "probe read banner");
            Ok(buffer)
        }
        Ok(Err(e)) => Err(ProbeFailure::Read(e.to_string())),
        Err(_) => Ok(Vec::new()),
    }
}
