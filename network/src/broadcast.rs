//! One-message-per-connection transport.
//!
//! A send dials the peer, writes the encoded envelope, shuts down the write
//! half, and drops the stream. Every step runs under its own timeout so one
//! stalled peer cannot hold up a broadcast.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::NetworkError;

/// Outcome of a broadcast attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Peers the message was delivered to.
    pub sent: usize,
    /// Peers that could not be reached or timed out.
    pub failed: usize,
}

impl BroadcastResult {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.sent + self.failed
    }
}

/// Dial `peer` with a connect timeout.
pub async fn dial(peer: &str, timeout: Duration) -> Result<TcpStream, NetworkError> {
    match tokio::time::timeout(timeout, TcpStream::connect(peer)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(NetworkError::ConnectionFailed {
            peer: peer.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(NetworkError::Timeout {
            op: "connect",
            peer: peer.to_string(),
        }),
    }
}

/// Write one message and close our half of the stream.
pub async fn write_message(
    stream: &mut TcpStream,
    peer: &str,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), NetworkError> {
    let write = async {
        stream.write_all(bytes).await?;
        stream.shutdown().await
    };
    match tokio::time::timeout(timeout, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(NetworkError::Timeout {
            op: "write",
            peer: peer.to_string(),
        }),
    }
}

/// Dial, write, close.
pub async fn send_message(
    peer: &str,
    bytes: &[u8],
    connect_timeout: Duration,
    write_timeout: Duration,
) -> Result<(), NetworkError> {
    let mut stream = dial(peer, connect_timeout).await?;
    write_message(&mut stream, peer, bytes, write_timeout).await
}

/// Read one message: everything up to EOF, at most `limit` bytes, within
/// `timeout`.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: R,
    peer: &str,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<u8>, NetworkError> {
    let mut buf = Vec::new();
    let mut limited = reader.take(limit as u64 + 1);
    match tokio::time::timeout(timeout, limited.read_to_end(&mut buf)).await {
        Ok(result) => {
            result?;
        }
        Err(_) => {
            return Err(NetworkError::Timeout {
                op: "read",
                peer: peer.to_string(),
            })
        }
    }
    if buf.len() > limit {
        return Err(NetworkError::MessageTooLarge { limit });
    }
    Ok(buf)
}
