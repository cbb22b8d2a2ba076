//! Transport abstraction over the channel to the RIB manager.
//!
//! The trait is byte-level on purpose: message framing, the inbound
//! assembly buffer and the pending-write queue all live in the session,
//! so a transport only moves raw bytes and reports readiness. This keeps
//! the session testable against a scripted mock at wire granularity.

pub mod mock;
pub mod unix;

use std::io;

use bytes::Bytes;
use tokio::io::{Interest, Ready};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Establishing the connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(#[source] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Operation attempted without an established connection.
    #[error("not connected")]
    NotConnected,

    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Io(e),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Trait for zserv transport implementations.
///
/// Abstracts the socket so the session can be unit tested with a mock.
/// `try_recv`/`try_send` never block: they return `Ok(None)` / `Ok(0)`
/// when the socket is not ready, and `ready` is the suspension point.
#[allow(async_fn_in_trait)]
pub trait Transport: Send {
    /// Establish the connection to the manager.
    async fn connect(&mut self) -> TransportResult<()>;

    /// Wait until the socket is ready for the given interest.
    async fn ready(&mut self, interest: Interest) -> TransportResult<Ready>;

    /// Attempt a non-blocking read. `Ok(None)` means no data available.
    fn try_recv(&mut self) -> TransportResult<Option<Bytes>>;

    /// Attempt a non-blocking write, which may be short. `Ok(0)` means
    /// the socket is backed up; wait for write readiness.
    fn try_send(&mut self, buf: &[u8]) -> TransportResult<usize>;

    /// Close the connection. Safe to call when already closed.
    async fn close(&mut self);

    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Closed.to_string(),
            "connection closed by peer"
        );
        assert_eq!(TransportError::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn test_transport_error_from_io_kind() {
        let err: TransportError =
            io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, TransportError::Closed));

        let err: TransportError =
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, TransportError::Closed));

        let err: TransportError =
            io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
