//! Unix-domain socket transport.
//!
//! The zserv channel is a trusted local socket; the path is supplied by
//! the caller (socket location is a deployment concern, not a protocol
//! one).

use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, Interest, Ready};
use tokio::net::UnixStream;
use tracing::debug;

use super::{Transport, TransportError, TransportResult};
use crate::zserv::message::MAX_PACKET_SIZE;

/// Transport over a Unix-domain stream socket.
#[derive(Debug)]
pub struct UnixTransport {
    path: PathBuf,
    /// The connected stream (None while disconnected).
    stream: Option<UnixStream>,
}

impl UnixTransport {
    /// Create a transport that connects to the manager socket at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: None,
        }
    }
}

impl Transport for UnixTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        if self.stream.is_some() {
            self.close().await;
        }

        debug!(path = %self.path.display(), "connecting to RIB manager socket");
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(TransportError::ConnectFailed)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn ready(&mut self, interest: Interest) -> TransportResult<Ready> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
        stream.ready(interest).await.map_err(TransportError::from)
    }

    fn try_recv(&mut self) -> TransportResult<Option<Bytes>> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;

        let mut buf = [0u8; MAX_PACKET_SIZE];
        match stream.try_read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(Some(Bytes::copy_from_slice(&buf[..n]))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TransportError::from(e)),
        }
    }

    fn try_send(&mut self, buf: &[u8]) -> TransportResult<usize> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;

        match stream.try_write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::from(e)),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!(path = %self.path.display(), "closing RIB manager socket");
            let _ = stream.shutdown().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
