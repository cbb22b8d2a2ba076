//! Mock transport for unit testing the session engine.
//!
//! The transport itself is moved into the session task, so all scripted
//! state lives behind an `Arc` shared with a [`MockHandle`] that tests
//! keep: inbound chunks and errors to inject, captured outbound bytes,
//! connect scripting, and a per-call write capacity to force short
//! writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{Interest, Ready};
use tokio::sync::Notify;

use super::{Transport, TransportError, TransportResult};

#[derive(Debug, Default)]
struct Shared {
    /// Errors returned by upcoming connect() calls, in order. Empty
    /// means connect succeeds.
    connect_errors: Mutex<VecDeque<TransportError>>,
    connects: AtomicUsize,
    /// Chunks and errors handed out by try_recv, in order.
    inbound: Mutex<VecDeque<TransportResult<Bytes>>>,
    /// Errors returned by upcoming try_send calls, in order.
    send_errors: Mutex<VecDeque<TransportError>>,
    /// Everything written, flattened in write order.
    sent: Mutex<Vec<u8>>,
    /// Maximum bytes accepted per try_send call.
    write_capacity: AtomicUsize,
    notify: Notify,
}

/// A mock transport scripted through its paired [`MockHandle`].
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
    connected: bool,
}

/// Test-side handle to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a mock transport and the handle that scripts it.
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Shared {
            write_capacity: AtomicUsize::new(usize::MAX),
            ..Shared::default()
        });
        (
            Self {
                shared: Arc::clone(&shared),
                connected: false,
            },
            MockHandle { shared },
        )
    }
}

impl MockHandle {
    /// Queue a chunk of inbound bytes, waking the session if it is
    /// waiting for readiness.
    pub fn push_inbound(&self, chunk: impl Into<Bytes>) {
        self.shared.inbound.lock().unwrap().push_back(Ok(chunk.into()));
        self.shared.notify.notify_one();
    }

    /// Queue an inbound error.
    pub fn push_inbound_error(&self, error: TransportError) {
        self.shared.inbound.lock().unwrap().push_back(Err(error));
        self.shared.notify.notify_one();
    }

    /// Simulate the peer closing the connection.
    pub fn close_peer(&self) {
        self.push_inbound_error(TransportError::Closed);
    }

    /// Make the next connect() call fail with `error`.
    pub fn fail_next_connect(&self, error: TransportError) {
        self.shared.connect_errors.lock().unwrap().push_back(error);
    }

    /// Make the next try_send call fail with `error`.
    pub fn fail_next_send(&self, error: TransportError) {
        self.shared.send_errors.lock().unwrap().push_back(error);
    }

    /// Number of connect() attempts made so far.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Everything written so far, in write order.
    pub fn sent(&self) -> Vec<u8> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// Drain and return everything written so far.
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut *self.shared.sent.lock().unwrap())
    }

    /// Cap the number of bytes accepted per try_send call. Zero blocks
    /// writes entirely until raised again.
    pub fn set_write_capacity(&self, capacity: usize) {
        self.shared.write_capacity.store(capacity, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self) -> TransportResult<()> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let scripted = self.shared.connect_errors.lock().unwrap().pop_front();
        match scripted {
            Some(error) => Err(error),
            None => {
                self.connected = true;
                Ok(())
            }
        }
    }

    async fn ready(&mut self, interest: Interest) -> TransportResult<Ready> {
        loop {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }

            let mut ready = Ready::EMPTY;
            if interest.is_readable() && !self.shared.inbound.lock().unwrap().is_empty() {
                ready |= Ready::READABLE;
            }
            if interest.is_writable()
                && self.shared.write_capacity.load(Ordering::SeqCst) > 0
            {
                ready |= Ready::WRITABLE;
            }
            if !ready.is_empty() {
                return Ok(ready);
            }

            self.shared.notify.notified().await;
        }
    }

    fn try_recv(&mut self) -> TransportResult<Option<Bytes>> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.shared.inbound.lock().unwrap().pop_front() {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    fn try_send(&mut self, buf: &[u8]) -> TransportResult<usize> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(error) = self.shared.send_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        let capacity = self.shared.write_capacity.load(Ordering::SeqCst);
        let n = buf.len().min(capacity);
        self.shared.sent.lock().unwrap().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    async fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
