//! zserv session engine.
//!
//! A single task owns the socket, the stream buffers, the dispatch table
//! and the redistribution tracker, and multiplexes three wait sources
//! with `tokio::select!`: commands from [`ClientHandle`]s, the reconnect
//! timer, and socket readiness. All session state is confined to that
//! task, so nothing here needs a lock.
//!
//! Transport and framing failures never escape the task: the session
//! closes the socket, drops both buffers and the pending-write queue,
//! and schedules a reconnect with doubling backoff. Callers only ever
//! observe them as a later [`RequestError::NotConnected`].

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{Interest, Ready};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{FramingError, RequestError};
use crate::types::{Ipv4Prefix, Ipv6Prefix, RouteType};
use crate::zserv::buffer::{InboundBuffer, RawMessage, WriteQueue};
use crate::zserv::dispatch::{
    decode_event, DispatchTable, Event, EventHandler, EventKind, HandlerResult,
};
use crate::zserv::message::{
    encode_command, encode_ipv4_route, encode_ipv6_route, encode_message, encode_redistribute,
    Command, Ipv4Route, Ipv6Route,
};
use crate::zserv::redist::RedistState;
use crate::zserv::transport::{Transport, TransportError, TransportResult};

/// Largest doubling applied to the base retry delay; the configured cap
/// usually bites first.
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Delay before the first reconnect attempt after a failure.
    pub retry_delay: Duration,
    /// Upper bound on the doubling reconnect delay.
    pub retry_delay_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            retry_delay_max: Duration::from_secs(120),
        }
    }
}

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Administratively off: no socket, no retries.
    Disabled,
    /// Enabled but not connected; a retry may be pending.
    Disconnected,
    /// Socket establishment in progress.
    Connecting,
    /// Socket established; reads and writes are live.
    Connected,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

/// Snapshot of the session published through the status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Consecutive connect failures; zero after any successful connect.
    pub failures: u32,
}

enum SessionCommand {
    Enable,
    Disable,
    Send {
        message: Bytes,
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    RedistributeAdd(RouteType),
    RedistributeDelete(RouteType),
    RedistributeDefaultAdd,
    RedistributeDefaultDelete,
    Register { kind: EventKind, handler: EventHandler },
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "Enable"),
            Self::Disable => write!(f, "Disable"),
            Self::Send { message, .. } => write!(f, "Send({} bytes)", message.len()),
            Self::RedistributeAdd(t) => write!(f, "RedistributeAdd({})", t),
            Self::RedistributeDelete(t) => write!(f, "RedistributeDelete({})", t),
            Self::RedistributeDefaultAdd => write!(f, "RedistributeDefaultAdd"),
            Self::RedistributeDefaultDelete => write!(f, "RedistributeDefaultDelete"),
            Self::Register { kind, .. } => write!(f, "Register({:?})", kind),
        }
    }
}

/// Caller-side handle to a running [`Session`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl ClientHandle {
    /// Administratively enable the session; it connects and then keeps
    /// itself connected until disabled.
    pub async fn enable(&self) -> Result<(), RequestError> {
        self.send_command(SessionCommand::Enable).await
    }

    /// Administratively disable the session: tear down the socket and
    /// all pending output, and stop reconnecting. Safe in any state.
    pub async fn disable(&self) -> Result<(), RequestError> {
        self.send_command(SessionCommand::Disable).await
    }

    /// Register `handler` for an event kind, replacing any previous one.
    pub async fn register(
        &self,
        kind: EventKind,
        handler: impl FnMut(&Event, u16) -> HandlerResult + Send + 'static,
    ) -> Result<(), RequestError> {
        self.send_command(SessionCommand::Register {
            kind,
            handler: Box::new(handler),
        })
        .await
    }

    /// Subscribe to redistribution of routes from `route_type`.
    ///
    /// Idempotent. Sends the subscribe request immediately when
    /// connected; otherwise the subscription is recorded and replayed on
    /// the next successful connect.
    pub async fn redistribute_add(&self, route_type: RouteType) -> Result<(), RequestError> {
        self.send_command(SessionCommand::RedistributeAdd(route_type))
            .await
    }

    /// Withdraw a redistribution subscription. A no-op when not
    /// subscribed.
    pub async fn redistribute_delete(&self, route_type: RouteType) -> Result<(), RequestError> {
        self.send_command(SessionCommand::RedistributeDelete(route_type))
            .await
    }

    /// Subscribe to default-route redistribution.
    pub async fn redistribute_default_add(&self) -> Result<(), RequestError> {
        self.send_command(SessionCommand::RedistributeDefaultAdd)
            .await
    }

    /// Withdraw the default-route subscription.
    pub async fn redistribute_default_delete(&self) -> Result<(), RequestError> {
        self.send_command(SessionCommand::RedistributeDefaultDelete)
            .await
    }

    /// Request installation of an IPv4 route.
    ///
    /// Fails fast with [`RequestError::NotConnected`] while disconnected;
    /// requests are never queued across disconnects because the manager
    /// has no session to apply them to.
    pub async fn ipv4_route_add(
        &self,
        prefix: Ipv4Prefix,
        route: &Ipv4Route,
    ) -> Result<(), RequestError> {
        validate_ipv4_route(route)?;
        let body = encode_ipv4_route(&prefix, route);
        self.send_request(encode_message(Command::Ipv4RouteAdd, &body))
            .await
    }

    /// Request deletion of an IPv4 route.
    pub async fn ipv4_route_delete(
        &self,
        prefix: Ipv4Prefix,
        route: &Ipv4Route,
    ) -> Result<(), RequestError> {
        validate_ipv4_route(route)?;
        let body = encode_ipv4_route(&prefix, route);
        self.send_request(encode_message(Command::Ipv4RouteDelete, &body))
            .await
    }

    /// Request installation of an IPv6 route.
    pub async fn ipv6_route_add(
        &self,
        prefix: Ipv6Prefix,
        route: &Ipv6Route,
    ) -> Result<(), RequestError> {
        validate_ipv6_route(route)?;
        let body = encode_ipv6_route(&prefix, route);
        self.send_request(encode_message(Command::Ipv6RouteAdd, &body))
            .await
    }

    /// Request deletion of an IPv6 route.
    pub async fn ipv6_route_delete(
        &self,
        prefix: Ipv6Prefix,
        route: &Ipv6Route,
    ) -> Result<(), RequestError> {
        validate_ipv6_route(route)?;
        let body = encode_ipv6_route(&prefix, route);
        self.send_request(encode_message(Command::Ipv6RouteDelete, &body))
            .await
    }

    /// Current state and failure counter.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// A watch receiver for observing state changes.
    pub fn status_stream(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    async fn send_command(&self, command: SessionCommand) -> Result<(), RequestError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RequestError::SessionClosed)
    }

    async fn send_request(&self, message: Bytes) -> Result<(), RequestError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send {
                message,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RequestError::SessionClosed)?;
        reply_rx.await.map_err(|_| RequestError::SessionClosed)?
    }
}

fn validate_ipv4_route(route: &Ipv4Route) -> Result<(), RequestError> {
    if route.nexthops.as_ref().is_some_and(|n| n.is_empty()) {
        return Err(RequestError::EmptyFieldList("nexthop"));
    }
    if route.ifindexes.as_ref().is_some_and(|i| i.is_empty()) {
        return Err(RequestError::EmptyFieldList("ifindex"));
    }
    Ok(())
}

fn validate_ipv6_route(route: &Ipv6Route) -> Result<(), RequestError> {
    if route.nexthops.as_ref().is_some_and(|n| n.is_empty()) {
        return Err(RequestError::EmptyFieldList("nexthop"));
    }
    if route.ifindexes.as_ref().is_some_and(|i| i.is_empty()) {
        return Err(RequestError::EmptyFieldList("ifindex"));
    }
    Ok(())
}

/// Retry delay after `failures` consecutive connect failures: the base
/// delay the first time, doubling afterwards, bounded by the cap.
fn retry_delay(config: &ClientConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    config
        .retry_delay
        .saturating_mul(1 << exponent)
        .min(config.retry_delay_max)
}

fn interest_for(pending: &WriteQueue) -> Interest {
    if pending.is_empty() {
        Interest::READABLE
    } else {
        Interest::READABLE | Interest::WRITABLE
    }
}

/// The session task. Construct with [`Session::new`], then spawn
/// [`Session::run`].
pub struct Session<T: Transport> {
    config: ClientConfig,
    transport: T,
    state: SessionState,
    failures: u32,
    retry_deadline: Option<Instant>,
    ibuf: InboundBuffer,
    pending: WriteQueue,
    dispatch: DispatchTable,
    redist: RedistState,
    commands: mpsc::Receiver<SessionCommand>,
    status_tx: watch::Sender<SessionStatus>,
}

impl<T: Transport> Session<T> {
    /// Create a session over `transport` and the handle that drives it.
    /// The session starts `Disabled`; call [`ClientHandle::enable`].
    pub fn new(config: ClientConfig, transport: T) -> (Self, ClientHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Disabled,
            failures: 0,
        });

        let session = Self {
            config,
            transport,
            state: SessionState::Disabled,
            failures: 0,
            retry_deadline: None,
            ibuf: InboundBuffer::new(),
            pending: WriteQueue::new(),
            dispatch: DispatchTable::new(),
            redist: RedistState::new(),
            commands: command_rx,
            status_tx,
        };
        let handle = ClientHandle {
            commands: command_tx,
            status: status_rx,
        };
        (session, handle)
    }

    /// Run the session event loop until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // Every handle dropped; tear down and exit.
                            self.disable().await;
                            break;
                        }
                    }
                }

                _ = Self::wait_for_deadline(self.retry_deadline) => {
                    self.retry_deadline = None;
                    self.connect().await;
                }

                ready = self.transport.ready(interest_for(&self.pending)),
                        if self.state == SessionState::Connected => {
                    self.handle_ready(ready).await;
                }
            }
        }
    }

    /// Wait for an optional deadline.
    async fn wait_for_deadline(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        trace!(?command, "session command");
        match command {
            SessionCommand::Enable => {
                if self.state != SessionState::Disabled {
                    return;
                }
                info!("session administratively enabled");
                self.set_state(SessionState::Disconnected);
                self.connect().await;
            }

            SessionCommand::Disable => {
                self.disable().await;
            }

            SessionCommand::Send { message, reply } => {
                if self.state != SessionState::Connected {
                    let _ = reply.send(Err(RequestError::NotConnected));
                    return;
                }
                match self.send_message(message) {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                    }
                    Err(error) => {
                        self.reset_connection(&format!("write failed: {error}")).await;
                        let _ = reply.send(Err(RequestError::NotConnected));
                    }
                }
            }

            SessionCommand::RedistributeAdd(route_type) => {
                if self.redist.subscribe(route_type) && self.state == SessionState::Connected {
                    debug!(%route_type, "subscribing to redistributed routes");
                    self.send_or_reset(encode_redistribute(Command::RedistributeAdd, route_type))
                        .await;
                }
            }

            SessionCommand::RedistributeDelete(route_type) => {
                if self.redist.unsubscribe(route_type) && self.state == SessionState::Connected {
                    debug!(%route_type, "unsubscribing from redistributed routes");
                    self.send_or_reset(encode_redistribute(
                        Command::RedistributeDelete,
                        route_type,
                    ))
                    .await;
                }
            }

            SessionCommand::RedistributeDefaultAdd => {
                if self.redist.subscribe_default() && self.state == SessionState::Connected {
                    debug!("subscribing to default-route redistribution");
                    self.send_or_reset(encode_command(Command::RedistributeDefaultAdd))
                        .await;
                }
            }

            SessionCommand::RedistributeDefaultDelete => {
                if self.redist.unsubscribe_default() && self.state == SessionState::Connected {
                    debug!("unsubscribing from default-route redistribution");
                    self.send_or_reset(encode_command(Command::RedistributeDefaultDelete))
                        .await;
                }
            }

            SessionCommand::Register { kind, handler } => {
                self.dispatch.register(kind, handler);
            }
        }
    }

    /// Attempt to establish the connection. On success the manager is
    /// brought up to date; it keeps no state across sessions.
    async fn connect(&mut self) {
        if self.state != SessionState::Disconnected {
            return;
        }
        self.set_state(SessionState::Connecting);

        match self.transport.connect().await {
            Ok(()) => {
                info!("connected to RIB manager");
                self.failures = 0;
                self.ibuf.clear();
                self.pending.clear();
                self.set_state(SessionState::Connected);
                self.send_startup_requests().await;
            }
            Err(error) => {
                self.failures += 1;
                debug!(failures = self.failures, error = %error, "connect to RIB manager failed");
                self.set_state(SessionState::Disconnected);
                self.schedule_retry();
            }
        }
    }

    /// Re-request router-id and interface information, then replay every
    /// tracked redistribution subscription.
    async fn send_startup_requests(&mut self) {
        let mut messages = vec![
            encode_command(Command::RouterIdAdd),
            encode_command(Command::InterfaceAdd),
        ];
        for route_type in self.redist.subscribed() {
            messages.push(encode_redistribute(Command::RedistributeAdd, route_type));
        }
        if self.redist.default_route() {
            messages.push(encode_command(Command::RedistributeDefaultAdd));
        }

        for message in messages {
            if let Err(error) = self.send_message(message) {
                self.reset_connection(&format!("write failed: {error}")).await;
                return;
            }
        }
    }

    async fn handle_ready(&mut self, ready: TransportResult<Ready>) {
        let ready = match ready {
            Ok(ready) => ready,
            Err(error) => {
                self.reset_connection(&format!("socket error: {error}")).await;
                return;
            }
        };

        if ready.is_readable() {
            loop {
                match self.transport.try_recv() {
                    Ok(Some(chunk)) => {
                        trace!(len = chunk.len(), "received bytes from manager");
                        self.ibuf.extend(&chunk);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        self.reset_connection(&format!("read failed: {error}")).await;
                        return;
                    }
                }
            }
            if let Err(error) = self.process_inbound() {
                self.reset_connection(&format!("framing error: {error}")).await;
                return;
            }
        }

        if ready.is_writable() && !self.pending.is_empty() {
            if let Err(error) = self.flush_pending() {
                self.reset_connection(&format!("write failed: {error}")).await;
            }
        }
    }

    /// Extract and dispatch every complete message in the inbound buffer.
    fn process_inbound(&mut self) -> Result<(), FramingError> {
        while let Some(raw) = self.ibuf.try_extract()? {
            self.handle_message(raw)?;
        }
        Ok(())
    }

    fn handle_message(&mut self, raw: RawMessage) -> Result<(), FramingError> {
        let Ok(command) = Command::try_from(raw.command) else {
            trace!(command = raw.command, "ignoring unknown command");
            return Ok(());
        };
        if EventKind::from_command(command).is_none() {
            trace!(?command, "ignoring unexpected inbound command");
            return Ok(());
        }

        let length = raw.payload.len() as u16;
        let mut payload = raw.payload;
        let event = decode_event(command, &mut payload)?;
        self.dispatch.dispatch(&event, length);
        Ok(())
    }

    /// Queue a message and write as much of the queue as the socket
    /// accepts. Never blocks; leftovers wait for write readiness.
    fn send_message(&mut self, message: Bytes) -> Result<(), TransportError> {
        self.pending.push(message);
        self.flush_pending()
    }

    fn flush_pending(&mut self) -> Result<(), TransportError> {
        while let Some(chunk) = self.pending.front() {
            let len = chunk.len();
            match self.transport.try_send(chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending.advance(n);
                    if n < len {
                        break;
                    }
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    async fn send_or_reset(&mut self, message: Bytes) {
        if let Err(error) = self.send_message(message) {
            self.reset_connection(&format!("write failed: {error}")).await;
        }
    }

    /// Tear down the connection after an I/O or framing error and
    /// schedule a reconnect. The failure counter is preserved: it counts
    /// consecutive connect failures only.
    async fn reset_connection(&mut self, reason: &str) {
        warn!(reason, "resetting RIB manager session");
        self.transport.close().await;
        self.ibuf.clear();
        self.pending.clear();
        self.set_state(SessionState::Disconnected);
        self.schedule_retry();
    }

    /// Administrative disable: tear everything down, no further retries.
    async fn disable(&mut self) {
        if self.state == SessionState::Disabled {
            return;
        }
        info!("session administratively disabled");
        self.transport.close().await;
        self.ibuf.clear();
        self.pending.clear();
        self.retry_deadline = None;
        self.failures = 0;
        self.set_state(SessionState::Disabled);
    }

    fn schedule_retry(&mut self) {
        let delay = retry_delay(&self.config, self.failures);
        debug!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        self.retry_deadline = Some(Instant::now() + delay);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state change");
            self.state = state;
        }
        let _ = self.status_tx.send(SessionStatus {
            state: self.state,
            failures: self.failures,
        });
    }
}
