//! Inbound event dispatch.
//!
//! Asynchronous notifications from the manager are decoded into [`Event`]
//! values and routed through a handler table keyed by [`EventKind`].
//! Registration replaces any previous handler for the same kind; a kind
//! with no handler is a valid "ignore" state. Handlers run synchronously
//! on the session task, in message-arrival order, and must not block.

use std::collections::HashMap;
use std::fmt;

use bytes::Buf;
use tracing::{trace, warn};

use crate::error::FramingError;
use crate::types::{ConnectedAddress, InterfaceInfo, Ipv4Prefix, Ipv6Prefix, Prefix};
use crate::zserv::message::{
    decode_interface, decode_interface_address, decode_ipv4_route, decode_ipv6_route,
    decode_router_id, Command, Ipv4Route, Ipv6Route,
};

/// The kinds of asynchronous notification a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RouterIdUpdate,
    InterfaceAdd,
    InterfaceDelete,
    InterfaceUp,
    InterfaceDown,
    AddressAdd,
    AddressDelete,
    Ipv4RouteAdd,
    Ipv4RouteDelete,
    Ipv6RouteAdd,
    Ipv6RouteDelete,
}

impl EventKind {
    /// The event kind carried by an inbound command, if any. Commands
    /// that only ever flow client-to-manager map to `None`.
    pub(crate) fn from_command(command: Command) -> Option<Self> {
        match command {
            Command::RouterIdUpdate => Some(EventKind::RouterIdUpdate),
            Command::InterfaceAdd => Some(EventKind::InterfaceAdd),
            Command::InterfaceDelete => Some(EventKind::InterfaceDelete),
            Command::InterfaceUp => Some(EventKind::InterfaceUp),
            Command::InterfaceDown => Some(EventKind::InterfaceDown),
            Command::InterfaceAddressAdd => Some(EventKind::AddressAdd),
            Command::InterfaceAddressDelete => Some(EventKind::AddressDelete),
            Command::Ipv4RouteAdd => Some(EventKind::Ipv4RouteAdd),
            Command::Ipv4RouteDelete => Some(EventKind::Ipv4RouteDelete),
            Command::Ipv6RouteAdd => Some(EventKind::Ipv6RouteAdd),
            Command::Ipv6RouteDelete => Some(EventKind::Ipv6RouteDelete),
            Command::RedistributeAdd
            | Command::RedistributeDelete
            | Command::RedistributeDefaultAdd
            | Command::RedistributeDefaultDelete
            | Command::RouterIdAdd
            | Command::RouterIdDelete => None,
        }
    }
}

/// A decoded asynchronous notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RouterIdUpdate(Prefix),
    InterfaceAdd(InterfaceInfo),
    InterfaceDelete(InterfaceInfo),
    InterfaceUp(InterfaceInfo),
    InterfaceDown(InterfaceInfo),
    AddressAdd(ConnectedAddress),
    AddressDelete(ConnectedAddress),
    Ipv4RouteAdd { prefix: Ipv4Prefix, route: Ipv4Route },
    Ipv4RouteDelete { prefix: Ipv4Prefix, route: Ipv4Route },
    Ipv6RouteAdd { prefix: Ipv6Prefix, route: Ipv6Route },
    Ipv6RouteDelete { prefix: Ipv6Prefix, route: Ipv6Route },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RouterIdUpdate(_) => EventKind::RouterIdUpdate,
            Event::InterfaceAdd(_) => EventKind::InterfaceAdd,
            Event::InterfaceDelete(_) => EventKind::InterfaceDelete,
            Event::InterfaceUp(_) => EventKind::InterfaceUp,
            Event::InterfaceDown(_) => EventKind::InterfaceDown,
            Event::AddressAdd(_) => EventKind::AddressAdd,
            Event::AddressDelete(_) => EventKind::AddressDelete,
            Event::Ipv4RouteAdd { .. } => EventKind::Ipv4RouteAdd,
            Event::Ipv4RouteDelete { .. } => EventKind::Ipv4RouteDelete,
            Event::Ipv6RouteAdd { .. } => EventKind::Ipv6RouteAdd,
            Event::Ipv6RouteDelete { .. } => EventKind::Ipv6RouteDelete,
        }
    }
}

/// Decode the payload of an inbound notification command.
pub(crate) fn decode_event(
    command: Command,
    payload: &mut impl Buf,
) -> Result<Event, FramingError> {
    let event = match command {
        Command::RouterIdUpdate => Event::RouterIdUpdate(decode_router_id(payload)?),
        Command::InterfaceAdd => Event::InterfaceAdd(decode_interface(payload)?),
        Command::InterfaceDelete => Event::InterfaceDelete(decode_interface(payload)?),
        Command::InterfaceUp => Event::InterfaceUp(decode_interface(payload)?),
        Command::InterfaceDown => Event::InterfaceDown(decode_interface(payload)?),
        Command::InterfaceAddressAdd => Event::AddressAdd(decode_interface_address(payload)?),
        Command::InterfaceAddressDelete => {
            Event::AddressDelete(decode_interface_address(payload)?)
        }
        Command::Ipv4RouteAdd => {
            let (prefix, route) = decode_ipv4_route(payload)?;
            Event::Ipv4RouteAdd { prefix, route }
        }
        Command::Ipv4RouteDelete => {
            let (prefix, route) = decode_ipv4_route(payload)?;
            Event::Ipv4RouteDelete { prefix, route }
        }
        Command::Ipv6RouteAdd => {
            let (prefix, route) = decode_ipv6_route(payload)?;
            Event::Ipv6RouteAdd { prefix, route }
        }
        Command::Ipv6RouteDelete => {
            let (prefix, route) = decode_ipv6_route(payload)?;
            Event::Ipv6RouteDelete { prefix, route }
        }
        _ => {
            return Err(FramingError::InvalidField {
                field: "inbound command",
                value: command as u32,
            })
        }
    };
    Ok(event)
}

/// Status returned by a handler; the dispatcher logs failures and moves on.
pub type HandlerResult = Result<(), String>;

/// A registered notification handler.
///
/// Receives the decoded event and the payload length as a hint, runs on
/// the session task and therefore must not block.
pub type EventHandler = Box<dyn FnMut(&Event, u16) -> HandlerResult + Send>;

/// Handler table keyed by event kind.
#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<EventKind, EventHandler>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&EventKind> = self.handlers.keys().collect();
        kinds.sort_by_key(|k| format!("{:?}", k));
        f.debug_struct("DispatchTable").field("kinds", &kinds).finish()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`. The last registration wins.
    pub fn register(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.insert(kind, handler);
    }

    /// Invoke the handler registered for the event's kind, if any.
    ///
    /// A missing handler means the event is uninteresting to this client
    /// and is skipped. Handler failures are logged, never acted on.
    pub fn dispatch(&mut self, event: &Event, length: u16) {
        match self.handlers.get_mut(&event.kind()) {
            Some(handler) => {
                if let Err(status) = handler(event, length) {
                    warn!(kind = ?event.kind(), status, "event handler reported failure");
                }
            }
            None => {
                trace!(kind = ?event.kind(), "no handler registered, skipping event");
            }
        }
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}
