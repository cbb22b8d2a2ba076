//! riblink - client library for the zserv RIB manager protocol.
//!
//! A routing protocol daemon uses this crate to exchange route and
//! interface information with a central routing-information-base (RIB)
//! manager daemon over a length-prefixed binary protocol on a trusted
//! local socket.
//!
//! The engine is a single tokio task owning the socket and all protocol
//! state; callers hold a cheap [`ClientHandle`] to enable or disable the
//! session, issue route requests, manage redistribution subscriptions
//! and register notification handlers. The session survives manager
//! restarts on its own: it reconnects with doubling backoff and replays
//! every tracked redistribution subscription on each new connection.
//!
//! ```no_run
//! use riblink::{ClientConfig, EventKind, RouteType, Session, UnixTransport};
//!
//! # async fn example() -> Result<(), riblink::RequestError> {
//! let transport = UnixTransport::new("/run/zserv.api");
//! let (session, client) = Session::new(ClientConfig::default(), transport);
//! tokio::spawn(session.run());
//!
//! client
//!     .register(EventKind::RouterIdUpdate, |event, _len| {
//!         println!("router id: {:?}", event);
//!         Ok(())
//!     })
//!     .await?;
//! client.redistribute_add(RouteType::Static).await?;
//! client.enable().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;
pub mod zserv;

pub use error::{FramingError, RequestError};
pub use types::{
    ConnectedAddress, InterfaceInfo, Ipv4Prefix, Ipv6Prefix, Prefix, RouteType, Safi,
};
pub use zserv::{
    ClientConfig, ClientHandle, Command, Event, EventKind, HandlerResult, Ipv4Route, Ipv6Route,
    Session, SessionState, SessionStatus, Transport, UnixTransport,
};
