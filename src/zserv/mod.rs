//! The zserv protocol engine: framing, buffering, dispatch and the
//! session state machine.

pub mod buffer;
pub mod dispatch;
pub mod message;
pub mod redist;
pub mod session;
pub mod transport;

pub use dispatch::{Event, EventKind, HandlerResult};
pub use message::{Command, Ipv4Route, Ipv6Route};
pub use session::{ClientConfig, ClientHandle, Session, SessionState, SessionStatus};
pub use transport::unix::UnixTransport;
pub use transport::Transport;
