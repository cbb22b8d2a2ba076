//! Error types for riblink.
//!
//! The taxonomy follows the propagation policy of the session engine:
//! framing and transport failures are consumed inside the session (reset
//! plus scheduled retry) and never reach request callers, who only ever
//! see [`RequestError`].

use thiserror::Error;

/// A violation of the zserv framing rules.
///
/// Any framing error is fatal to the current connection: the session
/// closes the socket, clears its buffers and schedules a reconnect. It is
/// not reported per-message to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The marker byte was not the 0xFF sentinel.
    #[error("bad marker byte {0:#04x}")]
    BadMarker(u8),

    /// The header carried a protocol version this client does not speak.
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),

    /// The declared total length is shorter than a header or larger than
    /// the maximum message size.
    #[error("declared message length {0} out of range")]
    BadLength(u16),

    /// A payload ended before all declared fields were read.
    #[error("truncated {0} payload")]
    Truncated(&'static str),

    /// A field carried a value outside its defined range.
    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u32 },
}

/// Errors surfaced to request-builder callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The session is not connected to the RIB manager. Requests are
    /// never queued across disconnects; retry after reconnection.
    #[error("not connected to the RIB manager")]
    NotConnected,

    /// An optional field list was supplied but empty, which would set a
    /// presence bit with a zero element count.
    #[error("{0} list is present but empty")]
    EmptyFieldList(&'static str),

    /// The session task is no longer running.
    #[error("session task is no longer running")]
    SessionClosed,
}
