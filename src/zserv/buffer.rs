//! Stream assembly buffers for the zserv byte stream.
//!
//! [`InboundBuffer`] accumulates raw received bytes and yields complete
//! messages; [`WriteQueue`] holds composed-but-unsent messages in strict
//! FIFO order across short or blocked writes.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::FramingError;
use crate::zserv::message::{Header, HEADER_SIZE, MAX_PACKET_SIZE};

/// A complete inbound message, header already stripped and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// The raw command code; unknown codes are the dispatcher's problem.
    pub command: u16,
    pub payload: Bytes,
}

/// Accumulates raw received bytes into complete messages.
#[derive(Debug, Default)]
pub struct InboundBuffer {
    buf: BytesMut,
}

impl InboundBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_PACKET_SIZE),
        }
    }

    /// Append a chunk of received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all buffered bytes. Used on connection reset.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Extract the next complete message, if one is fully buffered.
    ///
    /// Returns `Ok(None)` while the header or the declared payload is
    /// still incomplete; that is the normal "wait for more data" state,
    /// not an error. Header validation failures are fatal framing errors.
    pub fn try_extract(&mut self) -> Result<Option<RawMessage>, FramingError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = Header::decode(&self.buf[..HEADER_SIZE])?;
        let total = header.length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(total).freeze();
        frame.advance(HEADER_SIZE);
        Ok(Some(RawMessage {
            command: header.command,
            payload: frame,
        }))
    }
}

/// Ordered queue of composed-but-unsent message buffers.
///
/// Entries are whole messages. The front entry is consumed by byte count
/// as writes complete and is removed only once fully written, so message
/// boundaries are never split across entries and drain order is strictly
/// FIFO.
#[derive(Debug, Default)]
pub struct WriteQueue {
    entries: VecDeque<Bytes>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a fully composed message.
    pub fn push(&mut self, message: Bytes) {
        self.entries.push_back(message);
    }

    /// The unsent remainder of the oldest message.
    pub fn front(&self) -> Option<&[u8]> {
        self.entries.front().map(|b| &b[..])
    }

    /// Mark `n` bytes of the front entry as written, dropping the entry
    /// once nothing of it remains.
    pub fn advance(&mut self, n: usize) {
        if let Some(front) = self.entries.front_mut() {
            debug_assert!(n <= front.len());
            front.advance(n.min(front.len()));
            if front.is_empty() {
                self.entries.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all pending messages. Used on connection reset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RouteType;
    use crate::zserv::message::{
        encode_command, encode_message, encode_redistribute, Command, MARKER, VERSION,
    };

    // ==================== InboundBuffer Tests ====================

    #[test]
    fn test_extract_from_empty_buffer() {
        let mut buf = InboundBuffer::new();
        assert_eq!(buf.try_extract().unwrap(), None);
    }

    #[test]
    fn test_extract_complete_message() {
        let mut buf = InboundBuffer::new();
        buf.extend(&encode_message(Command::RouterIdUpdate, &[1, 2, 3]));

        let message = buf.try_extract().unwrap().unwrap();
        assert_eq!(message.command, Command::RouterIdUpdate as u16);
        assert_eq!(&message.payload[..], &[1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_byte_by_byte_feed() {
        // A message split across arbitrary read boundaries decodes the
        // same as one delivered whole; byte-by-byte is the worst case.
        let wire = encode_message(Command::InterfaceUp, &[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut buf = InboundBuffer::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.extend(&[*byte]);
            let extracted = buf.try_extract().unwrap();
            if i < wire.len() - 1 {
                assert_eq!(extracted, None, "complete message after {} bytes", i + 1);
            } else {
                let message = extracted.unwrap();
                assert_eq!(message.command, Command::InterfaceUp as u16);
                assert_eq!(&message.payload[..], &[0xAA, 0xBB, 0xCC, 0xDD]);
            }
        }
    }

    #[test]
    fn test_incomplete_payload_is_not_an_error() {
        // Header declares 6 + 12 bytes but only 10 payload bytes arrive:
        // the buffer reports "incomplete" until the rest shows up.
        let wire = encode_message(Command::RouterIdUpdate, &[7u8; 12]);

        let mut buf = InboundBuffer::new();
        buf.extend(&wire[..HEADER_SIZE + 10]);
        assert_eq!(buf.try_extract().unwrap(), None);
        assert_eq!(buf.try_extract().unwrap(), None);

        buf.extend(&wire[HEADER_SIZE + 10..]);
        let message = buf.try_extract().unwrap().unwrap();
        assert_eq!(&message.payload[..], &[7u8; 12]);
    }

    #[test]
    fn test_extract_multiple_messages_from_one_chunk() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_command(Command::RouterIdAdd));
        wire.extend_from_slice(&encode_redistribute(
            Command::RedistributeAdd,
            RouteType::Static,
        ));
        wire.extend_from_slice(&encode_command(Command::InterfaceAdd));

        let mut buf = InboundBuffer::new();
        buf.extend(&wire);

        let commands: Vec<u16> = std::iter::from_fn(|| buf.try_extract().unwrap())
            .map(|m| m.command)
            .collect();
        assert_eq!(
            commands,
            vec![
                Command::RouterIdAdd as u16,
                Command::RedistributeAdd as u16,
                Command::InterfaceAdd as u16,
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_bad_marker_is_fatal() {
        let mut wire = encode_command(Command::RouterIdAdd).to_vec();
        wire[2] = 0x00;

        let mut buf = InboundBuffer::new();
        buf.extend(&wire);
        assert_eq!(buf.try_extract(), Err(FramingError::BadMarker(0x00)));
    }

    #[test]
    fn test_extract_bad_version_is_fatal() {
        let wire = [0x00, 0x06, MARKER, VERSION + 1, 0x00, 0x01];
        let mut buf = InboundBuffer::new();
        buf.extend(&wire);
        assert_eq!(buf.try_extract(), Err(FramingError::BadVersion(VERSION + 1)));
    }

    #[test]
    fn test_clear_discards_partial_input() {
        let wire = encode_message(Command::InterfaceAdd, &[1, 2, 3, 4]);
        let mut buf = InboundBuffer::new();
        buf.extend(&wire[..7]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.try_extract().unwrap(), None);
    }

    // ==================== WriteQueue Tests ====================

    #[test]
    fn test_write_queue_fifo_order() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"first"));
        queue.push(Bytes::from_static(b"second"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front(), Some(&b"first"[..]));
        queue.advance(5);
        assert_eq!(queue.front(), Some(&b"second"[..]));
        queue.advance(6);
        assert!(queue.is_empty());
        assert_eq!(queue.front(), None);
    }

    #[test]
    fn test_write_queue_partial_advance_keeps_remainder() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"abcdef"));

        queue.advance(2);
        assert_eq!(queue.front(), Some(&b"cdef"[..]));
        assert_eq!(queue.len(), 1);

        queue.advance(4);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_write_queue_entry_removed_only_when_fully_written() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"abc"));
        queue.push(Bytes::from_static(b"def"));

        queue.advance(1);
        queue.advance(1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front(), Some(&b"c"[..]));

        queue.advance(1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front(), Some(&b"def"[..]));
    }

    #[test]
    fn test_write_queue_clear() {
        let mut queue = WriteQueue::new();
        queue.push(Bytes::from_static(b"abc"));
        queue.advance(1);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.front(), None);
    }
}
