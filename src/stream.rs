//! Component E: per-stream state machine, body source, and flow-control
//! accounting. Grounded on `original_source/SPDY/SPDYStream.h` for the
//! attribute list and spec §4.E for the transition table; the state enum
//! itself follows the shape of the teacher's own `StreamState`.

use crate::error::StreamError;
use crate::frame::StreamId;
use crate::headers::HeaderBlock;
use crate::metadata::Metadata;
use bytes::Bytes;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    /// Server-pushed stream the client may only read from.
    Reserved,
    Closed,
}

/// Where an outbound request body comes from. Read lazily and chunked to
/// the current effective send window (spec §4.E).
pub enum BodySource {
    Memory(Bytes),
    Reader(Box<dyn BodyReader>),
}

/// A pull-based body source for stream and file bodies. Implementors are
/// polled synchronously from the session's cooperative scheduler, so
/// `read` must not block; an implementation backed by a file or async
/// stream is expected to buffer ahead of time and report
/// `has_data_available` honestly.
pub trait BodyReader: Send {
    fn has_data_available(&self) -> bool;
    fn has_data_pending(&self) -> bool {
        self.has_data_available()
    }
    /// Pulls up to `max` bytes. An empty, non-final return means "no data
    /// ready right now, but more may arrive" (`has_data_available` was a
    /// stale true); the bool signals no further bytes will ever arrive.
    fn read(&mut self, max: usize) -> (Bytes, bool);
}

impl BodySource {
    pub fn has_data_available(&self) -> bool {
        match self {
            BodySource::Memory(b) => !b.is_empty(),
            BodySource::Reader(r) => r.has_data_available(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            BodySource::Memory(b) => b.is_empty(),
            BodySource::Reader(r) => !r.has_data_pending(),
        }
    }

    /// Returns up to `max` bytes and whether this was the last chunk.
    pub fn read(&mut self, max: usize) -> (Bytes, bool) {
        match self {
            BodySource::Memory(b) => {
                let take = max.min(b.len());
                let chunk = b.split_to(take);
                (chunk, b.is_empty())
            }
            BodySource::Reader(r) => r.read(max),
        }
    }
}

impl Default for BodySource {
    fn default() -> Self {
        BodySource::Memory(Bytes::new())
    }
}

/// One request/response exchange multiplexed within a [`crate::session::Session`].
pub struct Stream {
    pub id: StreamId,
    pub priority: u8,
    pub state: StreamState,
    pub received_reply: bool,

    pub send_window: i64,
    pub receive_window: i64,
    initial_receive_window: i64,

    pub request_headers: HeaderBlock,
    pub body: BodySource,
    sent_fin: bool,

    pub response_headers: HeaderBlock,
    response_body: VecDeque<Bytes>,

    pub associated_to: Option<StreamId>,
    pub metadata: Metadata,

    terminal_delivered: bool,
}

impl Stream {
    pub fn new(
        id: StreamId,
        priority: u8,
        request_headers: HeaderBlock,
        body: BodySource,
        initial_send_window: u32,
        initial_receive_window: u32,
    ) -> Self {
        Self {
            id,
            priority,
            state: StreamState::Idle,
            received_reply: false,
            send_window: initial_send_window as i64,
            receive_window: initial_receive_window as i64,
            initial_receive_window: initial_receive_window as i64,
            request_headers,
            body,
            sent_fin: false,
            response_headers: HeaderBlock::new(),
            response_body: VecDeque::new(),
            associated_to: None,
            metadata: Metadata::new(id),
            terminal_delivered: false,
        }
    }

    pub fn new_reserved(id: StreamId, associated_to: StreamId) -> Self {
        let mut stream = Self::new(id, 0, HeaderBlock::new(), BodySource::default(), 0, 0);
        stream.state = StreamState::Reserved;
        stream.associated_to = Some(associated_to);
        // Pushed streams never get a SYN_REPLY; the pushed SYN_STREAM's
        // headers play that role, so DATA is admissible right away.
        stream.received_reply = true;
        stream
    }

    pub fn is_write_blocked(&self) -> bool {
        self.send_window <= 0
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.state, StreamState::Idle | StreamState::Open)
            && !self.is_write_blocked()
            && (self.body.has_data_available() || (!self.sent_fin && self.body.is_exhausted()))
    }

    /// True once the local side has created the stream and not yet seen
    /// it fully close — a GET typically sends its FIN immediately, so
    /// `HalfClosedLocal` still counts as a valid push-association parent.
    pub fn is_locally_open(&self) -> bool {
        matches!(
            self.state,
            StreamState::Idle
                | StreamState::Open
                | StreamState::HalfClosedLocal
                | StreamState::HalfClosedRemote
        )
    }

    pub fn is_fully_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Transition on having just sent SYN_STREAM or the final outbound
    /// DATA/HEADERS frame.
    pub fn on_local_fin_sent(&mut self) {
        self.sent_fin = true;
        self.state = match self.state {
            StreamState::Idle => StreamState::HalfClosedLocal,
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        };
    }

    pub fn on_local_non_fin_sent(&mut self) {
        if self.state == StreamState::Idle {
            self.state = StreamState::Open;
        }
    }

    pub fn on_remote_fin_received(&mut self) {
        self.state = match self.state {
            StreamState::Idle | StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            // A pushed stream is client-receive-only; the server's FIN is
            // the only closing signal it ever gets.
            StreamState::Reserved => StreamState::Closed,
            other => other,
        };
    }

    pub fn on_rst(&mut self) {
        self.state = StreamState::Closed;
    }

    /// Records an inbound SYN_REPLY; errors if this is a duplicate (spec
    /// §4.E: second SYN_REPLY is STREAM_IN_USE).
    pub fn receive_reply(&mut self, headers: HeaderBlock) -> Result<(), StreamError> {
        if self.received_reply {
            return Err(StreamError::StreamInUse);
        }
        self.received_reply = true;
        self.response_headers.extend(headers);
        Ok(())
    }

    pub fn receive_headers(&mut self, headers: HeaderBlock) {
        for (name, mut values) in headers {
            self.response_headers.entry(name).or_default().append(&mut values);
        }
    }

    /// Accepts inbound DATA payload; errors if it arrived before
    /// SYN_REPLY or on an already remote-closed stream (spec §4.E).
    pub fn receive_data(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        if !self.received_reply {
            return Err(StreamError::ProtocolError);
        }
        if self.state == StreamState::HalfClosedRemote || self.state == StreamState::Closed {
            return Err(StreamError::StreamAlreadyClosed);
        }
        self.metadata.rx_bytes += chunk.len() as u64;
        self.response_body.push_back(chunk);
        Ok(())
    }

    pub fn drain_response_body(&mut self) -> Vec<Bytes> {
        self.response_body.drain(..).collect()
    }

    /// Applies a peer SETTINGS change to INITIAL_WINDOW_SIZE retroactively
    /// (spec §4.E): `send_window += new - old`, which may drive it negative.
    pub fn adjust_send_window(&mut self, delta: i64) {
        self.send_window += delta;
    }

    pub fn apply_window_update(&mut self, delta: u32) {
        self.send_window += delta as i64;
    }

    /// Below half the initial receive window, the stream must refill via
    /// WINDOW_UPDATE (spec §4.E).
    pub fn needs_window_update(&self, consumed: i64) -> bool {
        self.receive_window - consumed < self.initial_receive_window / 2
    }

    pub fn consume_receive_window(&mut self, delta: i64) {
        self.receive_window -= delta;
    }

    pub fn refill_receive_window(&mut self, delta: u32) {
        self.receive_window += delta as i64;
    }

    pub fn should_deliver_terminal(&mut self) -> bool {
        if self.terminal_delivered {
            false
        } else {
            self.terminal_delivered = true;
            true
        }
    }
}
