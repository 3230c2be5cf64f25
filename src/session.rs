//! Component G: the connection-level state machine. Owns the byte
//! stream, the frame codec, the stream set, and the sending scheduler.
//! Grounded on `original_source/SPDY/SPDYSession.h` for the attribute
//! list and spec §4.G for the lifecycle/dispatch/scheduler rules.

use crate::compressor::HeaderCompressor;
use crate::config::Configuration;
use crate::error::{CodecError, Error, SessionError, StreamError};
use crate::frame::codec::{FrameDecoder, FrameEncoder};
use crate::frame::{
    DataFrame, Frame, GoAwayFrame, HeadersFrame, PingFrame, RstStreamFrame, SettingsEntry,
    SettingsFrame, SettingsId, StreamId, SynReplyFrame, SynStreamFrame, WindowUpdateFrame,
    MAX_DATA_PAYLOAD,
};
use crate::headers::HeaderBlock;
use crate::metadata::Metadata;
use crate::origin::Origin;
use crate::settings::SettingsStore;
use crate::stream::{BodySource, Stream, StreamState};
use crate::stream_set::StreamSet;
use bytes::Bytes;
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedSender;

const DEFAULT_WINDOW: u32 = 65536;

/// One event delivered to the caller that submitted a stream (spec §6
/// "Caller-facing contract"). `Finished`/`Failed` are mutually exclusive
/// and terminal.
#[derive(Debug)]
pub enum StreamEvent {
    Response(HeaderBlock),
    BodyChunk(Bytes),
    Finished(Metadata),
    Failed(Error, Metadata),
}

/// Delivered to the session's push callback on an inbound server-pushed
/// SYN_STREAM (spec §4.G, §8 scenario 6).
#[derive(Debug)]
pub struct PushReceived {
    pub stream_id: StreamId,
    pub associated_to: StreamId,
    pub headers: HeaderBlock,
}

pub struct SubmitRequest {
    pub headers: HeaderBlock,
    pub body: BodySource,
    pub priority: u8,
    pub events: UnboundedSender<StreamEvent>,
}

/// One logical SPDY connection (spec §3 "Session"). Generic over the
/// transport so tests can plug in an in-memory duplex instead of a real
/// TLS socket.
pub struct Session<S> {
    transport: S,
    pub origin: Origin,
    config: Configuration,
    settings_store: Arc<SettingsStore>,

    send_compressor: HeaderCompressor,
    recv_compressor: HeaderCompressor,
    encoder: FrameEncoder,
    decoder: FrameDecoder,

    streams: StreamSet,
    delegates: std::collections::HashMap<StreamId, UnboundedSender<StreamEvent>>,
    push_events: Option<UnboundedSender<PushReceived>>,

    next_stream_id: StreamId,
    last_server_stream_id: StreamId,
    last_good_stream_id: StreamId,

    session_send_window: i64,
    session_receive_window: i64,
    initial_session_receive_window: i64,
    initial_stream_send_window: u32,
    initial_stream_receive_window: u32,

    session_connected_at: Option<Instant>,
    next_ping_id: u32,
    pending_ping: Option<(u32, Instant)>,
    last_rtt: Option<Duration>,

    going_away: bool,
    closed: bool,

    read_buf: Vec<u8>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        transport: S,
        origin: Origin,
        config: Configuration,
        settings_store: Arc<SettingsStore>,
    ) -> Self {
        let level = config.header_compression_level;
        let initial_stream_receive_window = config.stream_receive_window;
        Self {
            transport,
            origin,
            config,
            settings_store,
            send_compressor: HeaderCompressor::new(level),
            recv_compressor: HeaderCompressor::new(level),
            encoder: FrameEncoder::new(),
            decoder: FrameDecoder::new(),
            streams: StreamSet::new(),
            delegates: std::collections::HashMap::new(),
            push_events: None,
            next_stream_id: 1,
            last_server_stream_id: 0,
            last_good_stream_id: 0,
            session_send_window: DEFAULT_WINDOW as i64,
            session_receive_window: DEFAULT_WINDOW as i64,
            initial_session_receive_window: DEFAULT_WINDOW as i64,
            initial_stream_send_window: DEFAULT_WINDOW,
            initial_stream_receive_window,
            session_connected_at: None,
            next_ping_id: 1,
            pending_ping: None,
            last_rtt: None,
            going_away: false,
            closed: false,
            read_buf: vec![0u8; 16 * 1024],
        }
    }

    pub fn set_push_callback(&mut self, sender: UnboundedSender<PushReceived>) {
        self.push_events = Some(sender);
    }

    pub fn is_going_away(&self) -> bool {
        self.going_away
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn open_stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Step 2 of the lifecycle (spec §4.G): the initial SETTINGS plus,
    /// if configured above the default, a session WINDOW_UPDATE.
    pub async fn establish(&mut self) -> Result<(), Error> {
        self.session_connected_at = Some(Instant::now());
        let mut entries = Vec::new();
        if self.initial_stream_receive_window != DEFAULT_WINDOW {
            entries.push(SettingsEntry {
                id: SettingsId::InitialWindowSize,
                flags: crate::frame::flags::SettingsEntryFlags::empty(),
                value: self.initial_stream_receive_window,
            });
        }
        for (id, value) in persisted_entries(&self.settings_store.snapshot_for(&self.origin)) {
            entries.push(SettingsEntry {
                id,
                flags: crate::frame::flags::SettingsEntryFlags::PERSISTED,
                value,
            });
        }
        if !entries.is_empty() {
            self.send_frame(Frame::Settings(SettingsFrame {
                clear_settings: false,
                entries,
            }))
            .await?;
        }

        if self.config.session_receive_window > DEFAULT_WINDOW {
            let delta = self.config.session_receive_window - DEFAULT_WINDOW;
            self.session_receive_window += delta as i64;
            self.initial_session_receive_window += delta as i64;
            self.send_frame(Frame::WindowUpdate(WindowUpdateFrame {
                stream_id: 0,
                delta,
            }))
            .await?;
        }
        Ok(())
    }

    /// Assigns a stream id, registers the caller's event channel, and
    /// enqueues SYN_STREAM. Returns the assigned id.
    pub async fn submit(&mut self, request: SubmitRequest) -> Result<StreamId, Error> {
        if self.going_away || self.closed {
            return Err(StreamError::RefusedStream.into());
        }
        if let Some(missing) = crate::headers::missing_required_headers(&request.headers).first()
        {
            return Err(Error::Other(format!("missing required header {missing}")));
        }

        let id = self.next_stream_id;
        self.next_stream_id += 2;

        let fin = matches!(&request.body, BodySource::Memory(b) if b.is_empty());
        let mut stream = Stream::new(
            id,
            request.priority,
            request.headers.clone(),
            request.body,
            self.initial_stream_send_window,
            self.initial_stream_receive_window,
        );
        stream.metadata.time_session_connected = self.session_connected_at;
        stream.metadata.time_stream_request_started = Some(Instant::now());
        if fin {
            stream.metadata.time_stream_request_ended = stream.metadata.time_stream_request_started;
        }
        self.delegates.insert(id, request.events);
        self.streams.insert(stream);
        self.last_good_stream_id = self.last_good_stream_id.max(id);

        self.send_frame(Frame::SynStream(SynStreamFrame {
            stream_id: id,
            associated_to: 0,
            priority: request.priority,
            fin,
            unidirectional: false,
            headers: request.headers,
        }))
        .await?;

        if let Some(stream) = self.streams.get_mut(id) {
            if fin {
                stream.on_local_fin_sent();
            } else {
                stream.on_local_non_fin_sent();
            }
        }
        Ok(id)
    }

    pub async fn cancel(&mut self, id: StreamId) -> Result<(), Error> {
        if let Some(stream) = self.streams.get_mut(id) {
            if !stream.is_fully_closed() {
                stream.on_rst();
                self.send_frame(Frame::RstStream(RstStreamFrame {
                    stream_id: id,
                    status: StreamError::Cancel.status_code(),
                }))
                .await?;
            }
        }
        self.finish_stream(id, None).await;
        Ok(())
    }

    /// Drives one iteration: reads whatever is available, dispatches any
    /// complete frames, then runs the sending scheduler. Intended to be
    /// called in a loop by the owning task.
    pub async fn poll(&mut self) -> Result<(), Error> {
        let read = self.transport.read(&mut self.read_buf);
        let n = match self.config.ping_interval {
            Some(interval) => match tokio::time::timeout(interval, read).await {
                Ok(Ok(n)) => n,
                Ok(Err(_)) => return self.fail_session(SessionError::InternalError).await,
                Err(_elapsed) => {
                    self.on_ping_interval_elapsed().await?;
                    return Ok(());
                }
            },
            None => match read.await {
                Ok(n) => n,
                Err(_) => return self.fail_session(SessionError::InternalError).await,
            },
        };
        if n == 0 {
            return self.fail_session(SessionError::InternalError).await;
        }
        let chunk = self.read_buf[..n].to_vec();
        self.ingest(&chunk).await?;
        self.run_scheduler().await?;
        Ok(())
    }

    async fn ingest(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let frames = match self.decoder.decode(bytes, &mut self.recv_compressor) {
            Ok(frames) => frames,
            Err(err) => return self.fail_session_from_codec(err).await,
        };
        for frame in frames {
            if let Err(err) = self.dispatch(frame).await {
                match err {
                    Error::Session(e) => return self.fail_session(e).await,
                    other => warn!("stream-level error during dispatch: {other}"),
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), Error> {
        match frame {
            Frame::Data(f) => self.on_data(f).await,
            Frame::SynStream(f) => self.on_syn_stream(f).await,
            Frame::SynReply(f) => self.on_syn_reply(f).await,
            Frame::RstStream(f) => self.on_rst_stream(f).await,
            Frame::Settings(f) => self.on_settings(f),
            Frame::Ping(f) => self.on_ping(f).await,
            Frame::GoAway(f) => self.on_goaway(f).await,
            Frame::Headers(f) => self.on_headers(f),
            Frame::WindowUpdate(f) => self.on_window_update(f),
        }
    }

    async fn on_data(&mut self, frame: DataFrame) -> Result<(), Error> {
        if !self.streams.contains(frame.stream_id) {
            if frame.stream_id <= self.last_good_stream_id {
                return Ok(()); // already closed, ignore
            }
            return Err(SessionError::ProtocolError.into());
        }
        self.session_receive_window -= frame.payload.len() as i64;
        let len = frame.payload.len();
        let stream = self.streams.get_mut(frame.stream_id).unwrap();
        stream.consume_receive_window(len as i64);
        let now = Some(Instant::now());
        if stream.metadata.time_stream_response_first_data.is_none() {
            stream.metadata.time_stream_response_first_data = now;
        }
        stream.metadata.time_stream_response_last_data = now;
        if let Err(err) = stream.receive_data(Bytes::from(frame.payload)) {
            return self.reset_stream(frame.stream_id, err).await;
        }
        if frame.fin {
            stream.on_remote_fin_received();
            stream.metadata.time_stream_response_ended = now;
        }
        self.deliver_pending_body(frame.stream_id);
        if self.session_receive_window <= self.initial_session_receive_window / 2 {
            let delta = self.initial_session_receive_window as u32;
            self.session_receive_window += delta as i64;
            self.send_frame(Frame::WindowUpdate(WindowUpdateFrame {
                stream_id: 0,
                delta,
            }))
            .await?;
        }
        let needs_update = self
            .streams
            .get(frame.stream_id)
            .map(|s| s.needs_window_update(0))
            .unwrap_or(false);
        if needs_update {
            let refill = self.initial_stream_receive_window;
            if let Some(stream) = self.streams.get_mut(frame.stream_id) {
                stream.refill_receive_window(refill);
            }
            self.send_frame(Frame::WindowUpdate(WindowUpdateFrame {
                stream_id: frame.stream_id,
                delta: refill,
            }))
            .await?;
        }
        if frame.fin {
            self.maybe_finish(frame.stream_id).await;
        }
        Ok(())
    }

    async fn on_syn_stream(&mut self, frame: SynStreamFrame) -> Result<(), Error> {
        let valid_id = frame.stream_id % 2 == 0 && frame.stream_id > self.last_server_stream_id;
        if !valid_id {
            return self.fail_session(SessionError::ProtocolError).await;
        }

        let parent_ok = self
            .streams
            .get(frame.associated_to)
            .map(|s| s.is_locally_open())
            .unwrap_or(false);
        let has_required = [":host", ":scheme", ":path"]
            .iter()
            .all(|h| frame.headers.contains_key(*h));

        if !parent_ok || !has_required {
            return self
                .reset_stream(frame.stream_id, StreamError::ProtocolError)
                .await;
        }

        self.last_server_stream_id = frame.stream_id;
        self.last_good_stream_id = self.last_good_stream_id.max(frame.stream_id);
        let mut stream = Stream::new_reserved(frame.stream_id, frame.associated_to);
        stream.state = StreamState::Reserved;
        self.streams.insert(stream);

        if let Some(sender) = &self.push_events {
            sender
                .send(PushReceived {
                    stream_id: frame.stream_id,
                    associated_to: frame.associated_to,
                    headers: frame.headers,
                })
                .ok();
        }
        Ok(())
    }

    async fn on_syn_reply(&mut self, frame: SynReplyFrame) -> Result<(), Error> {
        let Some(stream) = self.streams.get_mut(frame.stream_id) else {
            return Ok(());
        };
        if let Err(err) = stream.receive_reply(frame.headers.clone()) {
            return self.reset_stream(frame.stream_id, err).await;
        }
        stream.metadata.time_stream_response_started = Some(Instant::now());
        if let Some(sender) = self.delegates.get(&frame.stream_id) {
            sender.send(StreamEvent::Response(frame.headers)).ok();
        }
        if frame.fin {
            if let Some(stream) = self.streams.get_mut(frame.stream_id) {
                stream.on_remote_fin_received();
            }
            self.maybe_finish(frame.stream_id).await;
        }
        Ok(())
    }

    fn on_settings(&mut self, frame: SettingsFrame) -> Result<(), Error> {
        if frame.clear_settings {
            self.settings_store.clear(&self.origin);
        }
        for entry in frame.entries {
            if entry.id == SettingsId::InitialWindowSize {
                let old = self.initial_stream_send_window as i64;
                let new = entry.value as i64;
                let delta = new - old;
                self.initial_stream_send_window = entry.value;
                for stream in self.streams.iter_mut() {
                    stream.adjust_send_window(delta);
                }
            }
            if entry
                .flags
                .contains(crate::frame::flags::SettingsEntryFlags::PERSIST_VALUE)
            {
                self.settings_store.persist(&self.origin, entry.id, entry.value);
            }
        }
        Ok(())
    }

    async fn on_ping(&mut self, frame: PingFrame) -> Result<(), Error> {
        if frame.id % 2 == 0 {
            self.send_frame(Frame::Ping(frame)).await?;
        } else if let Some((id, sent_at)) = self.pending_ping {
            if id == frame.id {
                self.last_rtt = Some(sent_at.elapsed());
                self.pending_ping = None;
                debug!("ping {} echoed, rtt {:?}", frame.id, self.last_rtt);
            }
        }
        Ok(())
    }

    /// Ping health (spec §4.G "Ping health"): sends a locally-initiated
    /// (odd id) PING if none is outstanding, or fails the session if the
    /// outstanding one has exceeded `config.ping_timeout`.
    async fn on_ping_interval_elapsed(&mut self) -> Result<(), Error> {
        if let Some((_, sent_at)) = self.pending_ping {
            if sent_at.elapsed() >= self.config.ping_timeout {
                return self.fail_session(SessionError::InternalError).await;
            }
            return Ok(());
        }
        self.maybe_send_ping().await
    }

    async fn maybe_send_ping(&mut self) -> Result<(), Error> {
        let id = self.next_ping_id;
        self.next_ping_id += 2;
        self.pending_ping = Some((id, Instant::now()));
        self.send_frame(Frame::Ping(PingFrame { id })).await
    }

    async fn on_goaway(&mut self, frame: GoAwayFrame) -> Result<(), Error> {
        self.going_away = true;
        let ids: Vec<StreamId> = self.streams.ids().collect();
        for id in ids {
            if id > frame.last_good_stream_id && id % 2 == 1 {
                self.finish_stream(id, Some(StreamError::RefusedStream.into()))
                    .await;
            }
        }
        Ok(())
    }

    fn on_headers(&mut self, frame: HeadersFrame) -> Result<(), Error> {
        if let Some(stream) = self.streams.get_mut(frame.stream_id) {
            stream.receive_headers(frame.headers);
            if frame.fin {
                stream.on_remote_fin_received();
            }
        }
        Ok(())
    }

    fn on_window_update(&mut self, frame: WindowUpdateFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            self.session_send_window += frame.delta as i64;
        } else if let Some(stream) = self.streams.get_mut(frame.stream_id) {
            stream.apply_window_update(frame.delta);
        }
        Ok(())
    }

    async fn on_rst_stream(&mut self, frame: RstStreamFrame) -> Result<(), Error> {
        let error = StreamError::from_status_code(frame.status).unwrap_or(StreamError::ProtocolError);
        if let Some(stream) = self.streams.get_mut(frame.stream_id) {
            stream.on_rst();
        }
        self.finish_stream(frame.stream_id, Some(error.into())).await;
        Ok(())
    }

    async fn reset_stream(&mut self, id: StreamId, error: StreamError) -> Result<(), Error> {
        self.send_frame(Frame::RstStream(RstStreamFrame {
            stream_id: id,
            status: error.status_code(),
        }))
        .await?;
        if let Some(stream) = self.streams.get_mut(id) {
            stream.on_rst();
        }
        self.finish_stream(id, Some(error.into())).await;
        Ok(())
    }

    fn deliver_pending_body(&mut self, id: StreamId) {
        if let Some(stream) = self.streams.get_mut(id) {
            let chunks = stream.drain_response_body();
            if let Some(sender) = self.delegates.get(&id) {
                for chunk in chunks {
                    sender.send(StreamEvent::BodyChunk(chunk)).ok();
                }
            }
        }
    }

    async fn maybe_finish(&mut self, id: StreamId) {
        let done = self
            .streams
            .get(id)
            .map(Stream::is_fully_closed)
            .unwrap_or(false);
        if done {
            self.finish_stream(id, None).await;
        }
    }

    async fn finish_stream(&mut self, id: StreamId, error: Option<Error>) {
        if let Some(mut stream) = self.streams.remove(id) {
            if !stream.should_deliver_terminal() {
                return;
            }
            stream.metadata.mark_closed();
            stream.metadata.latency = self.last_rtt;
            if let Some(sender) = self.delegates.remove(&id) {
                let event = match error {
                    Some(e) => StreamEvent::Failed(e, stream.metadata.clone()),
                    None => StreamEvent::Finished(stream.metadata.clone()),
                };
                sender.send(event).ok();
            }
        }
    }

    async fn fail_session(&mut self, error: SessionError) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_frame(Frame::GoAway(GoAwayFrame {
            last_good_stream_id: self.last_server_stream_id,
            status: error.goaway_status(),
        }))
        .await
        .ok();
        let ids: Vec<StreamId> = self.streams.ids().collect();
        for id in ids {
            self.finish_stream(id, Some(error.into())).await;
        }
        Err(error.into())
    }

    async fn fail_session_from_codec(&mut self, err: CodecError) -> Result<(), Error> {
        self.fail_session(SessionError::from(err)).await
    }

    /// Graceful shutdown (spec §4.G "Closing"): GOAWAY with OK status,
    /// idempotent.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_frame(Frame::GoAway(GoAwayFrame {
            last_good_stream_id: self.last_server_stream_id,
            status: 0,
        }))
        .await?;
        let ids: Vec<StreamId> = self.streams.ids().collect();
        for id in ids {
            self.finish_stream(id, None).await;
        }
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let bytes = self
            .encoder
            .encode(&frame, &mut self.send_compressor)
            .map_err(SessionError::from)?;
        self.transport
            .write_all(&bytes)
            .await
            .map_err(crate::error::TransportError::from)?;
        Ok(())
    }

    /// Component G's sending scheduler (spec §4.G): drains pending DATA
    /// for writable streams in priority order until windows or data run
    /// out.
    async fn run_scheduler(&mut self) -> Result<(), Error> {
        loop {
            if self.session_send_window <= 0 {
                break;
            }
            let Some(id) = self.streams.next_priority_stream() else {
                break;
            };
            let stream = self.streams.get_mut(id).unwrap();
            let budget = stream
                .send_window
                .min(self.session_send_window)
                .min(MAX_DATA_PAYLOAD as i64) as usize;
            if budget == 0 {
                break;
            }
            let (chunk, is_last) = stream.body.read(budget);
            if chunk.is_empty() && !is_last {
                break;
            }
            let now = Instant::now();
            if stream.metadata.time_stream_request_first_data.is_none() {
                stream.metadata.time_stream_request_first_data = Some(now);
                if let Some(created) = stream.metadata.time_stream_created {
                    stream.metadata.blocked = now.saturating_duration_since(created);
                }
            }
            stream.metadata.time_stream_request_last_data = Some(now);
            stream.send_window -= chunk.len() as i64;
            self.session_send_window -= chunk.len() as i64;
            let fin = is_last;
            self.send_frame(Frame::Data(DataFrame {
                stream_id: id,
                fin,
                payload: chunk.to_vec(),
            }))
            .await?;
            if let Some(stream) = self.streams.get_mut(id) {
                stream.metadata.tx_bytes += chunk.len() as u64;
                if fin {
                    stream.metadata.time_stream_request_ended = Some(now);
                    stream.on_local_fin_sent();
                }
            }
            self.maybe_finish(id).await;
        }
        Ok(())
    }
}

fn persisted_entries(snapshot: &crate::settings::SettingsSnapshot) -> Vec<(SettingsId, u32)> {
    snapshot
        .iter()
        .filter_map(|(id, value)| value.map(|v| (id, v)))
        .collect()
}
