//! End-to-end scenarios driven over an in-memory duplex transport instead
//! of a real socket: a "server" task speaks raw frames on one half while
//! a real [`Session`] drives the other, exactly as a peer would over TLS.

use spdy::compressor::HeaderCompressor;
use spdy::frame::codec::{FrameDecoder, FrameEncoder};
use spdy::frame::flags::SettingsEntryFlags;
use spdy::frame::{
    DataFrame, Frame, GoAwayFrame, HeadersFrame, RstStreamFrame, SettingsEntry, SettingsFrame,
    SettingsId, SynReplyFrame, SynStreamFrame, WindowUpdateFrame,
};
use spdy::headers::canonicalize;
use spdy::session::{Session, StreamEvent, SubmitRequest};
use spdy::settings::SettingsStore;
use spdy::stream::BodySource;
use spdy::{Configuration, Origin};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

struct FakePeer {
    io: DuplexStream,
    encoder: FrameEncoder,
    decoder: FrameDecoder,
    send_compressor: HeaderCompressor,
    recv_compressor: HeaderCompressor,
    pending: std::collections::VecDeque<Frame>,
}

impl FakePeer {
    fn new(io: DuplexStream) -> Self {
        Self {
            io,
            encoder: FrameEncoder::new(),
            decoder: FrameDecoder::new(),
            send_compressor: HeaderCompressor::new(9),
            recv_compressor: HeaderCompressor::new(9),
            pending: std::collections::VecDeque::new(),
        }
    }

    async fn send(&mut self, frame: Frame) {
        let bytes = self.encoder.encode(&frame, &mut self.send_compressor).unwrap();
        self.io.write_all(&bytes).await.unwrap();
    }

    /// A single `read` can land more than one frame (e.g. a burst of
    /// scheduler-emitted DATA); queue the rest instead of dropping them.
    async fn recv_one(&mut self) -> Frame {
        if let Some(frame) = self.pending.pop_front() {
            return frame;
        }
        let mut buf = [0u8; 4096];
        loop {
            let n = self.io.read(&mut buf).await.unwrap();
            assert!(n > 0, "peer closed before a frame arrived");
            let frames = self
                .decoder
                .decode(&buf[..n], &mut self.recv_compressor)
                .unwrap();
            self.pending.extend(frames);
            if let Some(frame) = self.pending.pop_front() {
                return frame;
            }
        }
    }
}

fn test_origin() -> Origin {
    Origin::new("https", "example.com", 443).unwrap()
}

fn request_headers(path: &str) -> spdy::headers::HeaderBlock {
    request_headers_with_method("GET", path)
}

fn request_headers_with_method(method: &str, path: &str) -> spdy::headers::HeaderBlock {
    let origin = test_origin();
    canonicalize([
        (":method".to_owned(), method.to_owned()),
        (":scheme".to_owned(), origin.scheme.clone()),
        (":path".to_owned(), path.to_owned()),
        (":host".to_owned(), origin.authority()),
        (":version".to_owned(), "HTTP/1.1".to_owned()),
    ])
}

/// Spawns a background pump driving `session.poll()` until it errors
/// (session closed or transport gone), the way `session_pool::spawn_pump`
/// drives a real connection.
fn spawn_pump(session: Arc<Mutex<Session<DuplexStream>>>) {
    tokio::spawn(async move {
        loop {
            let result = session.lock().await.poll().await;
            if result.is_err() {
                break;
            }
        }
    });
}

#[tokio::test]
async fn happy_get_delivers_response_then_finishes() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut peer = FakePeer::new(server_io);

    let session = Arc::new(Mutex::new(Session::new(
        client_io,
        test_origin(),
        Configuration::default(),
        Arc::new(SettingsStore::new()),
    )));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .lock()
        .await
        .submit(SubmitRequest {
            headers: request_headers("/a"),
            body: BodySource::default(),
            priority: 0,
            events: tx,
        })
        .await
        .unwrap();
    spawn_pump(session.clone());

    match peer.recv_one().await {
        Frame::SynStream(f) => {
            assert_eq!(f.stream_id, 1);
            assert!(f.fin);
            assert_eq!(f.headers.get(":method").unwrap(), &["GET"]);
        }
        other => panic!("expected SynStream, got {other:?}"),
    }

    let reply_headers = canonicalize([
        (":status".to_owned(), "200".to_owned()),
        (":version".to_owned(), "HTTP/1.1".to_owned()),
        ("content-length".to_owned(), "5".to_owned()),
    ]);
    peer.send(Frame::SynReply(SynReplyFrame {
        stream_id: 1,
        fin: false,
        headers: reply_headers,
    }))
    .await;
    peer.send(Frame::Data(DataFrame {
        stream_id: 1,
        fin: true,
        payload: b"hello".to_vec(),
    }))
    .await;

    let mut got_response = false;
    let mut got_body = Vec::new();
    let mut finished = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Response(h) => {
                assert_eq!(h.get(":status").unwrap(), &["200"]);
                got_response = true;
            }
            StreamEvent::BodyChunk(chunk) => got_body.extend_from_slice(&chunk),
            StreamEvent::Finished(metadata) => {
                finished = true;
                assert!(metadata.rx_bytes >= 5);
                break;
            }
            StreamEvent::Failed(err, _) => panic!("unexpected failure: {err}"),
        }
    }
    assert!(got_response);
    assert_eq!(got_body, b"hello");
    assert!(finished);
    assert_eq!(session.lock().await.open_stream_count(), 0);
}

#[tokio::test]
async fn rst_by_peer_surfaces_refused_stream() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut peer = FakePeer::new(server_io);

    let session = Arc::new(Mutex::new(Session::new(
        client_io,
        test_origin(),
        Configuration::default(),
        Arc::new(SettingsStore::new()),
    )));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .lock()
        .await
        .submit(SubmitRequest {
            headers: request_headers("/a"),
            body: BodySource::default(),
            priority: 0,
            events: tx,
        })
        .await
        .unwrap();
    spawn_pump(session.clone());

    peer.recv_one().await;
    peer.send(Frame::RstStream(RstStreamFrame {
        stream_id: 1,
        status: spdy::StreamError::RefusedStream.status_code(),
    }))
    .await;

    match rx.recv().await {
        Some(StreamEvent::Failed(spdy::Error::Stream(spdy::StreamError::RefusedStream), _)) => {}
        other => panic!("expected RefusedStream failure, got {other:?}"),
    }
}

#[tokio::test]
async fn goaway_past_last_good_id_refuses_the_later_stream() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut peer = FakePeer::new(server_io);

    let session = Arc::new(Mutex::new(Session::new(
        client_io,
        test_origin(),
        Configuration::default(),
        Arc::new(SettingsStore::new()),
    )));

    let (tx1, rx1) = tokio::sync::mpsc::unbounded_channel();
    session
        .lock()
        .await
        .submit(SubmitRequest {
            headers: request_headers("/a"),
            body: BodySource::default(),
            priority: 0,
            events: tx1,
        })
        .await
        .unwrap();
    peer.recv_one().await;

    let (tx3, mut rx3) = tokio::sync::mpsc::unbounded_channel();
    session
        .lock()
        .await
        .submit(SubmitRequest {
            headers: request_headers("/b"),
            body: BodySource::default(),
            priority: 0,
            events: tx3,
        })
        .await
        .unwrap();
    peer.recv_one().await;
    spawn_pump(session.clone());

    peer.send(Frame::GoAway(GoAwayFrame {
        last_good_stream_id: 1,
        status: 0,
    }))
    .await;

    match rx3.recv().await {
        Some(StreamEvent::Failed(spdy::Error::Stream(spdy::StreamError::RefusedStream), _)) => {}
        other => panic!("expected stream 3 to be refused, got {other:?}"),
    }
    assert!(session.lock().await.is_going_away());
    drop(rx1);
}

#[tokio::test]
async fn post_body_is_paced_by_peer_settings_and_window_updates() {
    const BODY_LEN: usize = 131072;
    const SHRUNK_WINDOW: u32 = 32768;
    const TOPUP: u32 = 8192;

    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let mut peer = FakePeer::new(server_io);

    let session = Arc::new(Mutex::new(Session::new(
        client_io,
        test_origin(),
        Configuration::default(),
        Arc::new(SettingsStore::new()),
    )));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .lock()
        .await
        .submit(SubmitRequest {
            headers: request_headers_with_method("POST", "/b"),
            body: BodySource::Memory(bytes::Bytes::from(vec![0u8; BODY_LEN])),
            priority: 0,
            events: tx,
        })
        .await
        .unwrap();

    match peer.recv_one().await {
        Frame::SynStream(f) => assert!(!f.fin, "body is non-empty, SYN_STREAM must not carry FIN"),
        other => panic!("expected SynStream, got {other:?}"),
    }

    peer.send(Frame::Settings(SettingsFrame {
        clear_settings: false,
        entries: vec![SettingsEntry {
            id: SettingsId::InitialWindowSize,
            flags: SettingsEntryFlags::empty(),
            value: SHRUNK_WINDOW,
        }],
    }))
    .await;
    // This scenario is about stream-level pacing; keep the session-level
    // window generously ahead so it's never the bottleneck under test.
    peer.send(Frame::WindowUpdate(WindowUpdateFrame {
        stream_id: 0,
        delta: BODY_LEN as u32,
    }))
    .await;

    spawn_pump(session.clone());

    // Cumulative bytes the stream has ever been granted vs. ever sent —
    // `used` must never outrun `granted`, and once it catches up the peer
    // has to top it up by exactly TOPUP for the stream to make progress.
    let mut granted = SHRUNK_WINDOW as usize;
    let mut used = 0usize;
    let mut total = 0usize;
    let mut saw_fin = false;
    while total < BODY_LEN {
        match peer.recv_one().await {
            Frame::Data(f) => {
                used += f.payload.len();
                total += f.payload.len();
                assert!(
                    used <= granted,
                    "stream sent {used} cumulative bytes against a granted window of {granted}"
                );
                if f.fin {
                    saw_fin = true;
                    assert_eq!(total, BODY_LEN);
                }
                if used == granted && total < BODY_LEN {
                    peer.send(Frame::WindowUpdate(WindowUpdateFrame {
                        stream_id: 1,
                        delta: TOPUP,
                    }))
                    .await;
                    granted += TOPUP as usize;
                }
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }
    assert_eq!(total, BODY_LEN, "every byte of the body must reach the wire");
    assert!(saw_fin, "final DATA frame must carry FIN");

    peer.send(Frame::SynReply(SynReplyFrame {
        stream_id: 1,
        fin: true,
        headers: canonicalize([
            (":status".to_owned(), "200".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ]),
    }))
    .await;

    match rx.recv().await {
        Some(StreamEvent::Response(_)) => {}
        other => panic!("expected Response event, got {other:?}"),
    }
    match rx.recv().await {
        Some(StreamEvent::Finished(_)) => {}
        other => panic!("expected Finished event, got {other:?}"),
    }
}

#[tokio::test]
async fn server_push_is_delivered_to_the_push_callback_and_stream_ends() {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mut peer = FakePeer::new(server_io);

    let mut session = Session::new(
        client_io,
        test_origin(),
        Configuration::default(),
        Arc::new(SettingsStore::new()),
    );
    let (push_tx, mut push_rx) = tokio::sync::mpsc::unbounded_channel();
    session.set_push_callback(push_tx);
    let session = Arc::new(Mutex::new(session));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session
        .lock()
        .await
        .submit(SubmitRequest {
            headers: request_headers("/a"),
            body: BodySource::default(),
            priority: 0,
            events: tx,
        })
        .await
        .unwrap();
    peer.recv_one().await; // the parent's SYN_STREAM

    spawn_pump(session.clone());

    let push_headers = canonicalize([
        (":host".to_owned(), "example.com:443".to_owned()),
        (":scheme".to_owned(), "https".to_owned()),
        (":path".to_owned(), "/a/style.css".to_owned()),
    ]);
    peer.send(Frame::SynStream(SynStreamFrame {
        stream_id: 2,
        associated_to: 1,
        priority: 0,
        fin: false,
        unidirectional: true,
        headers: push_headers,
    }))
    .await;

    let push = match push_rx.recv().await {
        Some(p) => p,
        None => panic!("push callback channel closed before delivering the push"),
    };
    assert_eq!(push.stream_id, 2);
    assert_eq!(push.associated_to, 1);
    assert_eq!(push.headers.get(":path").unwrap(), &["/a/style.css"]);

    peer.send(Frame::Headers(HeadersFrame {
        stream_id: 2,
        fin: false,
        headers: canonicalize([("content-type".to_owned(), "text/css".to_owned())]),
    }))
    .await;
    peer.send(Frame::Data(DataFrame {
        stream_id: 2,
        fin: true,
        payload: b"body{color:red}".to_vec(),
    }))
    .await;

    peer.send(Frame::SynReply(SynReplyFrame {
        stream_id: 1,
        fin: true,
        headers: canonicalize([
            (":status".to_owned(), "200".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ]),
    }))
    .await;
    match rx.recv().await {
        Some(StreamEvent::Response(_)) => {}
        other => panic!("expected parent stream response, got {other:?}"),
    }
    match rx.recv().await {
        Some(StreamEvent::Finished(_)) => {}
        other => panic!("expected parent stream to finish, got {other:?}"),
    }
    assert_eq!(
        session.lock().await.open_stream_count(),
        0,
        "both the parent and the pushed stream should be gone by now"
    );
}
