//! Assembles a [`crate::session::StreamEvent`] stream back into a single
//! response, the shape the teacher's one-shot `Response` exposes
//! (`status()`/`header()`), generalized to SPDY's streaming body chunks.

use crate::error::Error;
use crate::headers::HeaderBlock;
use crate::metadata::Metadata;
use crate::session::StreamEvent;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone)]
pub struct Response {
    pub headers: HeaderBlock,
    pub body: Bytes,
    pub metadata: Metadata,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn status(&self) -> Option<u16> {
        self.header(":status").and_then(|s| s.split(' ').next()).and_then(|s| s.parse().ok())
    }
}

/// Drains a stream's event channel to completion, the single-shot
/// counterpart to the raw streaming delegate contract (spec §6).
pub async fn collect(mut events: UnboundedReceiver<StreamEvent>) -> Result<Response, Error> {
    let mut headers = HeaderBlock::new();
    let mut body = BytesMut::new();
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Response(h) => headers = h,
            StreamEvent::BodyChunk(chunk) => body.extend_from_slice(&chunk),
            StreamEvent::Finished(metadata) => {
                return Ok(Response {
                    headers,
                    body: body.freeze(),
                    metadata,
                })
            }
            StreamEvent::Failed(err, _metadata) => return Err(err),
        }
    }
    Err(Error::Other("stream closed without a terminal event".to_owned()))
}
