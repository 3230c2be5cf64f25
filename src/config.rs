//! Per-client configuration, copied at session-open time.
//!
//! Grounded on `original_source/SPDY/SPDYProtocol.h`'s `SPDYConfiguration`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Configuration {
    /// Number of parallel sessions to keep open per origin. Default 1;
    /// strongly recommended not to exceed 2 (spec §4.H).
    pub session_pool_size: usize,

    /// Initial session-level flow-control receive window.
    pub session_receive_window: u32,

    /// Initial per-stream flow-control receive window.
    pub stream_receive_window: u32,

    /// zlib compression level for header blocks, 0-9. 0 disables
    /// compression (still zlib-framed, just `Z_NO_COMPRESSION`).
    pub header_compression_level: u32,

    /// Whether to advertise a minor protocol version in SETTINGS id 0.
    pub enable_settings_minor_version: bool,

    /// TCP connect timeout. Negative/`None` disables the timeout.
    pub connect_timeout: Option<Duration>,

    /// Upper bound on REFUSED_STREAM / past-GOAWAY retries before
    /// surfacing the error to the caller (spec §4.H, §9 Open Question).
    pub max_refused_stream_retries: u32,

    /// Interval between keepalive PINGs. `None` disables the health check.
    pub ping_interval: Option<Duration>,

    /// How long to wait for a PING echo before closing the session.
    pub ping_timeout: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            session_pool_size: 1,
            session_receive_window: 10 * 1024 * 1024,
            stream_receive_window: 10 * 1024 * 1024,
            header_compression_level: 9,
            enable_settings_minor_version: true,
            connect_timeout: Some(Duration::from_secs(60)),
            max_refused_stream_retries: 3,
            ping_interval: None,
            ping_timeout: Duration::from_secs(10),
        }
    }
}
