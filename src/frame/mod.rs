//! Component A: the frame model, plus the encoder (C) and decoder (D)
//! built on top of it. Grounded on `original_source/SPDY/SPDYFrame.h`'s
//! class hierarchy (one struct per frame type rather than one subclass
//! per frame type, since Rust prefers a closed sum type at this seam) and
//! `other_examples/b157fb4e_cpaika-krust__src-api-spdy_protocol.rs.rs`'s
//! header-bit layout.

pub mod codec;
pub mod flags;

use crate::headers::HeaderBlock;
use flags::{DataFlags, HeadersFlags, SettingsEntryFlags, SettingsFlags, SynReplyFlags, SynStreamFlags};

pub const SPDY_VERSION: u16 = 3;

/// 31-bit stream identifier; the reserved high bit is always zero.
pub type StreamId = u32;

pub const CONTROL_FRAME_HEADER_LEN: usize = 8;
pub const MAX_FRAME_LENGTH: usize = (1 << 24) - 1;
pub const MAX_DATA_PAYLOAD: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameType {
    SynStream = 1,
    SynReply = 2,
    RstStream = 3,
    Settings = 4,
    Ping = 6,
    GoAway = 7,
    Headers = 8,
    WindowUpdate = 9,
}

impl FrameType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => Self::SynStream,
            2 => Self::SynReply,
            3 => Self::RstStream,
            4 => Self::Settings,
            6 => Self::Ping,
            7 => Self::GoAway,
            8 => Self::Headers,
            9 => Self::WindowUpdate,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GoAwayStatus {
    Ok = 0,
    ProtocolError = 1,
    InternalError = 11,
}

impl GoAwayStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Ok,
            1 => Self::ProtocolError,
            11 => Self::InternalError,
            _ => return None,
        })
    }
}

/// Recognized SETTINGS ids (spec §3 "SETTINGS entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, enum_map::Enum)]
#[repr(u32)]
pub enum SettingsId {
    UploadBandwidth = 1,
    DownloadBandwidth = 2,
    RoundTripTime = 3,
    MaxConcurrentStreams = 4,
    CurrentCwnd = 5,
    DownloadRetransRate = 6,
    InitialWindowSize = 7,
    ClientCertificateVectorSize = 8,
}

impl SettingsId {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::UploadBandwidth,
            2 => Self::DownloadBandwidth,
            3 => Self::RoundTripTime,
            4 => Self::MaxConcurrentStreams,
            5 => Self::CurrentCwnd,
            6 => Self::DownloadRetransRate,
            7 => Self::InitialWindowSize,
            8 => Self::ClientCertificateVectorSize,
            _ => return None,
        })
    }

    pub fn wire_id(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsEntry {
    pub id: SettingsId,
    pub flags: SettingsEntryFlags,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStreamFrame {
    pub stream_id: StreamId,
    pub associated_to: StreamId,
    pub priority: u8,
    pub fin: bool,
    pub unidirectional: bool,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub status: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub clear_settings: bool,
    pub entries: Vec<SettingsEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_good_stream_id: StreamId,
    pub status: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    pub fin: bool,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub delta: u32,
}

/// The tagged frame model (component A). One variant per SPDY/3.1 frame
/// type; DATA is the only non-control frame so it gets the clear-bit
/// header layout, the rest carry the control-bit layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    Headers(HeadersFrame),
    WindowUpdate(WindowUpdateFrame),
}

impl Frame {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data(f) => f.stream_id,
            Frame::SynStream(f) => f.stream_id,
            Frame::SynReply(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::Settings(_) => 0,
            Frame::Ping(_) => 0,
            Frame::GoAway(_) => 0,
            Frame::Headers(f) => f.stream_id,
            Frame::WindowUpdate(f) => f.stream_id,
        }
    }

    pub fn is_fin(&self) -> bool {
        match self {
            Frame::Data(f) => f.fin,
            Frame::SynStream(f) => f.fin,
            Frame::SynReply(f) => f.fin,
            Frame::Headers(f) => f.fin,
            _ => false,
        }
    }
}

pub(crate) fn data_flags(fin: bool) -> DataFlags {
    if fin {
        DataFlags::FIN
    } else {
        DataFlags::empty()
    }
}

pub(crate) fn syn_stream_flags(fin: bool, unidirectional: bool) -> SynStreamFlags {
    let mut flags = SynStreamFlags::empty();
    if fin {
        flags |= SynStreamFlags::FIN;
    }
    if unidirectional {
        flags |= SynStreamFlags::UNIDIRECTIONAL;
    }
    flags
}

pub(crate) fn syn_reply_flags(fin: bool) -> SynReplyFlags {
    if fin {
        SynReplyFlags::FIN
    } else {
        SynReplyFlags::empty()
    }
}

pub(crate) fn headers_flags(fin: bool) -> HeadersFlags {
    if fin {
        HeadersFlags::FIN
    } else {
        HeadersFlags::empty()
    }
}

pub(crate) fn settings_flags(clear: bool) -> SettingsFlags {
    if clear {
        SettingsFlags::CLEAR_SETTINGS
    } else {
        SettingsFlags::empty()
    }
}
