//! Error taxonomy for the core: stream-scoped, session-fatal, codec, and
//! transport errors, mirroring SPDY/3.1's RST_STREAM and GOAWAY status
//! codes (`original_source/SPDY/SPDYError.h`).

use thiserror::Error;

/// Mirrors the status codes carried in a `RST_STREAM` frame. Only this
/// stream is affected; the session continues.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("protocol error")]
    ProtocolError,
    #[error("invalid stream")]
    InvalidStream,
    #[error("refused stream")]
    RefusedStream,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("cancel")]
    Cancel,
    #[error("internal error")]
    InternalError,
    #[error("flow control error")]
    FlowControlError,
    #[error("stream in use")]
    StreamInUse,
    #[error("stream already closed")]
    StreamAlreadyClosed,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("frame too large")]
    FrameTooLarge,
}

impl StreamError {
    /// Wire value carried in a RST_STREAM frame's status field.
    pub fn status_code(self) -> u32 {
        match self {
            Self::ProtocolError => 1,
            Self::InvalidStream => 2,
            Self::RefusedStream => 3,
            Self::UnsupportedVersion => 4,
            Self::Cancel => 5,
            Self::InternalError => 6,
            Self::FlowControlError => 7,
            Self::StreamInUse => 8,
            Self::StreamAlreadyClosed => 9,
            Self::InvalidCredentials => 10,
            Self::FrameTooLarge => 11,
        }
    }

    pub fn from_status_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::ProtocolError,
            2 => Self::InvalidStream,
            3 => Self::RefusedStream,
            4 => Self::UnsupportedVersion,
            5 => Self::Cancel,
            6 => Self::InternalError,
            7 => Self::FlowControlError,
            8 => Self::StreamInUse,
            9 => Self::StreamAlreadyClosed,
            10 => Self::InvalidCredentials,
            11 => Self::FrameTooLarge,
            _ => return None,
        })
    }
}

/// Fatal to the whole session; maps to a GOAWAY status code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("protocol error")]
    ProtocolError,
    #[error("internal error")]
    InternalError,
}

impl SessionError {
    pub fn goaway_status(self) -> u32 {
        match self {
            // Values from the SPDY/3.1 draft's GOAWAY status code table.
            Self::ProtocolError => 1,
            Self::InternalError => 11,
        }
    }
}

#[derive(Error, Debug)]
pub enum FrameDecodeError {
    #[error("unsupported SPDY version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown control frame type {0}")]
    UnknownType(u16),
    #[error("payload shorter than declared length")]
    PayloadTooShort,
    #[error("unexpected zero stream id")]
    ZeroStreamId,
    #[error("unexpected zero window increment")]
    ZeroWindowIncrement,
    #[error("malformed settings entry")]
    MalformedSettings,
    #[error("settings entry ids must be strictly increasing")]
    SettingsNotIncreasing,
    #[error("unknown status code {0}")]
    UnknownStatus(u32),
}

/// Codec errors are promoted to `SessionError::InternalError` when they
/// occur mid-framing (spec §7).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("header block encoding error: {0}")]
    HeaderBlockEncodingError(String),
    #[error("header block decoding error: {0}")]
    HeaderBlockDecodingError(String),
    #[error(transparent)]
    Frame(#[from] FrameDecodeError),
}

impl From<CodecError> for SessionError {
    fn from(_: CodecError) -> Self {
        SessionError::InternalError
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect timeout")]
    ConnectTimeout,
    #[error("read timeout")]
    ReadTimeout,
    #[error("write timeout")]
    WriteTimeout,
    #[error("TLS verification failed")]
    TlsVerificationFailed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Equivalent to a session error with no GOAWAY possible (spec §7).
impl From<TransportError> for SessionError {
    fn from(_: TransportError) -> Self {
        SessionError::InternalError
    }
}

/// Top-level, user-visible failure domain. Every terminated stream yields
/// either a completion or one of these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Other(String),
}
