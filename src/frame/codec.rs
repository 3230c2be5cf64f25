//! Components C and D: frame encoder and resumable frame decoder.

use super::flags::{DataFlags, HeadersFlags, SettingsEntryFlags, SynReplyFlags, SynStreamFlags};
use super::{
    data_flags, headers_flags, settings_flags, syn_reply_flags, syn_stream_flags, DataFrame,
    Frame, FrameType, GoAwayFrame, HeadersFrame, PingFrame, RstStreamFrame, SettingsEntry,
    SettingsFrame, SettingsId, SynReplyFrame, SynStreamFrame, WindowUpdateFrame,
    CONTROL_FRAME_HEADER_LEN, MAX_FRAME_LENGTH, SPDY_VERSION,
};
use crate::compressor::HeaderCompressor;
use crate::error::{CodecError, FrameDecodeError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Serializes [`Frame`] values to bytes, compressing header blocks with a
/// caller-owned [`HeaderCompressor`] (one per session direction, spec
/// §4.C). Stateless beyond that borrowed compressor.
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(
        &self,
        frame: &Frame,
        compressor: &mut HeaderCompressor,
    ) -> Result<Bytes, CodecError> {
        let mut out = BytesMut::new();
        match frame {
            Frame::Data(f) => encode_data(&mut out, f),
            Frame::SynStream(f) => encode_syn_stream(&mut out, f, compressor)?,
            Frame::SynReply(f) => encode_syn_reply(&mut out, f, compressor)?,
            Frame::RstStream(f) => encode_rst_stream(&mut out, f),
            Frame::Settings(f) => encode_settings(&mut out, f),
            Frame::Ping(f) => encode_ping(&mut out, f),
            Frame::GoAway(f) => encode_goaway(&mut out, f),
            Frame::Headers(f) => encode_headers(&mut out, f, compressor)?,
            Frame::WindowUpdate(f) => encode_window_update(&mut out, f),
        }
        Ok(out.freeze())
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn control_header(out: &mut BytesMut, frame_type: FrameType, flags: u8, length: usize) {
    out.put_u16(0x8000 | SPDY_VERSION);
    out.put_u16(frame_type as u16);
    out.put_u8(flags);
    put_u24(out, length as u32);
}

fn put_u24(out: &mut BytesMut, value: u32) {
    out.put_u8((value >> 16) as u8);
    out.put_u8((value >> 8) as u8);
    out.put_u8(value as u8);
}

fn encode_data(out: &mut BytesMut, frame: &DataFrame) {
    out.put_u32(frame.stream_id & 0x7fff_ffff);
    out.put_u8(data_flags(frame.fin).bits());
    put_u24(out, frame.payload.len() as u32);
    out.extend_from_slice(&frame.payload);
}

fn encode_syn_stream(
    out: &mut BytesMut,
    frame: &SynStreamFrame,
    compressor: &mut HeaderCompressor,
) -> Result<(), CodecError> {
    let block = compressor.encode(&frame.headers)?;
    let payload_len = 10 + block.len();
    control_header(
        out,
        FrameType::SynStream,
        syn_stream_flags(frame.fin, frame.unidirectional).bits(),
        payload_len,
    );
    out.put_u32(frame.stream_id & 0x7fff_ffff);
    out.put_u32(frame.associated_to & 0x7fff_ffff);
    out.put_u8((frame.priority & 0x07) << 5);
    out.put_u8(0); // slot, unused
    out.extend_from_slice(&block);
    Ok(())
}

fn encode_syn_reply(
    out: &mut BytesMut,
    frame: &SynReplyFrame,
    compressor: &mut HeaderCompressor,
) -> Result<(), CodecError> {
    let block = compressor.encode(&frame.headers)?;
    let payload_len = 4 + block.len();
    control_header(
        out,
        FrameType::SynReply,
        syn_reply_flags(frame.fin).bits(),
        payload_len,
    );
    out.put_u32(frame.stream_id & 0x7fff_ffff);
    out.extend_from_slice(&block);
    Ok(())
}

fn encode_rst_stream(out: &mut BytesMut, frame: &RstStreamFrame) {
    control_header(out, FrameType::RstStream, 0, 8);
    out.put_u32(frame.stream_id & 0x7fff_ffff);
    out.put_u32(frame.status);
}

fn encode_settings(out: &mut BytesMut, frame: &SettingsFrame) {
    let payload_len = 4 + frame.entries.len() * 8;
    control_header(
        out,
        FrameType::Settings,
        settings_flags(frame.clear_settings).bits(),
        payload_len,
    );
    out.put_u32(frame.entries.len() as u32);
    for entry in &frame.entries {
        out.put_u8(entry.flags.bits());
        put_u24(out, entry.id.wire_id());
        out.put_u32(entry.value);
    }
}

fn encode_ping(out: &mut BytesMut, frame: &PingFrame) {
    control_header(out, FrameType::Ping, 0, 4);
    out.put_u32(frame.id);
}

fn encode_goaway(out: &mut BytesMut, frame: &GoAwayFrame) {
    control_header(out, FrameType::GoAway, 0, 8);
    out.put_u32(frame.last_good_stream_id & 0x7fff_ffff);
    out.put_u32(frame.status);
}

fn encode_headers(
    out: &mut BytesMut,
    frame: &HeadersFrame,
    compressor: &mut HeaderCompressor,
) -> Result<(), CodecError> {
    let block = compressor.encode(&frame.headers)?;
    let payload_len = 4 + block.len();
    control_header(
        out,
        FrameType::Headers,
        headers_flags(frame.fin).bits(),
        payload_len,
    );
    out.put_u32(frame.stream_id & 0x7fff_ffff);
    out.extend_from_slice(&block);
    Ok(())
}

fn encode_window_update(out: &mut BytesMut, frame: &WindowUpdateFrame) {
    control_header(out, FrameType::WindowUpdate, 0, 8);
    out.put_u32(frame.stream_id & 0x7fff_ffff);
    out.put_u32(frame.delta & 0x7fff_ffff);
}

#[derive(Debug, Clone, Copy)]
struct CommonHeader {
    control: bool,
    version: u16,
    frame_type_or_stream_id: u32,
    flags: u8,
    length: usize,
}

/// A resumable byte-stream parser (spec §4.D). Owns no socket; the caller
/// feeds it arbitrary chunks via [`FrameDecoder::decode`] and it reports
/// how many bytes were consumed, draining zero or more complete frames.
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Feeds `input` into the internal buffer and parses as many complete
    /// frames as are available, invoking `compressor` to inflate any
    /// header-bearing frame's block. Returns the parsed frames in arrival
    /// order; an incomplete trailing frame's bytes stay buffered for the
    /// next call.
    pub fn decode(
        &mut self,
        input: &[u8],
        compressor: &mut HeaderCompressor,
    ) -> Result<Vec<Frame>, CodecError> {
        self.buf.extend_from_slice(input);
        let mut frames = Vec::new();
        loop {
            match self.try_parse_one(compressor)? {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        Ok(frames)
    }

    fn try_parse_one(
        &mut self,
        compressor: &mut HeaderCompressor,
    ) -> Result<Option<Frame>, CodecError> {
        if self.buf.len() < CONTROL_FRAME_HEADER_LEN {
            return Ok(None);
        }
        let header = peek_header(&self.buf);
        if header.length > MAX_FRAME_LENGTH {
            return Err(FrameDecodeError::PayloadTooShort.into());
        }
        let total = CONTROL_FRAME_HEADER_LEN + header.length;
        if self.buf.len() < total {
            return Ok(None);
        }

        self.buf.advance(CONTROL_FRAME_HEADER_LEN);
        let payload = self.buf.split_to(header.length);

        if !header.control {
            let stream_id = header.frame_type_or_stream_id & 0x7fff_ffff;
            return Ok(Some(Frame::Data(DataFrame {
                stream_id,
                fin: header.flags & DataFlags::FIN.bits() != 0,
                payload: payload.to_vec(),
            })));
        }

        if header.version != SPDY_VERSION {
            return Err(FrameDecodeError::UnsupportedVersion(header.version).into());
        }
        let frame_type = match FrameType::from_u16(header.frame_type_or_stream_id as u16) {
            Some(t) => t,
            // Unknown control frame types are ignored per spec, skipped by length.
            None => return self.try_parse_one(compressor),
        };

        let frame = match frame_type {
            FrameType::SynStream => {
                Frame::SynStream(decode_syn_stream(&payload, header.flags, compressor)?)
            }
            FrameType::SynReply => {
                Frame::SynReply(decode_syn_reply(&payload, header.flags, compressor)?)
            }
            FrameType::RstStream => Frame::RstStream(decode_rst_stream(&payload)?),
            FrameType::Settings => {
                let mut settings = decode_settings(&payload)?;
                settings.clear_settings = header.flags & super::flags::SettingsFlags::CLEAR_SETTINGS.bits() != 0;
                Frame::Settings(settings)
            }
            FrameType::Ping => Frame::Ping(decode_ping(&payload)?),
            FrameType::GoAway => Frame::GoAway(decode_goaway(&payload)?),
            FrameType::Headers => Frame::Headers(decode_headers(&payload, header.flags, compressor)?),
            FrameType::WindowUpdate => Frame::WindowUpdate(decode_window_update(&payload)?),
        };
        Ok(Some(frame))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn peek_header(buf: &BytesMut) -> CommonHeader {
    let first = u16::from_be_bytes([buf[0], buf[1]]);
    let control = first & 0x8000 != 0;
    let version = first & 0x7fff;
    let frame_type_or_stream_id = if control {
        u16::from_be_bytes([buf[2], buf[3]]) as u32
    } else {
        u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) & 0x7fff_ffff
    };
    let flags = buf[4];
    let length = ((buf[5] as u32) << 16 | (buf[6] as u32) << 8 | buf[7] as u32) as usize;
    CommonHeader {
        control,
        version,
        frame_type_or_stream_id,
        flags,
        length,
    }
}

fn require(buf: &[u8], len: usize) -> Result<(), FrameDecodeError> {
    if buf.len() < len {
        Err(FrameDecodeError::PayloadTooShort)
    } else {
        Ok(())
    }
}

fn decode_syn_stream(
    payload: &[u8],
    flags: u8,
    compressor: &mut HeaderCompressor,
) -> Result<SynStreamFrame, CodecError> {
    require(payload, 10)?;
    let stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
    if stream_id == 0 {
        return Err(FrameDecodeError::ZeroStreamId.into());
    }
    let associated_to = u32::from_be_bytes(payload[4..8].try_into().unwrap()) & 0x7fff_ffff;
    let priority = payload[8] >> 5;
    let headers = compressor.decode(&payload[10..])?;
    Ok(SynStreamFrame {
        stream_id,
        associated_to,
        priority,
        fin: flags & SynStreamFlags::FIN.bits() != 0,
        unidirectional: flags & SynStreamFlags::UNIDIRECTIONAL.bits() != 0,
        headers,
    })
}

fn decode_syn_reply(
    payload: &[u8],
    flags: u8,
    compressor: &mut HeaderCompressor,
) -> Result<SynReplyFrame, CodecError> {
    require(payload, 4)?;
    let stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
    if stream_id == 0 {
        return Err(FrameDecodeError::ZeroStreamId.into());
    }
    let headers = compressor.decode(&payload[4..])?;
    Ok(SynReplyFrame {
        stream_id,
        fin: flags & SynReplyFlags::FIN.bits() != 0,
        headers,
    })
}

fn decode_rst_stream(payload: &[u8]) -> Result<RstStreamFrame, CodecError> {
    require(payload, 8)?;
    let stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
    let status = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    Ok(RstStreamFrame { stream_id, status })
}

fn decode_settings(payload: &[u8]) -> Result<SettingsFrame, CodecError> {
    require(payload, 4)?;
    let count = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as usize;
    let rest = &payload[4..];
    if rest.len() != count * 8 {
        return Err(FrameDecodeError::MalformedSettings.into());
    }
    let mut entries = Vec::with_capacity(count);
    let mut last_id: Option<u32> = None;
    for chunk in rest.chunks_exact(8) {
        let flags = chunk[0];
        let id = (chunk[1] as u32) << 16 | (chunk[2] as u32) << 8 | chunk[3] as u32;
        let value = u32::from_be_bytes(chunk[4..8].try_into().unwrap());
        if let Some(prev) = last_id {
            if id <= prev {
                return Err(FrameDecodeError::SettingsNotIncreasing.into());
            }
        }
        last_id = Some(id);
        let Some(id) = SettingsId::from_u32(id) else {
            continue; // unrecognized ids are skipped, not fatal
        };
        entries.push(SettingsEntry {
            id,
            flags: SettingsEntryFlags::from_bits_truncate(flags),
            value,
        });
    }
    Ok(SettingsFrame {
        clear_settings: false, // filled in by the caller from the frame-level flags byte
        entries,
    })
}

fn decode_ping(payload: &[u8]) -> Result<PingFrame, CodecError> {
    require(payload, 4)?;
    Ok(PingFrame {
        id: u32::from_be_bytes(payload[0..4].try_into().unwrap()),
    })
}

fn decode_goaway(payload: &[u8]) -> Result<GoAwayFrame, CodecError> {
    require(payload, 8)?;
    let last_good_stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
    let status = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    Ok(GoAwayFrame {
        last_good_stream_id,
        status,
    })
}

fn decode_headers(
    payload: &[u8],
    flags: u8,
    compressor: &mut HeaderCompressor,
) -> Result<HeadersFrame, CodecError> {
    require(payload, 4)?;
    let stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
    if stream_id == 0 {
        return Err(FrameDecodeError::ZeroStreamId.into());
    }
    let headers = compressor.decode(&payload[4..])?;
    Ok(HeadersFrame {
        stream_id,
        fin: flags & HeadersFlags::FIN.bits() != 0,
        headers,
    })
}

fn decode_window_update(payload: &[u8]) -> Result<WindowUpdateFrame, CodecError> {
    require(payload, 8)?;
    let stream_id = u32::from_be_bytes(payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
    let delta = u32::from_be_bytes(payload[4..8].try_into().unwrap()) & 0x7fff_ffff;
    if delta == 0 {
        return Err(FrameDecodeError::ZeroWindowIncrement.into());
    }
    Ok(WindowUpdateFrame { stream_id, delta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::canonicalize;

    fn round_trip(frame: Frame) {
        let mut enc_compressor = HeaderCompressor::new(9);
        let mut dec_compressor = HeaderCompressor::new(9);
        let encoder = FrameEncoder::new();
        let mut decoder = FrameDecoder::new();

        let bytes = encoder.encode(&frame, &mut enc_compressor).unwrap();
        let mut parsed = decoder.decode(&bytes, &mut dec_compressor).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.remove(0), frame);
    }

    #[test]
    fn data_frame_round_trips_at_representative_sizes() {
        for len in [0usize, 1, 1023, 8192, 16371] {
            let frame = Frame::Data(DataFrame {
                stream_id: 1,
                fin: len % 2 == 0,
                payload: vec![0xAB; len],
            });
            round_trip(frame);
        }
    }

    #[test]
    fn syn_stream_round_trips() {
        let headers = canonicalize([
            (":method".to_owned(), "GET".to_owned()),
            (":scheme".to_owned(), "https".to_owned()),
            (":path".to_owned(), "/a".to_owned()),
            (":host".to_owned(), "example.com".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ]);
        round_trip(Frame::SynStream(SynStreamFrame {
            stream_id: 1,
            associated_to: 0,
            priority: 3,
            fin: true,
            unidirectional: false,
            headers,
        }));
    }

    #[test]
    fn syn_reply_round_trips() {
        let headers = canonicalize([
            (":status".to_owned(), "200".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ]);
        round_trip(Frame::SynReply(SynReplyFrame {
            stream_id: 1,
            fin: false,
            headers,
        }));
    }

    #[test]
    fn rst_stream_round_trips() {
        round_trip(Frame::RstStream(RstStreamFrame {
            stream_id: 3,
            status: 3,
        }));
    }

    #[test]
    fn settings_round_trips() {
        round_trip(Frame::Settings(SettingsFrame {
            clear_settings: true,
            entries: vec![SettingsEntry {
                id: SettingsId::InitialWindowSize,
                flags: SettingsEntryFlags::PERSIST_VALUE,
                value: 32768,
            }],
        }));
    }

    #[test]
    fn ping_round_trips() {
        round_trip(Frame::Ping(PingFrame { id: 7 }));
    }

    #[test]
    fn goaway_round_trips() {
        round_trip(Frame::GoAway(GoAwayFrame {
            last_good_stream_id: 5,
            status: 0,
        }));
    }

    #[test]
    fn headers_round_trips() {
        let headers = canonicalize([("x-extra".to_owned(), "1".to_owned())]);
        round_trip(Frame::Headers(HeadersFrame {
            stream_id: 1,
            fin: true,
            headers,
        }));
    }

    #[test]
    fn window_update_round_trips() {
        round_trip(Frame::WindowUpdate(WindowUpdateFrame {
            stream_id: 1,
            delta: 8192,
        }));
    }

    #[test]
    fn settings_entries_must_be_strictly_increasing() {
        let mut bytes = BytesMut::new();
        control_header(&mut bytes, FrameType::Settings, 0, 4 + 16);
        bytes.put_u32(2);
        bytes.put_u8(0);
        put_u24(&mut bytes, 3);
        bytes.put_u32(1);
        bytes.put_u8(0);
        put_u24(&mut bytes, 2);
        bytes.put_u32(1);

        let mut decoder = FrameDecoder::new();
        let mut compressor = HeaderCompressor::new(9);
        let err = decoder.decode(&bytes, &mut compressor).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Frame(FrameDecodeError::SettingsNotIncreasing)
        ));
    }

    #[test]
    fn decoder_buffers_a_partial_frame() {
        let frame = Frame::Ping(PingFrame { id: 42 });
        let mut compressor = HeaderCompressor::new(9);
        let encoder = FrameEncoder::new();
        let bytes = encoder.encode(&frame, &mut compressor).unwrap();

        let mut decoder = FrameDecoder::new();
        let first_half = &bytes[..5];
        let second_half = &bytes[5..];
        assert!(decoder.decode(first_half, &mut compressor).unwrap().is_empty());
        let frames = decoder.decode(second_half, &mut compressor).unwrap();
        assert_eq!(frames, vec![frame]);
    }
}
