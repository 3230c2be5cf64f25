//! Stateful zlib header-block compressor (component B).
//!
//! One `Compress`/`Decompress` pair per session direction, each
//! initialized with the fixed SPDY dictionary (`dictionary.rs`) and kept
//! alive for the life of the session: SPDY relies on cross-frame deflate
//! state to get useful compression out of small, repetitive header
//! blocks. Grounded on `original_source/SPDY/SPDYHeaderBlockCompressor.h`;
//! the wire format for the plaintext is spec §4.B.

use crate::dictionary::SPDY_DICTIONARY;
use crate::error::CodecError;
use crate::headers::HeaderBlock;
use bytes::Bytes;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

/// Uncompressed header-block plaintext must not exceed this many bytes
/// (spec §4.B: 16 KiB - 12).
pub const MAX_UNCOMPRESSED_HEADER_BLOCK: usize = 16 * 1024 - 12;

fn bad_encode(msg: impl Into<String>) -> CodecError {
    CodecError::HeaderBlockEncodingError(msg.into())
}

fn bad_decode(msg: impl Into<String>) -> CodecError {
    CodecError::HeaderBlockDecodingError(msg.into())
}

pub struct HeaderCompressor {
    deflate: Compress,
    inflate: Decompress,
}

impl HeaderCompressor {
    /// `level` is a zlib compression level 0-9; 0 disables compression
    /// via `Z_NO_COMPRESSION` but framing overhead is unchanged.
    pub fn new(level: u32) -> Self {
        let mut deflate = Compress::new(Compression::new(level.min(9)), true);
        deflate
            .set_dictionary(SPDY_DICTIONARY)
            .expect("zlib backend supports preset dictionaries");
        let inflate = Decompress::new(true);
        Self { deflate, inflate }
    }

    pub fn encode(&mut self, headers: &HeaderBlock) -> Result<Bytes, CodecError> {
        let plaintext = encode_plaintext(headers)?;
        if plaintext.len() > MAX_UNCOMPRESSED_HEADER_BLOCK {
            return Err(bad_encode(format!(
                "uncompressed header block is {} bytes, limit is {}",
                plaintext.len(),
                MAX_UNCOMPRESSED_HEADER_BLOCK
            )));
        }
        let mut out = Vec::with_capacity(plaintext.len() + 32);
        self.deflate
            .compress_vec(&plaintext, &mut out, FlushCompress::Sync)
            .map_err(|e| bad_encode(e.to_string()))?;
        Ok(Bytes::from(out))
    }

    pub fn decode(&mut self, compressed: &[u8]) -> Result<HeaderBlock, CodecError> {
        let mut plaintext = Vec::with_capacity(compressed.len() * 4 + 64);
        loop {
            match self
                .inflate
                .decompress_vec(compressed, &mut plaintext, FlushDecompress::Sync)
            {
                Ok(_status) => break,
                Err(err) => {
                    if err.needs_dictionary().is_some() {
                        self.inflate
                            .set_dictionary(SPDY_DICTIONARY)
                            .map_err(|e| bad_decode(e.to_string()))?;
                        continue;
                    }
                    return Err(bad_decode(err.to_string()));
                }
            }
        }
        if plaintext.len() > MAX_UNCOMPRESSED_HEADER_BLOCK {
            return Err(bad_decode(
                "uncompressed header block exceeds 16 KiB - 12 bytes",
            ));
        }
        decode_plaintext(&plaintext)
    }
}

fn encode_plaintext(headers: &HeaderBlock) -> Result<Vec<u8>, CodecError> {
    for (name, values) in headers {
        if name.is_empty() || name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(bad_encode(format!(
                "header name {name:?} must be non-empty and lowercase"
            )));
        }
        if values.is_empty() || values.iter().any(|v| v.is_empty()) {
            return Err(bad_encode(format!("header {name:?} has an empty value")));
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(&(headers.len() as u32).to_be_bytes());
    for (name, values) in headers {
        let value = values.join("\0");
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(value.len() as u32).to_be_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    Ok(out)
}

fn decode_plaintext(buf: &[u8]) -> Result<HeaderBlock, CodecError> {
    let mut cursor = buf;
    let count = take_u32(&mut cursor).ok_or_else(|| bad_decode("truncated header count"))?;
    let mut headers = HeaderBlock::new();
    for _ in 0..count {
        let name_len =
            take_u32(&mut cursor).ok_or_else(|| bad_decode("truncated name length"))? as usize;
        let name = take_bytes(&mut cursor, name_len).ok_or_else(|| bad_decode("truncated name"))?;
        let name = String::from_utf8(name.to_vec()).map_err(|_| bad_decode("name is not utf-8"))?;
        let value_len =
            take_u32(&mut cursor).ok_or_else(|| bad_decode("truncated value length"))? as usize;
        let value =
            take_bytes(&mut cursor, value_len).ok_or_else(|| bad_decode("truncated value"))?;
        let value =
            String::from_utf8(value.to_vec()).map_err(|_| bad_decode("value is not utf-8"))?;
        let values = value.split('\0').map(str::to_owned).collect();
        if headers.insert(name.clone(), values).is_some() {
            return Err(bad_decode(format!("duplicate header {name:?}")));
        }
    }
    Ok(headers)
}

fn take_u32(cursor: &mut &[u8]) -> Option<u32> {
    if cursor.len() < 4 {
        return None;
    }
    let (head, tail) = cursor.split_at(4);
    *cursor = tail;
    Some(u32::from_be_bytes(head.try_into().unwrap()))
}

fn take_bytes<'a>(cursor: &mut &'a [u8], len: usize) -> Option<&'a [u8]> {
    if cursor.len() < len {
        return None;
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Some(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::canonicalize;

    #[test]
    fn round_trips_through_encoder_and_decoder() {
        let mut encoder = HeaderCompressor::new(9);
        let mut decoder = HeaderCompressor::new(9);

        let headers = canonicalize([
            (":method".to_owned(), "GET".to_owned()),
            (":scheme".to_owned(), "https".to_owned()),
            (":path".to_owned(), "/a".to_owned()),
            (":host".to_owned(), "example.com".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ]);

        let compressed = encoder.encode(&headers).unwrap();
        let decoded = decoder.decode(&compressed).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn state_persists_across_frames() {
        let mut encoder = HeaderCompressor::new(9);
        let mut decoder = HeaderCompressor::new(9);

        let mut headers = canonicalize([
            (":method".to_owned(), "GET".to_owned()),
            (":scheme".to_owned(), "https".to_owned()),
            (":path".to_owned(), "/a".to_owned()),
            (":host".to_owned(), "example.com".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ]);
        let first = encoder.encode(&headers).unwrap();
        assert_eq!(decoder.decode(&first).unwrap(), headers);

        headers.insert(":path".to_owned(), vec!["/b".to_owned()]);
        let second = encoder.encode(&headers).unwrap();
        assert_eq!(decoder.decode(&second).unwrap(), headers);
        // Repeating headers against live deflate state should compress well.
        assert!(second.len() < first.len() + 8);
    }

    #[test]
    fn rejects_uppercase_names() {
        let mut encoder = HeaderCompressor::new(9);
        let mut headers = HeaderBlock::new();
        headers.insert("Content-Type".to_owned(), vec!["text/plain".to_owned()]);
        assert!(encoder.encode(&headers).is_err());
    }

    #[test]
    fn fifty_varied_header_fields_round_trip() {
        let mut encoder = HeaderCompressor::new(6);
        let mut decoder = HeaderCompressor::new(6);

        let mut pairs = vec![
            (":method".to_owned(), "POST".to_owned()),
            (":scheme".to_owned(), "https".to_owned()),
            (":path".to_owned(), "/upload".to_owned()),
            (":host".to_owned(), "example.com".to_owned()),
            (":version".to_owned(), "HTTP/1.1".to_owned()),
        ];
        for i in 0..45 {
            pairs.push((format!("x-custom-{i}"), "a".repeat(i % 37 + 1)));
        }
        let headers = canonicalize(pairs);

        let compressed = encoder.encode(&headers).unwrap();
        let decoded = decoder.decode(&compressed).unwrap();
        assert_eq!(decoded, headers);
    }
}
