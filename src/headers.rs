//! Header-block representation and canonicalization shared by the
//! compressor, the frame codec, and request construction.

use std::collections::BTreeMap;

/// A decoded header block: lowercase name -> ordered list of values.
/// Multiple values are joined with a single NUL byte on the wire
/// (spec §4.B, §6).
pub type HeaderBlock = BTreeMap<String, Vec<String>>;

pub const REQUIRED_REQUEST_PSEUDO_HEADERS: &[&str] =
    &[":method", ":scheme", ":path", ":host", ":version"];

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "host",
];

/// Lower-cases names, drops hop-by-hop headers (`Host` is replaced by
/// `:host` separately), and folds repeated headers into one multi-valued
/// entry. Grounded on spec §6 "Required headers on a client SYN_STREAM".
pub fn canonicalize(pairs: impl IntoIterator<Item = (String, String)>) -> HeaderBlock {
    let mut block = HeaderBlock::new();
    for (name, value) in pairs {
        let name = name.to_ascii_lowercase();
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        block.entry(name).or_default().push(value);
    }
    block
}

/// Checks that a block built for an outbound client SYN_STREAM carries
/// every required pseudo-header (spec §3 Stream invariants).
pub fn missing_required_headers(block: &HeaderBlock) -> Vec<&'static str> {
    REQUIRED_REQUEST_PSEUDO_HEADERS
        .iter()
        .copied()
        .filter(|name| !block.contains_key(*name))
        .collect()
}
