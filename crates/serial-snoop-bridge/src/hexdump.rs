//! Hex and printable-ASCII rendering of frames

use std::fmt::Write;

/// Bytes rendered before truncating
pub const DEFAULT_MAX_DUMP_BYTES: usize = 256;

/// Uppercase hex pairs separated by single spaces
///
/// Renders at most `max_bytes` bytes; longer input gets a `" ..."` suffix.
pub fn to_hex(data: &[u8], max_bytes: usize) -> String {
    let shown = &data[..data.len().min(max_bytes)];
    let mut out = String::with_capacity(shown.len() * 3 + 4);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    if data.len() > max_bytes {
        out.push_str(" ...");
    }
    out
}

/// Printable ASCII (32..=126) as-is, everything else as `.`
///
/// Renders at most `max_bytes` bytes; longer input gets a `"..."` suffix.
pub fn to_ascii(data: &[u8], max_bytes: usize) -> String {
    let shown = &data[..data.len().min(max_bytes)];
    let mut out: String = shown
        .iter()
        .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
        .collect();
    if data.len() > max_bytes {
        out.push_str("...");
    }
    out
}
