//! Field helpers shared by the per-characteristic parsers.
//!
//! Everything on the wire is big-endian except the radar timing block's
//! `baseMinutes`, which the phone app writes little-endian. Callers slice
//! fixed-size records before reaching these helpers, so the offsets are
//! always in range.

use crate::app::ports::AssetName;

pub fn be_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

pub fn be_i16(raw: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([raw[at], raw[at + 1]])
}

pub fn be_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

pub fn le_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

/// Decode a NUL-padded fixed-width text field.
///
/// Stops at the first NUL and keeps the longest valid UTF-8 prefix, so a
/// field truncated mid-character by the phone still shows something.
pub fn fixed_str<const N: usize>(raw: &[u8]) -> heapless::String<N> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let bytes = &raw[..end.min(N)];
    let text = match core::str::from_utf8(bytes) {
        Ok(s) => s,
        // valid_up_to() is a char boundary, so the re-parse cannot fail.
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    };
    let mut out = heapless::String::new();
    let _ = out.push_str(text);
    out
}

/// Returns `true` if every byte of `s` is in the printable ASCII range
/// `0x20..=0x7E` (space through tilde, inclusive).
pub fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// Whether `name` can be used as a single path component on the card.
pub fn is_safe_asset_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && is_printable_ascii(name)
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}

/// Validate raw name bytes from the wire and copy them into an [`AssetName`].
pub fn asset_name(raw: &[u8]) -> Option<AssetName> {
    let s = core::str::from_utf8(raw).ok()?;
    if !is_safe_asset_name(s) {
        return None;
    }
    let mut name = AssetName::new();
    name.push_str(s).ok()?;
    Some(name)
}
