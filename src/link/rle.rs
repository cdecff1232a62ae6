//! Run-length codec for 1-bit tile bitmaps.
//!
//! The phone compresses tiles as a flat sequence of `(count, value)` byte
//! pairs. E-paper map tiles are mostly long white or black runs, so this
//! beats DEFLATE on both ratio and decoder RAM.
//!
//! ```text
//! [count u8][value u8] [count u8][value u8] ...
//! ```

use core::fmt;

use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RleError {
    /// Source ends in the middle of a `(count, value)` pair.
    Truncated,
    /// Decoded output would not fit the destination.
    Overflow,
    /// No memory for the output buffer.
    NoMemory,
}

impl fmt::Display for RleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "source truncated mid-pair"),
            Self::Overflow => write!(f, "output exceeds capacity"),
            Self::NoMemory => write!(f, "no memory for output"),
        }
    }
}

/// Decode `src` into `dst`, returning the number of bytes written.
///
/// A run that would cross the end of `dst` is rejected before any of it is
/// written, so nothing past capacity is ever touched.
pub fn decode(src: &[u8], dst: &mut [u8]) -> Result<usize, RleError> {
    if src.len() % 2 != 0 {
        return Err(RleError::Truncated);
    }

    let mut written = 0;
    for pair in src.chunks_exact(2) {
        let count = pair[0] as usize;
        let value = pair[1];
        let end = written + count;
        if end > dst.len() {
            return Err(RleError::Overflow);
        }
        dst[written..end].fill(value);
        written = end;
    }
    Ok(written)
}

/// Decode into a freshly allocated buffer of at most `capacity` bytes.
pub fn decode_to_vec(src: &[u8], capacity: usize) -> Result<Vec<u8>, RleError> {
    let mut out = Vec::new();
    if out.try_reserve_exact(capacity).is_err() {
        warn!("rle: cannot reserve {} bytes", capacity);
        return Err(RleError::NoMemory);
    }
    out.resize(capacity, 0);
    let n = decode(src, &mut out)?;
    out.truncate(n);
    Ok(out)
}

/// Encode `src` as `(count, value)` pairs, splitting runs longer than 255.
pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = src.iter().copied().peekable();
    while let Some(value) = iter.next() {
        let mut count: u8 = 1;
        while count < u8::MAX && iter.peek() == Some(&value) {
            iter.next();
            count += 1;
        }
        out.push(count);
        out.push(value);
    }
    out
}

// ── Tests ────────────────────────────────────────────────────
