//! Map tile upload.
//!
//! ```text
//! ┌───────┬──────┬──────────┬──────────┬──────────┐
//! │ flags │ zoom │ tileX u32│ tileY u32│ size u32 │  then `size` payload bytes
//! └───────┴──────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Stop-and-wait: the phone sends the next tile only after the one-byte
//! acknowledgement for the previous one. The ack goes out after the
//! reassembler has reset, whatever the outcome of the save.

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::app::ports::FileSystem;
use crate::diagnostics::LinkStats;
use crate::error::FrameError;
use crate::storage::AssetStore;

use super::reassembler::{Assembled, FrameSpec, Limits};
use super::rle;
use super::transport::Notifier;
use super::wire::be_u32;
use super::Characteristic;

/// Notified on [`Characteristic::Tile`] once a tile is dealt with.
pub const TILE_ACK: u8 = 0x01;

/// Flag bit: payload is RLE-compressed.
pub const FLAG_RLE: u8 = 0x01;

pub const MAX_ZOOM: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileHeader {
    pub compressed: bool,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

pub struct TileFrame;

impl FrameSpec for TileFrame {
    type Header = TileHeader;
    const NAME: &'static str = "tile";
    const HEADER_LEN: usize = 14;

    fn precheck(first: u8) -> bool {
        first <= FLAG_RLE
    }

    fn parse_header(raw: &[u8], limits: &Limits) -> Result<(TileHeader, usize), FrameError> {
        let flags = raw[0];
        let zoom = raw[1];
        let header = TileHeader {
            compressed: flags & FLAG_RLE != 0,
            zoom,
            x: be_u32(raw, 2),
            y: be_u32(raw, 6),
            size: be_u32(raw, 10),
        };
        if flags > FLAG_RLE {
            return Err(FrameError::BadFlags);
        }
        if zoom > MAX_ZOOM {
            return Err(FrameError::ZoomOutOfRange);
        }
        if header.size == 0 || header.size > limits.max_payload {
            return Err(FrameError::SizeOutOfRange);
        }
        Ok((header, header.size as usize))
    }
}

/// Encode a tile header. Used by the host tools and tests.
pub fn encode_header(h: &TileHeader) -> [u8; 14] {
    let mut raw = [0u8; 14];
    raw[0] = u8::from(h.compressed);
    raw[1] = h.zoom;
    raw[2..6].copy_from_slice(&h.x.to_be_bytes());
    raw[6..10].copy_from_slice(&h.y.to_be_bytes());
    raw[10..14].copy_from_slice(&h.size.to_be_bytes());
    raw
}

/// Persist a finished tile, then acknowledge it.
///
/// Decode failures skip the write; storage failures throttle before the
/// ack so the phone's next tile lands on a quieter bus.
pub fn deliver<F: FileSystem, D: DelayNs>(
    frame: Assembled<TileHeader>,
    store: &mut AssetStore<F, D>,
    bitmap_capacity: usize,
    notifier: &mut dyn Notifier,
    stats: &mut LinkStats,
) {
    match frame {
        Assembled::Complete { header, payload } => {
            save(header, payload, store, bitmap_capacity, stats);
        }
        Assembled::Skipped { header, len } => {
            debug!(
                "tile: z{} {}/{} dropped, {} bytes skipped",
                header.zoom, header.x, header.y, len
            );
        }
    }

    match notifier.notify(Characteristic::Tile, &[TILE_ACK]) {
        Ok(()) => stats.frames_sent += 1,
        Err(e) => {
            warn!("tile: ack not sent ({})", e);
            stats.notify_failures += 1;
        }
    }
}

fn save<F: FileSystem, D: DelayNs>(
    header: TileHeader,
    payload: Vec<u8>,
    store: &mut AssetStore<F, D>,
    bitmap_capacity: usize,
    stats: &mut LinkStats,
) {
    let data = if header.compressed {
        match rle::decode_to_vec(&payload, bitmap_capacity) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                warn!(
                    "tile: z{} {}/{} undecodable ({}), not saved",
                    header.zoom, header.x, header.y, e
                );
                stats.decode_failures += 1;
                return;
            }
        }
    } else {
        payload
    };

    match store.save_tile(header.zoom, header.x, header.y, &data) {
        Ok(()) => stats.tiles_saved += 1,
        Err(e) => {
            warn!(
                "tile: z{} {}/{} not saved ({})",
                header.zoom, header.x, header.y, e
            );
            stats.storage_failures += 1;
            store.throttle_after_failure();
        }
    }
}
