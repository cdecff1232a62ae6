//! GPX trip upload.
//!
//! Header `nameLen(2) gpxLen(4) metaLen(4)`, then `name ∥ gpx ∥ meta`.
//! There is no acknowledgement; the phone times out if a trip is lost.
//!
//! The name [`NAV_HOME_TRIP`] marks a throw-away route computed by the
//! phone ("navigate home"). It is loaded straight into navigation and
//! never written to the card.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::ports::{AssetName, FileSystem, NavigationPort};
use crate::diagnostics::LinkStats;
use crate::error::FrameError;
use crate::storage::AssetStore;

use super::reassembler::{Assembled, FrameSpec, Limits};
use super::wire::{asset_name, be_u16, be_u32};

pub const NAV_HOME_TRIP: &str = "_nav_home_temp";

pub const MAX_NAME_LEN: u16 = 64;

/// Smallest plausible upload (name plus a stub GPX document).
pub const MIN_TRIP_LEN: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripHeader {
    pub name_len: u16,
    pub gpx_len: u32,
    pub meta_len: u32,
}

impl TripHeader {
    pub fn total(&self) -> u64 {
        u64::from(self.name_len) + u64::from(self.gpx_len) + u64::from(self.meta_len)
    }

    pub fn encode(&self) -> [u8; 10] {
        let mut raw = [0u8; 10];
        raw[0..2].copy_from_slice(&self.name_len.to_be_bytes());
        raw[2..6].copy_from_slice(&self.gpx_len.to_be_bytes());
        raw[6..10].copy_from_slice(&self.meta_len.to_be_bytes());
        raw
    }
}

pub struct TripFrame;

impl FrameSpec for TripFrame {
    type Header = TripHeader;
    const NAME: &'static str = "trip";
    const HEADER_LEN: usize = 10;

    // nameLen ≤ 64, so its high byte is always zero.
    fn precheck(first: u8) -> bool {
        first == 0
    }

    fn parse_header(raw: &[u8], limits: &Limits) -> Result<(TripHeader, usize), FrameError> {
        let header = TripHeader {
            name_len: be_u16(raw, 0),
            gpx_len: be_u32(raw, 2),
            meta_len: be_u32(raw, 6),
        };
        if header.name_len == 0 || header.name_len > MAX_NAME_LEN {
            return Err(FrameError::NameLength);
        }
        let total = header.total();
        if total < MIN_TRIP_LEN || total > u64::from(limits.max_payload) {
            return Err(FrameError::SizeOutOfRange);
        }
        Ok((header, total as usize))
    }
}

/// What became of a finished trip upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripOutcome {
    /// Handed to navigation in memory.
    Navigating,
    /// Written to the card under this name.
    Stored(AssetName),
    /// Skipped, rejected or not saved.
    Dropped,
}

pub fn deliver<F: FileSystem, D: DelayNs>(
    frame: Assembled<TripHeader>,
    store: &mut AssetStore<F, D>,
    navigation: &mut dyn NavigationPort,
    stats: &mut LinkStats,
) -> TripOutcome {
    let (header, payload) = match frame {
        Assembled::Complete { header, payload } => (header, payload),
        Assembled::Skipped { len, .. } => {
            warn!("trip: {} bytes skipped, upload lost", len);
            return TripOutcome::Dropped;
        }
    };

    let name_end = header.name_len as usize;
    let gpx_end = name_end + header.gpx_len as usize;
    let Some(name) = asset_name(&payload[..name_end]) else {
        warn!("trip: unusable name, upload dropped");
        return TripOutcome::Dropped;
    };
    let gpx = &payload[name_end..gpx_end];
    let meta = &payload[gpx_end..];

    if name == NAV_HOME_TRIP {
        info!("trip: home route received ({} bytes)", gpx.len());
        navigation.load_route(gpx);
        return TripOutcome::Navigating;
    }

    match store.save_trip(&name, gpx, meta) {
        Ok(()) => {
            stats.trips_saved += 1;
            navigation.trip_stored(&name);
            TripOutcome::Stored(name)
        }
        Err(e) => {
            warn!("trip: '{}' not saved ({})", name, e);
            stats.storage_failures += 1;
            store.throttle_after_failure();
            TripOutcome::Dropped
        }
    }
}
