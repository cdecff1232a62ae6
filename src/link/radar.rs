//! Rain radar frame (one 5068-byte struct).
//!
//! ```text
//! hasError(1) frameOffsetSteps(i8) stepMinutes(1) totalFrames(1)
//! errorMessage[64]   ◀── timing block in bytes 0..4 when hasError == 0
//! image[5000]        200×200, 1 bit per pixel
//! ```
//!
//! The timing block's `baseMinutes` is little-endian, unlike every other
//! field on the link. Older phone builds leave the block zeroed, so it is
//! only trusted when the magic byte matches.

use super::reassembler::FixedRecord;
use super::wire::{fixed_str, le_u16};

pub const RADAR_WIDTH: usize = 200;
pub const RADAR_HEIGHT: usize = 200;
pub const RADAR_IMAGE_LEN: usize = RADAR_WIDTH * RADAR_HEIGHT / 8;
pub const RADAR_LEN: usize = 4 + 64 + RADAR_IMAGE_LEN;

pub const TIMING_MAGIC: u8 = 0xA5;
const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadarTiming {
    /// Local time of frame 0, minutes after midnight.
    pub base_minutes: u16,
    pub nowcast_step: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarFrame {
    pub error: Option<heapless::String<64>>,
    /// Position of this frame relative to "now", in steps.
    pub frame_offset: i8,
    pub step_minutes: u8,
    pub total_frames: u8,
    pub timing: Option<RadarTiming>,
    pub image: Vec<u8>,
}

impl RadarFrame {
    /// Minutes after midnight this frame shows, when timing is known.
    pub fn frame_minutes(&self) -> Option<u16> {
        let t = self.timing?;
        let offset = i32::from(self.frame_offset) * i32::from(self.step_minutes);
        let m = (i32::from(t.base_minutes) + offset).rem_euclid(i32::from(MINUTES_PER_DAY));
        Some(m as u16)
    }
}

fn parse_timing(block: &[u8]) -> Option<RadarTiming> {
    let base_minutes = le_u16(block, 0);
    (block[2] == TIMING_MAGIC && base_minutes < MINUTES_PER_DAY).then_some(RadarTiming {
        base_minutes,
        nowcast_step: block[3],
    })
}

impl FixedRecord for RadarFrame {
    const NAME: &'static str = "radar";
    const LEN: usize = RADAR_LEN;

    fn precheck(first: u8) -> bool {
        first <= 1
    }

    fn parse(raw: &[u8]) -> Self {
        let has_error = raw[0] != 0;
        let message = &raw[4..68];
        Self {
            error: has_error.then(|| fixed_str(message)),
            frame_offset: raw[1] as i8,
            step_minutes: raw[2],
            total_frames: raw[3],
            timing: if has_error { None } else { parse_timing(message) },
            image: raw[68..].to_vec(),
        }
    }
}
