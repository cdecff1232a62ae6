//! Phone status push: battery, charging state and wall clock.

use super::reassembler::FixedRecord;
use super::wire::{be_i16, be_u32};

pub const STATUS_LEN: usize = 8;

/// Battery byte when the phone cannot report a level.
pub const BATTERY_UNKNOWN: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    /// Percent, `None` when unknown.
    pub phone_battery: Option<u8>,
    pub charging: bool,
    pub unix_time: u32,
    pub utc_offset_minutes: i16,
}

impl FixedRecord for DeviceStatus {
    const NAME: &'static str = "status";
    const LEN: usize = STATUS_LEN;

    fn precheck(first: u8) -> bool {
        first <= 100 || first == BATTERY_UNKNOWN
    }

    fn parse(raw: &[u8]) -> Self {
        Self {
            phone_battery: (raw[0] != BATTERY_UNKNOWN).then_some(raw[0]),
            charging: raw[1] != 0,
            unix_time: be_u32(raw, 2),
            utc_offset_minutes: be_i16(raw, 6),
        }
    }
}
