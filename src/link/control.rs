//! Trip-Control and Recording-Control commands.
//!
//! Control writes are short and always arrive whole, so they skip
//! reassembly. Parsing only records intent; the session does the work on
//! its next tick.
//!
//! List responses use the same frames on both characteristics:
//!
//! ```text
//! 0x10 count(u16)     list start
//! 0x11 len(1) name    one entry
//! 0x12                list end
//! 0x13 len(1) name    active trip (len 0 = none)
//! ```

use core::cmp::Ordering;

use crate::app::ports::AssetName;
use crate::error::FrameError;

use super::transport::MAX_NOTIFY_LEN;
use super::wire::asset_name;

pub const TRIP_STOP: u8 = 0x01;
pub const TRIP_START: u8 = 0x02;
pub const TRIP_READY: u8 = 0x03;
pub const TRIP_INVENTORY: u8 = 0x04;

pub const RECORDING_LIST: u8 = 0x01;
pub const RECORDING_DOWNLOAD: u8 = 0x02;

pub const LIST_START: u8 = 0x10;
pub const LIST_ENTRY: u8 = 0x11;
pub const LIST_END: u8 = 0x12;
pub const ACTIVE_TRIP: u8 = 0x13;

pub type ControlFrame = heapless::Vec<u8, MAX_NOTIFY_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripCommand {
    Stop,
    Start(AssetName),
    /// The phone app is subscribed and wants the trip list.
    Ready,
    /// Send the tile inventory.
    Inventory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingCommand {
    List,
    Download(AssetName),
}

/// `len(1) name` with nothing after it.
fn named(rest: &[u8]) -> Result<AssetName, FrameError> {
    let (&len, name) = rest.split_first().ok_or(FrameError::Truncated)?;
    if len == 0 {
        return Err(FrameError::NameLength);
    }
    match name.len().cmp(&usize::from(len)) {
        Ordering::Less => return Err(FrameError::Truncated),
        Ordering::Greater => return Err(FrameError::TrailingBytes),
        Ordering::Equal => {}
    }
    asset_name(name).ok_or(FrameError::InvalidName)
}

impl TripCommand {
    pub fn parse(write: &[u8]) -> Result<Self, FrameError> {
        let (&action, rest) = write.split_first().ok_or(FrameError::Empty)?;
        match action {
            TRIP_STOP => Ok(Self::Stop),
            TRIP_START => named(rest).map(Self::Start),
            TRIP_READY => Ok(Self::Ready),
            TRIP_INVENTORY => Ok(Self::Inventory),
            other => Err(FrameError::UnknownAction(other)),
        }
    }
}

impl RecordingCommand {
    pub fn parse(write: &[u8]) -> Result<Self, FrameError> {
        let (&action, rest) = write.split_first().ok_or(FrameError::Empty)?;
        match action {
            RECORDING_LIST => Ok(Self::List),
            RECORDING_DOWNLOAD => named(rest).map(Self::Download),
            other => Err(FrameError::UnknownAction(other)),
        }
    }
}

pub fn list_start_frame(count: usize) -> ControlFrame {
    let count = u16::try_from(count).unwrap_or(u16::MAX);
    let mut f = ControlFrame::new();
    let _ = f.push(LIST_START);
    let _ = f.extend_from_slice(&count.to_be_bytes());
    f
}

fn tagged_name(tag: u8, name: &str) -> ControlFrame {
    let mut f = ControlFrame::new();
    let _ = f.push(tag);
    // Asset names are at most 64 bytes.
    let _ = f.push(name.len() as u8);
    let _ = f.extend_from_slice(name.as_bytes());
    f
}

pub fn list_entry_frame(name: &str) -> ControlFrame {
    tagged_name(LIST_ENTRY, name)
}

pub fn list_end_frame() -> ControlFrame {
    let mut f = ControlFrame::new();
    let _ = f.push(LIST_END);
    f
}

pub fn active_trip_frame(name: Option<&str>) -> ControlFrame {
    tagged_name(ACTIVE_TRIP, name.unwrap_or_default())
}
