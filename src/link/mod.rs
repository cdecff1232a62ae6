//! BLE asset streaming engine.
//!
//! ```text
//!  GATT write ──▶ LinkEvent channel ──▶ LinkSession::on_write
//!                                          │
//!            ┌─────────────────────────────┼──────────────────────────┐
//!            ▼                             ▼                          ▼
//!     Reassembler<TileFrame>     Reassembler<TripFrame>      control commands
//!            │ RLE                         │                          │ (flags)
//!            ▼                             ▼                          ▼
//!       AssetStore ◀───────────────── AssetStore / Nav      LinkSession::tick
//!                                                                     │
//!                                           ChunkSender<IndexSource>  │
//!                                           ChunkSender<RecordingSource>
//!                                                                     ▼
//!                                                               Notifier
//! ```
//!
//! Every inbound characteristic carries its own sub-protocol; the session
//! routes writes with a `match` over [`Characteristic`].

pub mod channels;
pub mod control;
pub mod inventory;
pub mod notification;
pub mod radar;
pub mod reassembler;
pub mod recording;
pub mod rle;
pub mod sender;
pub mod session;
pub mod status;
pub mod tile;
pub mod transport;
pub mod trip;
pub mod weather;
pub mod wire;

/// 128-bit base shared by every characteristic of the VeloNav service.
/// The characteristic index goes into the low 16 bits of the first group.
pub const SERVICE_UUID: u128 = 0x7b1e_0000_5c2a_4d8e_9f31_b0a7_c5e2_d4f6;

/// GATT characteristics of the VeloNav service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Characteristic {
    Tile = 1,
    Trip = 2,
    Weather = 3,
    Radar = 4,
    Notification = 5,
    DeviceStatus = 6,
    TripControl = 7,
    RecordingControl = 8,
    TileInventory = 9,
    RecordingTransfer = 10,
}

impl Characteristic {
    pub const ALL: [Self; 10] = [
        Self::Tile,
        Self::Trip,
        Self::Weather,
        Self::Radar,
        Self::Notification,
        Self::DeviceStatus,
        Self::TripControl,
        Self::RecordingControl,
        Self::TileInventory,
        Self::RecordingTransfer,
    ];

    /// Position in [`Self::ALL`].
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    pub const fn uuid(self) -> u128 {
        SERVICE_UUID | ((self as u128) << 96)
    }

    pub fn from_uuid(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    /// Whether the phone writes to this characteristic.
    pub const fn is_inbound(self) -> bool {
        !matches!(self, Self::TileInventory | Self::RecordingTransfer)
    }

    /// Whether the device sends notifications on this characteristic.
    pub const fn notifies(self) -> bool {
        matches!(
            self,
            Self::Tile
                | Self::TripControl
                | Self::RecordingControl
                | Self::TileInventory
                | Self::RecordingTransfer
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Tile => "tile",
            Self::Trip => "trip",
            Self::Weather => "weather",
            Self::Radar => "radar",
            Self::Notification => "notification",
            Self::DeviceStatus => "status",
            Self::TripControl => "trip-ctl",
            Self::RecordingControl => "rec-ctl",
            Self::TileInventory => "inventory",
            Self::RecordingTransfer => "rec-xfer",
        }
    }
}

impl core::fmt::Display for Characteristic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
