//! Port traits: the hexagonal boundary between the link engine and the
//! rest of the device.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LinkSession (protocol core)
//! ```
//!
//! Driven adapters (SD card, navigation, notification list, display)
//! implement these traits. The [`LinkSession`](crate::link::session::LinkSession)
//! consumes them, so the protocol core never touches hardware directly.

use crate::error::StorageError;
use crate::link::notification::PhoneNotification;
use crate::link::radar::RadarFrame;
use crate::link::status::DeviceStatus;
use crate::link::weather::WeatherReport;

/// Asset names as stored on the SD card (trip and recording names).
pub type AssetName = heapless::String<64>;

/// A directory entry: the longest asset name plus its extension.
pub type FileName = heapless::String<72>;

// ───────────────────────────────────────────────────────────────
// Filesystem port (driven adapter: SD card ↔ storage adapter)
// ───────────────────────────────────────────────────────────────

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, read from the start.
    Read,
    /// Create or truncate.
    Write,
    /// Create if missing, write at the end.
    Append,
}

/// An open file. Dropping it closes the underlying descriptor.
pub trait StorageFile {
    /// Write every byte of `data` or fail.
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Current file length in bytes.
    fn size(&self) -> Result<u64, StorageError>;
}

/// Minimal filesystem surface the storage adapter needs.
///
/// Paths are absolute, `/`-separated, relative to the card root.
/// Implementations must not create parent directories implicitly;
/// the storage adapter decides when that round trip is worth paying.
pub trait FileSystem {
    type File: StorageFile;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, StorageError>;

    /// Remove a file. Returns `Err(NotFound)` when there was nothing to remove.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Create `path` and any missing parents.
    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError>;

    /// File names (not paths) directly inside `dir`. Names that do not fit
    /// [`FileName`] are left out.
    fn list(&mut self, dir: &str) -> Result<Vec<FileName>, StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Navigation port (driven adapter: link → route engine)
// ───────────────────────────────────────────────────────────────

/// The navigation collaborator. Route maths and rendering live behind it.
pub trait NavigationPort {
    /// Load a route straight from memory (the "navigate home" upload).
    fn load_route(&mut self, gpx: &[u8]);

    /// Start navigating a stored trip.
    fn start_trip(&mut self, name: &str);

    /// Stop any active navigation.
    fn stop(&mut self);

    /// A trip upload finished and is on the card.
    fn trip_stored(&mut self, name: &str);

    /// Name of the trip being navigated, if any.
    fn active_trip(&self) -> Option<&str>;
}

// ───────────────────────────────────────────────────────────────
// Notification port (driven adapter: link → notification list UI)
// ───────────────────────────────────────────────────────────────

pub trait NotificationPort {
    fn add(&mut self, notification: &PhoneNotification);
    fn dismiss(&mut self, id: u32);
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: link → e-paper pages)
// ───────────────────────────────────────────────────────────────

pub trait DisplayPort {
    fn show_weather(&mut self, report: &WeatherReport);
    fn show_radar(&mut self, frame: &RadarFrame);
    fn update_device_status(&mut self, status: &DeviceStatus);
}
