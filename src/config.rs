//! Link configuration parameters
//!
//! All tunable parameters for the BLE asset streaming engine: SD layout,
//! storage retry timing, payload limits, and outbound pacing.
//! Values can be overridden by a JSON file on the SD card.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{FileSystem, OpenMode, StorageFile};
use crate::error::{ConfigError, StorageError};

/// Where the optional override file lives on the SD card.
pub const CONFIG_PATH: &str = "/config/link.json";

/// Largest override file accepted.
const MAX_CONFIG_BYTES: usize = 2048;

/// Directory / file path stored in config.
pub type ConfigPath = heapless::String<32>;

/// Core link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    // --- SD layout ---
    /// Root directory for map tiles (`{dir}/{z}/{x}/{y}.bin`).
    pub tiles_dir: ConfigPath,
    /// Running binary index of stored tiles (9-byte records).
    pub tile_index_path: ConfigPath,
    /// Uploaded GPX trips.
    pub trips_dir: ConfigPath,
    /// Recorded tracks available for download.
    pub recordings_dir: ConfigPath,

    // --- Storage contention ---
    /// Open attempts before falling back to directory creation.
    pub open_attempts: u8,
    /// Back-off between open attempts (milliseconds).
    pub open_retry_delay_ms: u32,
    /// Pause after a failed save before the next unit of work (milliseconds).
    pub failure_throttle_ms: u32,
    /// Open attempts for the tile index append.
    pub index_open_attempts: u8,

    // --- Limits ---
    /// Largest accepted tile payload (bytes, as declared in the header).
    pub max_tile_payload: u32,
    /// Decoded tile bitmap capacity (bytes).
    pub tile_bitmap_capacity: u32,
    /// Largest accepted trip payload (name + gpx + meta).
    pub max_trip_payload: u32,
    /// Largest single reassembly buffer the allocator will hand out.
    pub max_buffer_bytes: u32,

    // --- Outbound pacing ---
    /// Minimum gap between tile inventory packets (milliseconds).
    pub inventory_interval_ms: u32,
    /// Minimum gap between recording transfer packets (milliseconds).
    pub recording_interval_ms: u32,
    /// Index records per inventory DATA packet.
    pub inventory_records_per_chunk: u16,
    /// Payload bytes per recording DATA packet.
    pub recording_chunk_bytes: u16,
}

fn path(s: &str) -> ConfigPath {
    let mut p = ConfigPath::new();
    let _ = p.push_str(s);
    p
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            // SD layout
            tiles_dir: path("/tiles"),
            tile_index_path: path("/tiles/index.bin"),
            trips_dir: path("/trips"),
            recordings_dir: path("/recordings"),

            // Storage contention
            open_attempts: 3,
            open_retry_delay_ms: 20,
            failure_throttle_ms: 200,
            index_open_attempts: 2,

            // Limits
            max_tile_payload: 1_000_000,
            tile_bitmap_capacity: 8192, // 256x256 1-bit
            max_trip_payload: 524_288,
            max_buffer_bytes: 1_048_576,

            // Outbound pacing
            inventory_interval_ms: 30,
            recording_interval_ms: 20,
            inventory_records_per_chunk: 50,
            recording_chunk_bytes: 480,
        }
    }
}

impl LinkConfig {
    /// Range-check every field. Bad values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for dir in [&self.tiles_dir, &self.trips_dir, &self.recordings_dir] {
            if !dir.starts_with('/') || dir.len() < 2 || dir.ends_with('/') {
                return Err(ConfigError::ValidationFailed(
                    "directories must be absolute without trailing '/'",
                ));
            }
        }
        if !self.tile_index_path.starts_with('/') {
            return Err(ConfigError::ValidationFailed(
                "tile_index_path must be absolute",
            ));
        }
        if !(1..=10).contains(&self.open_attempts) {
            return Err(ConfigError::ValidationFailed("open_attempts must be 1–10"));
        }
        if !(1..=5).contains(&self.index_open_attempts) {
            return Err(ConfigError::ValidationFailed(
                "index_open_attempts must be 1–5",
            ));
        }
        if self.open_retry_delay_ms > 1000 {
            return Err(ConfigError::ValidationFailed(
                "open_retry_delay_ms must be 0–1000",
            ));
        }
        if self.failure_throttle_ms > 5000 {
            return Err(ConfigError::ValidationFailed(
                "failure_throttle_ms must be 0–5000",
            ));
        }
        if self.max_tile_payload == 0 || self.max_tile_payload > self.max_buffer_bytes {
            return Err(ConfigError::ValidationFailed(
                "max_tile_payload must be 1–max_buffer_bytes",
            ));
        }
        if self.max_trip_payload < 10 || self.max_trip_payload > self.max_buffer_bytes {
            return Err(ConfigError::ValidationFailed(
                "max_trip_payload must be 10–max_buffer_bytes",
            ));
        }
        if self.tile_bitmap_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "tile_bitmap_capacity must be non-zero",
            ));
        }
        if !(1..=56).contains(&self.inventory_records_per_chunk) {
            // 56 × 9 bytes + action byte still fits a 512-byte notification.
            return Err(ConfigError::ValidationFailed(
                "inventory_records_per_chunk must be 1–56",
            ));
        }
        if !(1..=510).contains(&self.recording_chunk_bytes) {
            return Err(ConfigError::ValidationFailed(
                "recording_chunk_bytes must be 1–510",
            ));
        }
        Ok(())
    }

    /// Load overrides from [`CONFIG_PATH`], falling back to defaults.
    ///
    /// A missing file is normal (first boot). A corrupt or out-of-range
    /// file is logged and ignored so a bad edit never bricks the link.
    pub fn load(fs: &mut impl FileSystem) -> Self {
        match Self::read_from(fs) {
            Ok(cfg) => {
                info!("config: loaded {}", CONFIG_PATH);
                cfg
            }
            Err(ConfigError::Io) => {
                info!("config: no {}, using defaults", CONFIG_PATH);
                Self::default()
            }
            Err(e) => {
                warn!("config: {} ignored ({}), using defaults", CONFIG_PATH, e);
                Self::default()
            }
        }
    }

    fn read_from(fs: &mut impl FileSystem) -> Result<Self, ConfigError> {
        let mut file = fs
            .open(CONFIG_PATH, OpenMode::Read)
            .map_err(|_| ConfigError::Io)?;
        let size = file.size().map_err(|_| ConfigError::Io)? as usize;
        if size > MAX_CONFIG_BYTES {
            return Err(ConfigError::ValidationFailed("config file too large"));
        }
        let mut raw = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match file.read(&mut raw[filled..]) {
                Ok(0) | Err(StorageError::ReadFailed) => return Err(ConfigError::Corrupted),
                Ok(n) => filled += n,
                Err(_) => return Err(ConfigError::Io),
            }
        }
        let cfg: Self = serde_json::from_slice(&raw).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
