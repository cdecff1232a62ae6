//! SD card asset store.
//!
//! The SD card shares its SPI bus with the e-paper panel. While the panel
//! refreshes, opens fail transiently, so every write path here retries a
//! few times with a short back-off before giving up.
//!
//! Metadata operations are kept to a minimum per transferred asset: no
//! existence checks, and parent directories are created only after the
//! retries have failed. On FAT every extra `stat`/`mkdir` holds a
//! descriptor slot, and running out of slots was what made writes fail
//! under load.
//!
//! ```text
//! save_tile:  remove ─▶ open×N (delay) ─▶ mkdir -p ─▶ open ─▶ write ─▶ index append
//! ```

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::{AssetName, FileSystem, OpenMode, StorageFile};
use crate::config::{ConfigPath, LinkConfig};
use crate::error::StorageError;
use crate::link::wire::is_safe_asset_name;

/// Bytes per tile index record: `zoom(1) x(4) y(4)`.
pub const INDEX_RECORD_LEN: usize = 9;

type PathBuf = heapless::String<128>;

/// Build a path from format arguments. Overlong paths are refused
/// rather than truncated.
fn build_path(args: core::fmt::Arguments<'_>) -> Result<PathBuf, StorageError> {
    let mut p = PathBuf::new();
    p.write_fmt(args).map_err(|_| StorageError::InvalidName)?;
    Ok(p)
}

/// Encode one tile index record.
pub fn index_record(zoom: u8, x: u32, y: u32) -> [u8; INDEX_RECORD_LEN] {
    let mut rec = [0u8; INDEX_RECORD_LEN];
    rec[0] = zoom;
    rec[1..5].copy_from_slice(&x.to_be_bytes());
    rec[5..9].copy_from_slice(&y.to_be_bytes());
    rec
}

/// Retry and layout settings taken from [`LinkConfig`].
#[derive(Debug, Clone)]
struct StoreSettings {
    tiles_dir: ConfigPath,
    tile_index_path: ConfigPath,
    trips_dir: ConfigPath,
    recordings_dir: ConfigPath,
    open_attempts: u8,
    open_retry_delay_ms: u32,
    failure_throttle_ms: u32,
    index_open_attempts: u8,
}

impl From<&LinkConfig> for StoreSettings {
    fn from(c: &LinkConfig) -> Self {
        Self {
            tiles_dir: c.tiles_dir.clone(),
            tile_index_path: c.tile_index_path.clone(),
            trips_dir: c.trips_dir.clone(),
            recordings_dir: c.recordings_dir.clone(),
            open_attempts: c.open_attempts.max(1),
            open_retry_delay_ms: c.open_retry_delay_ms,
            failure_throttle_ms: c.failure_throttle_ms,
            index_open_attempts: c.index_open_attempts.max(1),
        }
    }
}

/// Files making up one recorded track.
pub struct RecordingFiles<F> {
    /// `{name}.json`, absent when the track has no metadata.
    pub meta: Option<F>,
    /// `{name}.gpx`.
    pub gpx: F,
}

pub struct AssetStore<F: FileSystem, D: DelayNs> {
    fs: F,
    delay: D,
    settings: StoreSettings,
}

impl<F: FileSystem, D: DelayNs> AssetStore<F, D> {
    pub fn new(fs: F, delay: D, config: &LinkConfig) -> Self {
        Self {
            fs,
            delay,
            settings: StoreSettings::from(config),
        }
    }

    // ── Tiles ─────────────────────────────────────────────────

    /// Persist one decoded tile and record it in the index.
    ///
    /// An index append failure is logged but does not fail the save: the
    /// tile itself is on the card and the phone will re-sync inventory.
    pub fn save_tile(&mut self, zoom: u8, x: u32, y: u32, data: &[u8]) -> Result<(), StorageError> {
        let dir = build_path(format_args!("{}/{}/{}", self.settings.tiles_dir, zoom, x))?;
        let path = build_path(format_args!("{}/{}.bin", dir, y))?;

        // No existence check: a failed remove costs the same round trip.
        let _ = self.fs.remove(&path);

        let mut file = self.open_for_write(&path, &dir)?;
        if let Err(e) = file.write_all(data) {
            warn!("SD: write {} failed ({})", path, e);
            return Err(StorageError::WriteFailed);
        }
        drop(file);
        debug!("SD: tile z{} {}/{} saved ({} bytes)", zoom, x, y, data.len());

        if let Err(e) = self.append_index(zoom, x, y) {
            warn!("SD: index append for z{} {}/{} failed ({})", zoom, x, y, e);
        }
        Ok(())
    }

    fn append_index(&mut self, zoom: u8, x: u32, y: u32) -> Result<(), StorageError> {
        let path = self.settings.tile_index_path.clone();
        let mut file = self.open_with_retry(&path, OpenMode::Append, self.settings.index_open_attempts)?;
        file.write_all(&index_record(zoom, x, y))
    }

    /// Open the tile index for reading.
    pub fn open_index(&mut self) -> Result<F::File, StorageError> {
        let path = self.settings.tile_index_path.clone();
        self.fs.open(&path, OpenMode::Read)
    }

    // ── Trips ─────────────────────────────────────────────────

    /// Store an uploaded trip as `{name}.gpx`, plus `{name}.json` when
    /// metadata was sent.
    pub fn save_trip(&mut self, name: &str, gpx: &[u8], meta: &[u8]) -> Result<(), StorageError> {
        if !is_safe_asset_name(name) {
            return Err(StorageError::InvalidName);
        }
        let dir = self.settings.trips_dir.clone();

        let path = build_path(format_args!("{}/{}.gpx", dir, name))?;
        let mut file = self.open_for_write(&path, &dir)?;
        file.write_all(gpx).inspect_err(|e| warn!("SD: write {} failed ({})", path, e))?;
        drop(file);

        if !meta.is_empty() {
            let path = build_path(format_args!("{}/{}.json", dir, name))?;
            let mut file = self.open_for_write(&path, &dir)?;
            file.write_all(meta).inspect_err(|e| warn!("SD: write {} failed ({})", path, e))?;
        }
        info!("SD: trip '{}' saved ({} + {} bytes)", name, gpx.len(), meta.len());
        Ok(())
    }

    /// Names of stored trips, without extension.
    pub fn trip_names(&mut self) -> Result<Vec<AssetName>, StorageError> {
        let dir = self.settings.trips_dir.clone();
        self.list_names(&dir, ".gpx")
    }

    // ── Recordings ────────────────────────────────────────────

    /// Names of recorded tracks, without extension.
    pub fn recording_names(&mut self) -> Result<Vec<AssetName>, StorageError> {
        let dir = self.settings.recordings_dir.clone();
        self.list_names(&dir, ".gpx")
    }

    /// Open a recording for download. The track is required; metadata is
    /// optional.
    pub fn open_recording(&mut self, name: &str) -> Result<RecordingFiles<F::File>, StorageError> {
        if !is_safe_asset_name(name) {
            return Err(StorageError::InvalidName);
        }
        let dir = &self.settings.recordings_dir;
        let gpx_path = build_path(format_args!("{}/{}.gpx", dir, name))?;
        let meta_path = build_path(format_args!("{}/{}.json", dir, name))?;

        let gpx = self.fs.open(&gpx_path, OpenMode::Read)?;
        let meta = self.fs.open(&meta_path, OpenMode::Read).ok();
        Ok(RecordingFiles { meta, gpx })
    }

    // ── Shared ────────────────────────────────────────────────

    /// Pause after a failed save so bus contention can clear before the
    /// next unit of work.
    pub fn throttle_after_failure(&mut self) {
        self.delay.delay_ms(self.settings.failure_throttle_ms);
    }

    fn list_names(&mut self, dir: &str, ext: &str) -> Result<Vec<AssetName>, StorageError> {
        let entries = match self.fs.list(dir) {
            Ok(entries) => entries,
            Err(StorageError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names: Vec<AssetName> = entries
            .iter()
            .filter_map(|entry| entry.strip_suffix(ext))
            .filter(|stem| is_safe_asset_name(stem))
            .filter_map(|stem| {
                let mut n = AssetName::new();
                n.push_str(stem).ok()?;
                Some(n)
            })
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    fn open_with_retry(
        &mut self,
        path: &str,
        mode: OpenMode,
        attempts: u8,
    ) -> Result<F::File, StorageError> {
        let mut last = StorageError::OpenFailed;
        for attempt in 1..=attempts {
            match self.fs.open(path, mode) {
                Ok(f) => {
                    if attempt > 1 {
                        debug!("SD: {} opened on attempt {}", path, attempt);
                    }
                    return Ok(f);
                }
                Err(e) => {
                    last = e;
                    if attempt < attempts {
                        self.delay.delay_ms(self.settings.open_retry_delay_ms);
                    }
                }
            }
        }
        Err(last)
    }

    fn open_for_write(&mut self, path: &str, parent: &str) -> Result<F::File, StorageError> {
        if let Ok(f) = self.open_with_retry(path, OpenMode::Write, self.settings.open_attempts) {
            return Ok(f);
        }

        // Only now pay for directory creation.
        debug!("SD: open {} failed, creating {}", path, parent);
        if let Err(e) = self.fs.create_dir_all(parent) {
            warn!("SD: mkdir {} failed ({})", parent, e);
            return Err(StorageError::DirCreateFailed);
        }
        self.fs.open(path, OpenMode::Write).map_err(|e| {
            warn!("SD: open {} failed after mkdir ({})", path, e);
            StorageError::OpenFailed
        })
    }
}
