//! SD card filesystem adapter.
//!
//! Implements [`FileSystem`] over `std::fs`. On the device the card is a
//! FAT volume mounted into the ESP-IDF VFS at [`MOUNT_POINT`], so the same
//! code runs on target and on the host (where the root is a temp dir).
//!
//! Link paths are card-relative (`/tiles/12/2048/1361.bin`); the adapter
//! prefixes them with its root.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;

use log::debug;

use crate::app::ports::{FileName, FileSystem, OpenMode, StorageFile};
use crate::error::StorageError;

/// VFS path the FAT volume is mounted at on the device.
pub const MOUNT_POINT: &str = "/sdcard";

fn map_open_err(e: &io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound,
        _ => StorageError::OpenFailed,
    }
}

// ───────────────────────────────────────────────────────────────
// File handle
// ───────────────────────────────────────────────────────────────

/// Open file on the card. Closed on drop.
pub struct SdFile {
    file: File,
}

impl StorageFile for SdFile {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(data)
            .and_then(|()| self.file.flush())
            .map_err(|_| StorageError::WriteFailed)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        loop {
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => return Err(StorageError::ReadFailed),
            }
        }
    }

    fn size(&self) -> Result<u64, StorageError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|_| StorageError::Io)
    }
}

// ───────────────────────────────────────────────────────────────
// Filesystem
// ───────────────────────────────────────────────────────────────

pub struct SdCardFs {
    root: PathBuf,
}

impl SdCardFs {
    /// Filesystem rooted at `root` (the card mount point on the device).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystem for SdCardFs {
    type File = SdFile;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<SdFile, StorageError> {
        let full = self.resolve(path);
        let mut opts = OpenOptions::new();
        match mode {
            OpenMode::Read => opts.read(true),
            OpenMode::Write => opts.write(true).create(true).truncate(true),
            OpenMode::Append => opts.append(true).create(true),
        };
        opts.open(&full)
            .map(|file| SdFile { file })
            .map_err(|e| {
                debug!("sd: open {} ({:?}) failed: {}", path, mode, e);
                map_open_err(&e)
            })
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Io,
        })
    }

    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError> {
        fs::create_dir_all(self.resolve(path)).map_err(|_| StorageError::DirCreateFailed)
    }

    fn list(&mut self, dir: &str) -> Result<Vec<FileName>, StorageError> {
        let entries = fs::read_dir(self.resolve(dir)).map_err(|e| map_open_err(&e))?;
        let mut names = Vec::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let mut owned = FileName::new();
            if owned.push_str(name).is_ok() {
                names.push(owned);
            }
        }
        Ok(names)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
