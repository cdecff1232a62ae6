//! Tile inventory: streams the binary tile index to the phone so it can
//! skip tiles the device already has.
//!
//! `START count(u32)`, DATA frames of whole 9-byte records, `END`;
//! `ERROR code(1)` on failure.

use log::warn;

use crate::app::ports::StorageFile;
use crate::error::{StorageError, TransferError};
use crate::storage::INDEX_RECORD_LEN;

use super::sender::{ChunkSource, Frame};

pub struct IndexSource<F: StorageFile> {
    /// `None` when no tile was ever saved.
    file: Option<F>,
    total: u32,
}

impl<F: StorageFile> IndexSource<F> {
    /// Wrap the result of opening the index. A missing index is an empty
    /// inventory; a trailing partial record is left out.
    pub fn new(opened: Result<F, StorageError>) -> Result<Self, TransferError> {
        let file = match opened {
            Ok(f) => f,
            Err(StorageError::NotFound) => return Ok(Self::empty()),
            Err(e) => {
                warn!("inventory: index unavailable ({})", e);
                return Err(TransferError::SourceUnavailable);
            }
        };
        let size = file.size().map_err(|_| TransferError::SourceUnavailable)?;
        let size = u32::try_from(size).map_err(|_| TransferError::SourceUnavailable)?;
        let total = size - size % INDEX_RECORD_LEN as u32;
        if total != size {
            warn!(
                "inventory: ignoring {} trailing bytes in index",
                size - total
            );
        }
        Ok(Self {
            file: Some(file),
            total,
        })
    }

    pub fn empty() -> Self {
        Self {
            file: None,
            total: 0,
        }
    }

    pub fn record_count(&self) -> u32 {
        self.total / INDEX_RECORD_LEN as u32
    }
}

impl<F: StorageFile> ChunkSource for IndexSource<F> {
    fn total_size(&self) -> u32 {
        self.total
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        match self.file.as_mut() {
            Some(f) => f.read(buf).map_err(|_| TransferError::ReadFailed),
            None => Ok(0),
        }
    }

    fn record_size(&self) -> usize {
        INDEX_RECORD_LEN
    }

    fn encode_start(&self, frame: &mut Frame) {
        let _ = frame.extend_from_slice(&self.record_count().to_be_bytes());
    }

    fn encode_error(error: TransferError, frame: &mut Frame) {
        let _ = frame.push(error.code());
    }
}
