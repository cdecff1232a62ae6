//! Recorded track download.
//!
//! A recording is two files streamed as one: the optional `.json`
//! metadata, then the `.gpx` track. One cumulative cursor decides which
//! file the next read comes from.
//!
//! `START nameLen(1) name metaSize(u32) gpxSize(u32)`, DATA, `END`;
//! `ERROR len(1) msg` on failure.

use crate::app::ports::{AssetName, StorageFile};
use crate::error::{StorageError, TransferError};
use crate::storage::RecordingFiles;

use super::sender::{ChunkSource, Frame};

/// Which file the cursor is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Meta,
    Gpx,
    Done,
}

pub struct RecordingSource<F: StorageFile> {
    name: AssetName,
    meta: Option<F>,
    gpx: F,
    meta_size: u32,
    gpx_size: u32,
    cursor: u32,
}

fn size_of<F: StorageFile>(file: &F) -> Result<u32, TransferError> {
    let size = file.size().map_err(|_| TransferError::SourceUnavailable)?;
    u32::try_from(size).map_err(|_| TransferError::SourceUnavailable)
}

impl<F: StorageFile> RecordingSource<F> {
    pub fn new(name: AssetName, opened: Result<RecordingFiles<F>, StorageError>) -> Result<Self, TransferError> {
        let files = opened.map_err(|_| TransferError::SourceUnavailable)?;
        let meta_size = match &files.meta {
            Some(f) => size_of(f)?,
            None => 0,
        };
        let gpx_size = size_of(&files.gpx)?;
        if meta_size.checked_add(gpx_size).is_none() {
            return Err(TransferError::SourceUnavailable);
        }
        Ok(Self {
            name,
            meta: files.meta,
            gpx: files.gpx,
            meta_size,
            gpx_size,
            cursor: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segment(&self) -> Segment {
        if self.cursor < self.meta_size {
            Segment::Meta
        } else if self.cursor < self.meta_size + self.gpx_size {
            Segment::Gpx
        } else {
            Segment::Done
        }
    }
}

impl<F: StorageFile> ChunkSource for RecordingSource<F> {
    fn total_size(&self) -> u32 {
        self.meta_size + self.gpx_size
    }

    /// Reads never cross the meta/gpx boundary; the sender simply calls
    /// again for the rest of its chunk.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        let (file, left) = match self.segment() {
            Segment::Meta => match self.meta.as_mut() {
                Some(f) => (f, self.meta_size - self.cursor),
                None => return Err(TransferError::ReadFailed),
            },
            Segment::Gpx => (&mut self.gpx, self.meta_size + self.gpx_size - self.cursor),
            Segment::Done => return Ok(0),
        };
        let want = buf.len().min(left as usize);
        let n = file.read(&mut buf[..want]).map_err(|_| TransferError::ReadFailed)?;
        if n == 0 && want > 0 {
            return Err(TransferError::Truncated);
        }
        self.cursor += n as u32;
        Ok(n)
    }

    fn encode_start(&self, frame: &mut Frame) {
        let _ = frame.push(self.name.len() as u8);
        let _ = frame.extend_from_slice(self.name.as_bytes());
        let _ = frame.extend_from_slice(&self.meta_size.to_be_bytes());
        let _ = frame.extend_from_slice(&self.gpx_size.to_be_bytes());
    }

    fn encode_error(error: TransferError, frame: &mut Frame) {
        let msg = error.message();
        let _ = frame.push(msg.len() as u8);
        let _ = frame.extend_from_slice(msg.as_bytes());
    }
}
