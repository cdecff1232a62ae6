//! Fuzz target: `LinkSession::on_write` and `tick`
//!
//! Input is a sequence of `[characteristic][len][bytes..]` records played
//! against a connected session backed by a write-only filesystem. Any
//! sequence must leave the session able to reset back to quiescent.
//!
//! cargo fuzz run fuzz_session_writes

#![no_main]

use embedded_hal::delay::DelayNs;
use libfuzzer_sys::fuzz_target;
use velonav::adapters::log_sink::{LogDisplay, LogNavigation, LogNotifications};
use velonav::app::ports::{FileName, FileSystem, OpenMode, StorageFile};
use velonav::config::LinkConfig;
use velonav::error::StorageError;
use velonav::link::Characteristic;
use velonav::link::session::{Collaborators, LinkSession};
use velonav::link::transport::NullNotifier;

// ── Write-only FileSystem for fuzz testing ────────────────────

/// Accepts every write and forgets it; reads see an empty card.
#[derive(Default)]
struct SinkFs;

struct MemFile {
    data: Vec<u8>,
    pos: usize,
}

impl StorageFile for MemFile {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }
}

impl FileSystem for SinkFs {
    type File = MemFile;

    fn open(&mut self, _path: &str, mode: OpenMode) -> Result<MemFile, StorageError> {
        match mode {
            OpenMode::Read => Err(StorageError::NotFound),
            OpenMode::Write | OpenMode::Append => Ok(MemFile { data: Vec::new(), pos: 0 }),
        }
    }

    fn remove(&mut self, _path: &str) -> Result<(), StorageError> {
        Err(StorageError::NotFound)
    }

    fn create_dir_all(&mut self, _path: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn list(&mut self, _dir: &str) -> Result<Vec<FileName>, StorageError> {
        Ok(Vec::new())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

fuzz_target!(|data: &[u8]| {
    let mut session = LinkSession::new(SinkFs, NoDelay, LinkConfig::default());
    let mut notifier = NullNotifier;
    let mut nav = LogNavigation::default();
    let mut notes = LogNotifications::default();
    let mut display = LogDisplay;
    let mut io = Collaborators {
        notifier: &mut notifier,
        navigation: &mut nav,
        notifications: &mut notes,
        display: &mut display,
    };

    session.on_connect();
    let mut rest = data;
    let mut now = 0;
    while let [sel, len, tail @ ..] = rest {
        let ch = Characteristic::ALL[usize::from(*sel) % Characteristic::ALL.len()];
        let n = usize::from(*len).min(tail.len());
        session.on_write(ch, &tail[..n], &mut io);
        now += 10;
        session.tick(now, &mut io);
        rest = &tail[n..];
    }

    session.reset();
    assert!(session.is_quiescent());
});
