//! Mock adapters for link integration tests.
//!
//! Every port records what it was asked to do so tests can assert on the
//! full history without an SD card, a radio or a display.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use velonav::app::ports::{
    DisplayPort, FileName, FileSystem, NavigationPort, NotificationPort, OpenMode, StorageFile,
};
use velonav::config::LinkConfig;
use velonav::error::{NotifyError, StorageError};
use velonav::link::Characteristic;
use velonav::link::notification::PhoneNotification;
use velonav::link::radar::RadarFrame;
use velonav::link::reassembler::BufferAllocator;
use velonav::link::session::{Collaborators, LinkSession};
use velonav::link::status::DeviceStatus;
use velonav::link::transport::{MAX_NOTIFY_LEN, Notifier};
use velonav::link::weather::WeatherReport;

// ── In-memory filesystem ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Open(OpenMode),
    Remove,
    Mkdir,
    List,
}

#[derive(Default)]
pub struct MemState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    /// Handles currently alive.
    pub open_handles: usize,
    /// The next N opens fail with `OpenFailed`.
    pub fail_opens: u32,
    /// Opens of this exact path always fail.
    pub broken_path: Option<String>,
    pub fail_writes: bool,
    pub ops: Vec<(FsOp, String)>,
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Shared-state filesystem; clones see the same files.
#[derive(Clone, Default)]
pub struct MemFs {
    state: Rc<RefCell<MemState>>,
}

#[allow(dead_code)]
impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::cell::RefMut<'_, MemState> {
        self.state.borrow_mut()
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        let mut s = self.state.borrow_mut();
        let mut dir = parent(path).to_string();
        while dir != "/" {
            s.dirs.insert(dir.clone());
            dir = parent(&dir).to_string();
        }
        s.files.insert(path.to_string(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn open_handles(&self) -> usize {
        self.state.borrow().open_handles
    }

    pub fn count(&self, op: FsOp) -> usize {
        self.state.borrow().ops.iter().filter(|(o, _)| *o == op).count()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }
}

pub struct MemFile {
    state: Rc<RefCell<MemState>>,
    path: String,
    cursor: usize,
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.state.borrow_mut().open_handles -= 1;
    }
}

impl StorageFile for MemFile {
    fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let mut s = self.state.borrow_mut();
        if s.fail_writes {
            return Err(StorageError::WriteFailed);
        }
        s.files
            .get_mut(&self.path)
            .ok_or(StorageError::WriteFailed)?
            .extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let s = self.state.borrow();
        let content = s.files.get(&self.path).ok_or(StorageError::ReadFailed)?;
        let n = buf.len().min(content.len().saturating_sub(self.cursor));
        buf[..n].copy_from_slice(&content[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn size(&self) -> Result<u64, StorageError> {
        let s = self.state.borrow();
        s.files
            .get(&self.path)
            .map(|c| c.len() as u64)
            .ok_or(StorageError::Io)
    }
}

impl FileSystem for MemFs {
    type File = MemFile;

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<MemFile, StorageError> {
        let mut s = self.state.borrow_mut();
        s.ops.push((FsOp::Open(mode), path.to_string()));
        if s.fail_opens > 0 {
            s.fail_opens -= 1;
            return Err(StorageError::OpenFailed);
        }
        if s.broken_path.as_deref() == Some(path) {
            return Err(StorageError::OpenFailed);
        }
        match mode {
            OpenMode::Read => {
                if !s.files.contains_key(path) {
                    return Err(StorageError::NotFound);
                }
            }
            OpenMode::Write | OpenMode::Append => {
                let dir = parent(path);
                if dir != "/" && !s.dirs.contains(dir) {
                    return Err(StorageError::NotFound);
                }
                let entry = s.files.entry(path.to_string()).or_default();
                if mode == OpenMode::Write {
                    entry.clear();
                }
            }
        }
        s.open_handles += 1;
        Ok(MemFile {
            state: Rc::clone(&self.state),
            path: path.to_string(),
            cursor: 0,
        })
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let mut s = self.state.borrow_mut();
        s.ops.push((FsOp::Remove, path.to_string()));
        s.files.remove(path).map(|_| ()).ok_or(StorageError::NotFound)
    }

    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError> {
        let mut s = self.state.borrow_mut();
        s.ops.push((FsOp::Mkdir, path.to_string()));
        let mut dir = path.to_string();
        while dir != "/" {
            s.dirs.insert(dir.clone());
            dir = parent(&dir).to_string();
        }
        Ok(())
    }

    fn list(&mut self, dir: &str) -> Result<Vec<FileName>, StorageError> {
        let mut s = self.state.borrow_mut();
        s.ops.push((FsOp::List, dir.to_string()));
        if !s.dirs.contains(dir) {
            return Err(StorageError::NotFound);
        }
        Ok(s.files
            .keys()
            .filter(|p| parent(p) == dir)
            .filter_map(|p| {
                let mut n = FileName::new();
                n.push_str(&p[dir.len() + 1..]).ok().map(|()| n)
            })
            .collect())
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Records every millisecond delay instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    pub calls: Rc<RefCell<Vec<u32>>>,
}

#[allow(dead_code)]
impl RecordingDelay {
    pub fn calls(&self) -> Vec<u32> {
        self.calls.borrow().clone()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls.borrow_mut().push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls.borrow_mut().push(ms);
    }
}

// ── Notifier ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Vec<(Characteristic, Vec<u8>)>,
    /// The next N notifications are refused as congested.
    pub refuse_next: u32,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn on(&self, ch: Characteristic) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|(c, _)| *c == ch)
            .map(|(_, f)| f.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<(), NotifyError> {
        if data.len() > MAX_NOTIFY_LEN {
            return Err(NotifyError::TooLarge);
        }
        if self.refuse_next > 0 {
            self.refuse_next -= 1;
            return Err(NotifyError::Congested);
        }
        self.sent.push((characteristic, data.to_vec()));
        Ok(())
    }
}

// ── Collaborators ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockNavigation {
    pub routes: Vec<Vec<u8>>,
    pub started: Vec<String>,
    pub stops: u32,
    pub stored: Vec<String>,
    pub active: Option<String>,
}

impl NavigationPort for MockNavigation {
    fn load_route(&mut self, gpx: &[u8]) {
        self.routes.push(gpx.to_vec());
    }

    fn start_trip(&mut self, name: &str) {
        self.started.push(name.to_string());
        self.active = Some(name.to_string());
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.active = None;
    }

    fn trip_stored(&mut self, name: &str) {
        self.stored.push(name.to_string());
    }

    fn active_trip(&self) -> Option<&str> {
        self.active.as_deref()
    }
}

#[derive(Default)]
pub struct MockNotifications {
    pub added: Vec<PhoneNotification>,
    pub dismissed: Vec<u32>,
}

impl NotificationPort for MockNotifications {
    fn add(&mut self, notification: &PhoneNotification) {
        self.added.push(notification.clone());
    }

    fn dismiss(&mut self, id: u32) {
        self.dismissed.push(id);
    }
}

#[derive(Default)]
pub struct MockDisplay {
    pub weather: Vec<WeatherReport>,
    pub radar: Vec<RadarFrame>,
    pub status: Vec<DeviceStatus>,
}

impl DisplayPort for MockDisplay {
    fn show_weather(&mut self, report: &WeatherReport) {
        self.weather.push(report.clone());
    }

    fn show_radar(&mut self, frame: &RadarFrame) {
        self.radar.push(frame.clone());
    }

    fn update_device_status(&mut self, status: &DeviceStatus) {
        self.status.push(*status);
    }
}

/// Allocator that never has memory.
pub struct FailingAllocator;

impl BufferAllocator for FailingAllocator {
    fn allocate(&mut self, _len: usize) -> Option<Vec<u8>> {
        None
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// A connected session wired to mocks.
pub struct Rig {
    pub session: LinkSession<MemFs, RecordingDelay>,
    pub fs: MemFs,
    pub delay: RecordingDelay,
    pub notifier: RecordingNotifier,
    pub nav: MockNavigation,
    pub notes: MockNotifications,
    pub display: MockDisplay,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::build(LinkConfig::default(), None)
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self::build(config, None)
    }

    pub fn without_memory() -> Self {
        Self::build(LinkConfig::default(), Some(Box::new(FailingAllocator)))
    }

    fn build(config: LinkConfig, alloc: Option<Box<dyn BufferAllocator>>) -> Self {
        let fs = MemFs::new();
        let delay = RecordingDelay::default();
        let mut session = match alloc {
            Some(a) => LinkSession::with_allocator(fs.clone(), delay.clone(), config, a),
            None => LinkSession::new(fs.clone(), delay.clone(), config),
        };
        session.on_connect();
        Self {
            session,
            fs,
            delay,
            notifier: RecordingNotifier::default(),
            nav: MockNavigation::default(),
            notes: MockNotifications::default(),
            display: MockDisplay::default(),
        }
    }

    pub fn write(&mut self, ch: Characteristic, data: &[u8]) {
        let mut io = Collaborators {
            notifier: &mut self.notifier,
            navigation: &mut self.nav,
            notifications: &mut self.notes,
            display: &mut self.display,
        };
        self.session.on_write(ch, data, &mut io);
    }

    /// Write `data` in MTU-sized pieces.
    pub fn write_chunked(&mut self, ch: Characteristic, data: &[u8], chunk: usize) {
        for piece in data.chunks(chunk.max(1)) {
            self.write(ch, piece);
        }
    }

    pub fn tick(&mut self, now_ms: u64) {
        let mut io = Collaborators {
            notifier: &mut self.notifier,
            navigation: &mut self.nav,
            notifications: &mut self.notes,
            display: &mut self.display,
        };
        self.session.tick(now_ms, &mut io);
    }

    /// Tick every `step` ms until both senders are idle or `limit` ticks pass.
    pub fn run(&mut self, start_ms: u64, step: u64, limit: usize) -> u64 {
        let mut now = start_ms;
        for _ in 0..limit {
            self.tick(now);
            now += step;
            if !self.session.inventory().is_active() && !self.session.recording().is_active() {
                break;
            }
        }
        now
    }
}
