//! Per-connection link state.
//!
//! [`LinkSession`] owns one reassembler per inbound characteristic, both
//! outbound senders, the asset store and the request flags. It is driven
//! from exactly one place, the main loop:
//!
//! ```text
//! loop {
//!     drain(LINK_CHANNEL) ─▶ session.handle(event)   // writes, connect/disconnect
//!     session.tick(now)                              // deferred requests, senders
//! }
//! ```
//!
//! Connect and disconnect both reset everything. No partial message,
//! buffer, open file or pending request survives from one phone session
//! to the next.

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::{AssetName, DisplayPort, FileSystem, NavigationPort, NotificationPort};
use crate::config::LinkConfig;
use crate::diagnostics::{LinkStats, RxStats};
use crate::error::FrameError;
use crate::storage::AssetStore;

use super::channels::LinkEvent;
use super::control::{self, ControlFrame, RecordingCommand, TripCommand};
use super::inventory::IndexSource;
use super::notification::{self, NotificationAction, NotificationFrame, PhoneNotification};
use super::radar::RadarFrame;
use super::reassembler::{
    Assembled, BufferAllocator, FixedRecord, FixedStruct, HeapAllocator, Limits, Phase,
    Reassembler,
};
use super::recording::RecordingSource;
use super::sender::{ChunkSender, Pacing, TickOutcome};
use super::status::DeviceStatus;
use super::tile::{self, TileFrame};
use super::transport::{ATT_MAX_MTU, ATT_WRITE_OVERHEAD, Notifier};
use super::trip::{self, TripFrame, TripOutcome};
use super::weather::WeatherReport;
use super::wire::be_u32;
use super::Characteristic;

/// Everything the session calls out to while handling one event.
pub struct Collaborators<'a> {
    pub notifier: &'a mut dyn Notifier,
    pub navigation: &'a mut dyn NavigationPort,
    pub notifications: &'a mut dyn NotificationPort,
    pub display: &'a mut dyn DisplayPort,
}

/// Requests and one-shot markers for the current connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// The phone app sent READY and listens on the control characteristics.
    pub peer_ready: bool,
    pub list_sent: bool,
    pub active_trip_sent: bool,
    pub pending_inventory: bool,
    pub pending_recording_list: bool,
    pub pending_download: Option<AssetName>,
}

/// No limit: fixed-size records declare their own length.
const UNBOUNDED: Limits = Limits::new(u32::MAX);

pub struct LinkSession<F: FileSystem, D: DelayNs> {
    config: LinkConfig,
    store: AssetStore<F, D>,
    alloc: Box<dyn BufferAllocator>,

    tile: Reassembler<TileFrame>,
    trip: Reassembler<TripFrame>,
    weather: Reassembler<FixedStruct<WeatherReport>>,
    radar: Reassembler<FixedStruct<RadarFrame>>,
    status: Reassembler<FixedStruct<DeviceStatus>>,
    notification: Reassembler<NotificationFrame>,

    inventory: ChunkSender<IndexSource<F::File>>,
    recording: ChunkSender<RecordingSource<F::File>>,

    flags: SessionFlags,
    connected: bool,
    /// Longest value one ATT write can carry on this connection.
    max_write: usize,
    stats: LinkStats,
}

fn max_write_for(mtu: u16) -> usize {
    usize::from(mtu.saturating_sub(ATT_WRITE_OVERHEAD))
}

impl<F: FileSystem, D: DelayNs> LinkSession<F, D> {
    pub fn new(fs: F, delay: D, config: LinkConfig) -> Self {
        let alloc = Box::new(HeapAllocator::new(config.max_buffer_bytes as usize));
        Self::with_allocator(fs, delay, config, alloc)
    }

    pub fn with_allocator(
        fs: F,
        delay: D,
        config: LinkConfig,
        alloc: Box<dyn BufferAllocator>,
    ) -> Self {
        let inventory_pacing = Pacing {
            min_interval_ms: config.inventory_interval_ms,
            max_chunk: usize::from(config.inventory_records_per_chunk)
                * crate::storage::INDEX_RECORD_LEN,
        };
        let recording_pacing = Pacing {
            min_interval_ms: config.recording_interval_ms,
            max_chunk: usize::from(config.recording_chunk_bytes),
        };
        Self {
            store: AssetStore::new(fs, delay, &config),
            alloc,
            tile: Reassembler::new(Limits::new(config.max_tile_payload)),
            trip: Reassembler::new(Limits::new(config.max_trip_payload)),
            weather: Reassembler::new(UNBOUNDED),
            radar: Reassembler::new(UNBOUNDED),
            status: Reassembler::new(UNBOUNDED),
            notification: Reassembler::new(UNBOUNDED),
            inventory: ChunkSender::new(Characteristic::TileInventory, inventory_pacing),
            recording: ChunkSender::new(Characteristic::RecordingTransfer, recording_pacing),
            flags: SessionFlags::default(),
            connected: false,
            max_write: max_write_for(ATT_MAX_MTU),
            stats: LinkStats::default(),
            config,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn inventory(&self) -> &ChunkSender<IndexSource<F::File>> {
        &self.inventory
    }

    pub fn recording(&self) -> &ChunkSender<RecordingSource<F::File>> {
        &self.recording
    }

    /// Reassembly phase of an inbound characteristic. `None` for control
    /// and outbound-only characteristics, which never buffer.
    pub fn rx_phase(&self, ch: Characteristic) -> Option<Phase> {
        match ch {
            Characteristic::Tile => Some(self.tile.phase()),
            Characteristic::Trip => Some(self.trip.phase()),
            Characteristic::Weather => Some(self.weather.phase()),
            Characteristic::Radar => Some(self.radar.phase()),
            Characteristic::DeviceStatus => Some(self.status.phase()),
            Characteristic::Notification => Some(self.notification.phase()),
            _ => None,
        }
    }

    /// Sum of every reassembler's counters.
    pub fn rx_stats(&self) -> RxStats {
        let mut total = RxStats::default();
        for s in [
            self.tile.stats(),
            self.trip.stats(),
            self.weather.stats(),
            self.radar.stats(),
            self.status.stats(),
            self.notification.stats(),
        ] {
            total.merge(s);
        }
        total
    }

    /// Whether anything is buffered or streaming.
    pub fn is_quiescent(&self) -> bool {
        self.tile.is_idle()
            && self.trip.is_idle()
            && self.weather.is_idle()
            && self.radar.is_idle()
            && self.status.is_idle()
            && self.notification.is_idle()
            && !self.inventory.is_active()
            && !self.recording.is_active()
    }

    // ── Connection lifecycle ──────────────────────────────────

    pub fn on_connect(&mut self) {
        self.reset();
        self.stats = LinkStats::default();
        self.tile.clear_stats();
        self.trip.clear_stats();
        self.weather.clear_stats();
        self.radar.clear_stats();
        self.status.clear_stats();
        self.notification.clear_stats();
        // Until the phone's MTU exchange says otherwise.
        self.max_write = max_write_for(ATT_MAX_MTU);
        self.connected = true;
        info!("link: phone connected");
    }

    pub fn on_disconnect(&mut self) {
        info!("link: phone disconnected");
        self.stats.log_summary(&self.rx_stats());
        self.reset();
        self.connected = false;
    }

    /// Drop every partial message, transfer and request.
    pub fn reset(&mut self) {
        self.tile.reset();
        self.trip.reset();
        self.weather.reset();
        self.radar.reset();
        self.status.reset();
        self.notification.reset();
        self.inventory.reset();
        self.recording.reset();
        self.flags = SessionFlags::default();
    }

    pub fn handle(&mut self, event: LinkEvent, io: &mut Collaborators<'_>) {
        match event {
            LinkEvent::Connected => self.on_connect(),
            LinkEvent::Disconnected => self.on_disconnect(),
            LinkEvent::Write {
                characteristic,
                data,
            } => self.on_write(characteristic, &data, io),
            LinkEvent::MtuChanged(mtu) => self.on_mtu(mtu),
            LinkEvent::Overrun(characteristic) => self.on_overrun(characteristic),
        }
    }

    pub fn on_mtu(&mut self, mtu: u16) {
        self.max_write = max_write_for(mtu);
        debug!("link: MTU {}, writes up to {} bytes", mtu, self.max_write);
    }

    /// Writes to `ch` were lost upstream. Drop the half-assembled message;
    /// the next write starts a fresh one.
    pub fn on_overrun(&mut self, ch: Characteristic) {
        self.stats.overruns += 1;
        warn!("{}: writes lost, partial message dropped", ch);
        match ch {
            Characteristic::Tile => self.tile.reset(),
            Characteristic::Trip => self.trip.reset(),
            Characteristic::Weather => self.weather.reset(),
            Characteristic::Radar => self.radar.reset(),
            Characteristic::DeviceStatus => self.status.reset(),
            Characteristic::Notification => self.notification.reset(),
            Characteristic::TripControl
            | Characteristic::RecordingControl
            | Characteristic::TileInventory
            | Characteristic::RecordingTransfer => {}
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Route one GATT write to its characteristic's protocol.
    pub fn on_write(&mut self, ch: Characteristic, data: &[u8], io: &mut Collaborators<'_>) {
        if data.is_empty() {
            return;
        }
        let alloc = &mut *self.alloc;

        match ch {
            Characteristic::Tile => {
                let capacity = self.config.tile_bitmap_capacity as usize;
                self.tile.feed(data, alloc, |frame| {
                    tile::deliver(frame, &mut self.store, capacity, io.notifier, &mut self.stats);
                });
            }

            Characteristic::Trip => {
                self.trip.feed(data, alloc, |frame| {
                    let outcome =
                        trip::deliver(frame, &mut self.store, io.navigation, &mut self.stats);
                    if let TripOutcome::Stored(_) = outcome {
                        // Re-announce the list so the phone sees the new trip.
                        self.flags.list_sent = false;
                    }
                });
            }

            Characteristic::Weather => {
                self.weather.feed(data, alloc, |frame| {
                    if let Some(report) = record::<WeatherReport>(frame) {
                        io.display.show_weather(&report);
                    }
                });
            }

            Characteristic::Radar => {
                self.radar.feed(data, alloc, |frame| {
                    if let Some(radar) = record::<RadarFrame>(frame) {
                        io.display.show_radar(&radar);
                    }
                });
            }

            Characteristic::DeviceStatus => {
                self.status.feed(data, alloc, |frame| {
                    if let Some(status) = record::<DeviceStatus>(frame) {
                        io.display.update_device_status(&status);
                    }
                });
            }

            Characteristic::Notification => {
                // A write that fills the MTU may be the first chunk of a
                // longer add, so only a shorter one can be a whole legacy add.
                if self.notification.is_idle() && data.len() < self.max_write {
                    if let Some(n) = notification::parse_legacy_write(data) {
                        debug!("notification: legacy add {}", n.id);
                        io.notifications.add(&n);
                        return;
                    }
                }
                self.notification.feed(data, alloc, |frame| {
                    deliver_notification(frame, io.notifications);
                });
            }

            Characteristic::TripControl => match TripCommand::parse(data) {
                Ok(cmd) => self.on_trip_command(cmd, io.navigation),
                Err(e) => self.bad_command(ch, e),
            },

            Characteristic::RecordingControl => match RecordingCommand::parse(data) {
                Ok(cmd) => self.on_recording_command(cmd),
                Err(e) => self.bad_command(ch, e),
            },

            Characteristic::TileInventory | Characteristic::RecordingTransfer => {
                warn!("link: write to notify-only {} ignored", ch);
            }
        }
    }

    fn on_trip_command(&mut self, cmd: TripCommand, navigation: &mut dyn NavigationPort) {
        self.stats.commands += 1;
        debug!("trip-ctl: {:?}", cmd);
        match cmd {
            TripCommand::Stop => {
                navigation.stop();
                self.flags.active_trip_sent = false;
            }
            TripCommand::Start(name) => {
                navigation.start_trip(&name);
                self.flags.active_trip_sent = false;
            }
            TripCommand::Ready => {
                self.flags.peer_ready = true;
                self.flags.list_sent = false;
                self.flags.active_trip_sent = false;
            }
            TripCommand::Inventory => self.flags.pending_inventory = true,
        }
    }

    fn on_recording_command(&mut self, cmd: RecordingCommand) {
        self.stats.commands += 1;
        debug!("rec-ctl: {:?}", cmd);
        match cmd {
            RecordingCommand::List => self.flags.pending_recording_list = true,
            RecordingCommand::Download(name) => self.flags.pending_download = Some(name),
        }
    }

    fn bad_command(&mut self, ch: Characteristic, e: FrameError) {
        warn!("{}: command dropped ({})", ch, e);
        self.stats.bad_commands += 1;
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Serve deferred requests, then advance both senders by one step.
    pub fn tick(&mut self, now_ms: u64, io: &mut Collaborators<'_>) {
        if !self.connected {
            return;
        }
        self.serve_requests(now_ms, io);

        let outcomes = [
            self.inventory.tick(now_ms, io.notifier),
            self.recording.tick(now_ms, io.notifier),
        ];
        for outcome in outcomes {
            match outcome {
                TickOutcome::Sent => self.stats.frames_sent += 1,
                TickOutcome::Finished => {
                    self.stats.frames_sent += 1;
                    self.stats.transfers_completed += 1;
                }
                TickOutcome::Aborted(_) => self.stats.transfers_aborted += 1,
                TickOutcome::Idle | TickOutcome::Waiting => {}
            }
        }
    }

    fn serve_requests(&mut self, now_ms: u64, io: &mut Collaborators<'_>) {
        if core::mem::take(&mut self.flags.pending_inventory) {
            self.start_inventory(now_ms, io.notifier);
        }

        if let Some(name) = self.flags.pending_download.take() {
            self.start_download(name, now_ms, io.notifier);
        }

        if core::mem::take(&mut self.flags.pending_recording_list) {
            let names = self.store.recording_names().unwrap_or_else(|e| {
                warn!("rec-ctl: cannot list recordings ({})", e);
                Vec::new()
            });
            if !self.send_list(Characteristic::RecordingControl, &names, io.notifier) {
                self.flags.pending_recording_list = true;
            }
        }

        if !self.flags.peer_ready {
            return;
        }
        if !self.flags.list_sent {
            let names = self.store.trip_names().unwrap_or_else(|e| {
                warn!("trip-ctl: cannot list trips ({})", e);
                Vec::new()
            });
            self.flags.list_sent = self.send_list(Characteristic::TripControl, &names, io.notifier);
        }
        if !self.flags.active_trip_sent {
            let frame = control::active_trip_frame(io.navigation.active_trip());
            self.flags.active_trip_sent = self.send(Characteristic::TripControl, &frame, io.notifier);
        }
    }

    fn start_inventory(&mut self, now_ms: u64, notifier: &mut dyn Notifier) {
        if self.inventory.is_active() {
            warn!("inventory: request ignored, transfer running");
            return;
        }
        let started = match IndexSource::new(self.store.open_index()) {
            Ok(src) => self.inventory.start(src, now_ms, notifier),
            Err(e) => {
                self.inventory.reject(e, notifier);
                Err(e)
            }
        };
        self.count_start(started.is_ok());
    }

    fn start_download(&mut self, name: AssetName, now_ms: u64, notifier: &mut dyn Notifier) {
        if self.recording.is_active() {
            warn!("rec-xfer: download of '{}' ignored, transfer running", name);
            return;
        }
        let opened = self.store.open_recording(&name);
        let started = match RecordingSource::new(name, opened) {
            Ok(src) => self.recording.start(src, now_ms, notifier),
            Err(e) => {
                warn!("rec-xfer: cannot open recording ({})", e);
                self.recording.reject(e, notifier);
                Err(e)
            }
        };
        self.count_start(started.is_ok());
    }

    fn count_start(&mut self, ok: bool) {
        if ok {
            self.stats.frames_sent += 1;
        } else {
            self.stats.transfers_aborted += 1;
        }
    }

    /// LIST_START, one entry per name, LIST_END. Stops at the first
    /// refused notify so the caller can retry the whole list.
    fn send_list(
        &mut self,
        ch: Characteristic,
        names: &[AssetName],
        notifier: &mut dyn Notifier,
    ) -> bool {
        self.send(ch, &control::list_start_frame(names.len()), notifier)
            && names
                .iter()
                .all(|n| self.send(ch, &control::list_entry_frame(n), notifier))
            && self.send(ch, &control::list_end_frame(), notifier)
    }

    fn send(&mut self, ch: Characteristic, frame: &ControlFrame, notifier: &mut dyn Notifier) -> bool {
        match notifier.notify(ch, frame) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                warn!("{}: frame not sent ({})", ch, e);
                self.stats.notify_failures += 1;
                false
            }
        }
    }
}

fn record<T: FixedRecord>(frame: Assembled<()>) -> Option<T> {
    match frame {
        Assembled::Complete { payload, .. } => Some(T::parse(&payload)),
        Assembled::Skipped { .. } => {
            warn!("{}: dropped, no buffer", T::NAME);
            None
        }
    }
}

fn deliver_notification(frame: Assembled<NotificationAction>, port: &mut dyn NotificationPort) {
    match frame {
        Assembled::Complete {
            header: NotificationAction::Add,
            payload,
        } => match PhoneNotification::parse(&payload) {
            Some(n) => port.add(&n),
            None => warn!("notification: malformed add"),
        },
        Assembled::Complete {
            header: NotificationAction::Dismiss,
            payload,
        } => port.dismiss(be_u32(&payload, 0)),
        Assembled::Skipped { header, .. } => {
            warn!("notification: {:?} dropped, no buffer", header);
        }
    }
}
