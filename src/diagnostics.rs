//! Link counters and the per-session summary.
//!
//! Every reassembler keeps its own [`RxStats`]; the session aggregates
//! them with its own transfer and storage counters into [`LinkStats`] and
//! logs a single summary line when the phone disconnects.

use log::info;

/// Counters for one inbound characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Messages fully reassembled and dispatched.
    pub completed: u32,
    /// Messages consumed in skip mode (allocation failed).
    pub skipped: u32,
    /// Headers that failed validation.
    pub rejected: u32,
    /// Bytes discarded by the first-byte pre-check.
    pub stray_bytes: u32,
    /// Reassembly buffers that could not be allocated.
    pub alloc_failures: u32,
}

impl RxStats {
    pub fn merge(&mut self, other: &Self) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
        self.stray_bytes += other.stray_bytes;
        self.alloc_failures += other.alloc_failures;
    }
}

/// Session-wide counters. Cleared on every connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub tiles_saved: u32,
    pub trips_saved: u32,
    pub storage_failures: u32,
    pub decode_failures: u32,
    /// Writes lost before they reached the session.
    pub overruns: u32,
    pub commands: u32,
    pub bad_commands: u32,
    pub frames_sent: u32,
    pub notify_failures: u32,
    pub transfers_completed: u32,
    pub transfers_aborted: u32,
}

impl LinkStats {
    /// Log one summary line for a finished session.
    pub fn log_summary(&self, rx: &RxStats) {
        info!(
            "link: session rx {} ok/{} skip/{} bad/{} stray/{} overrun | tiles {} trips {} | \
             sd fail {} rle fail {} | cmds {} ({} bad) | tx {} frames, {} notify fail | \
             xfer {} done/{} aborted",
            rx.completed,
            rx.skipped,
            rx.rejected,
            rx.stray_bytes,
            self.overruns,
            self.tiles_saved,
            self.trips_saved,
            self.storage_failures,
            self.decode_failures,
            self.commands,
            self.bad_commands,
            self.frames_sent,
            self.notify_failures,
            self.transfers_completed,
            self.transfers_aborted,
        );
    }
}
