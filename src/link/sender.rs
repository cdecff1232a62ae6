//! Paced, chunked outbound transfers.
//!
//! ```text
//! START (source metadata)
//! DATA  chunk 1          ─┐
//! DATA  chunk 2           │ one per tick, at least `min_interval_ms` apart
//! ...                    ─┘
//! END                     when bytes_sent == total_size
//! ERROR (source-specific) on a read failure, then back to idle
//! ```
//!
//! A transfer owns its source, so the open file handles close exactly
//! when the transfer ends, fails or is reset.

use log::{debug, info, warn};

use crate::error::TransferError;

use super::Characteristic;
use super::transport::{MAX_NOTIFY_LEN, Notifier};

pub const ACTION_START: u8 = 0x01;
pub const ACTION_DATA: u8 = 0x02;
pub const ACTION_END: u8 = 0x03;
pub const ACTION_ERROR: u8 = 0x04;

pub type Frame = heapless::Vec<u8, MAX_NOTIFY_LEN>;

/// Largest DATA payload that still fits one notification.
pub const MAX_DATA_LEN: usize = MAX_NOTIFY_LEN - 1;

/// Something a [`ChunkSender`] can stream.
pub trait ChunkSource {
    /// Bytes the transfer will carry in DATA frames.
    fn total_size(&self) -> u32;

    /// Read the next bytes of the stream. `Ok(0)` before `total_size`
    /// bytes were read is a truncated source.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError>;

    /// DATA payloads are a whole multiple of this.
    fn record_size(&self) -> usize {
        1
    }

    /// Body of the START frame, after the action byte.
    fn encode_start(&self, frame: &mut Frame);

    /// Body of an ERROR frame, after the action byte.
    fn encode_error(error: TransferError, frame: &mut Frame);
}

/// Rate and size limits for one sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_interval_ms: u32,
    pub max_chunk: usize,
}

/// What one [`ChunkSender::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    /// Paced out, or a notify was refused and will be retried.
    Waiting,
    Sent,
    Finished,
    Aborted(TransferError),
}

struct Transfer<S> {
    source: S,
    total: u32,
    sent: u32,
    last_send_ms: u64,
    /// DATA frame read from the source but not yet accepted by the stack.
    pending: Option<Frame>,
}

pub struct ChunkSender<S: ChunkSource> {
    characteristic: Characteristic,
    pacing: Pacing,
    active: Option<Transfer<S>>,
}

impl<S: ChunkSource> ChunkSender<S> {
    pub fn new(characteristic: Characteristic, pacing: Pacing) -> Self {
        Self {
            characteristic,
            pacing: Pacing {
                min_interval_ms: pacing.min_interval_ms,
                max_chunk: pacing.max_chunk.clamp(1, MAX_DATA_LEN),
            },
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn bytes_sent(&self) -> Option<u32> {
        self.active.as_ref().map(|t| t.sent)
    }

    pub fn total_size(&self) -> Option<u32> {
        self.active.as_ref().map(|t| t.total)
    }

    pub fn source(&self) -> Option<&S> {
        self.active.as_ref().map(|t| &t.source)
    }

    /// Begin streaming `source`.
    ///
    /// Refused while another transfer is running: the running one is left
    /// untouched and `source` is dropped without any frame being sent.
    pub fn start(
        &mut self,
        source: S,
        now_ms: u64,
        notifier: &mut dyn Notifier,
    ) -> Result<(), TransferError> {
        if self.is_active() {
            warn!("{}: transfer already running, start ignored", self.characteristic);
            return Err(TransferError::AlreadyActive);
        }

        let mut frame = Frame::new();
        let _ = frame.push(ACTION_START);
        source.encode_start(&mut frame);
        if let Err(e) = notifier.notify(self.characteristic, &frame) {
            warn!("{}: START not sent ({})", self.characteristic, e);
            return Err(TransferError::StartRejected);
        }

        let total = source.total_size();
        info!("{}: transfer started, {} bytes", self.characteristic, total);
        self.active = Some(Transfer {
            source,
            total,
            sent: 0,
            last_send_ms: now_ms,
            pending: None,
        });
        Ok(())
    }

    /// Send one ERROR frame outside any transfer, e.g. when the source
    /// could not even be opened.
    pub fn reject(&self, error: TransferError, notifier: &mut dyn Notifier) {
        send_error::<S>(self.characteristic, error, notifier);
    }

    /// Advance the transfer by at most one DATA frame.
    pub fn tick(&mut self, now_ms: u64, notifier: &mut dyn Notifier) -> TickOutcome {
        let ch = self.characteristic;
        let Some(t) = self.active.as_mut() else {
            return TickOutcome::Idle;
        };
        if now_ms.saturating_sub(t.last_send_ms) < u64::from(self.pacing.min_interval_ms) {
            return TickOutcome::Waiting;
        }

        if t.pending.is_none() {
            if t.sent == t.total {
                return self.finish(notifier);
            }
            match next_frame(t, self.pacing.max_chunk) {
                Ok(frame) => t.pending = Some(frame),
                Err(e) => return self.abort(e, notifier),
            }
        }

        let Some(frame) = t.pending.as_ref() else {
            return TickOutcome::Waiting;
        };
        t.last_send_ms = now_ms;
        if let Err(e) = notifier.notify(ch, frame) {
            debug!("{}: DATA deferred ({})", ch, e);
            return TickOutcome::Waiting;
        }
        t.sent += (frame.len() - 1) as u32;
        t.pending = None;

        if t.sent == t.total {
            return self.finish(notifier);
        }
        TickOutcome::Sent
    }

    /// Drop the transfer without sending anything.
    pub fn reset(&mut self) {
        if self.active.take().is_some() {
            debug!("{}: transfer dropped", self.characteristic);
        }
    }

    fn finish(&mut self, notifier: &mut dyn Notifier) -> TickOutcome {
        self.active = None;
        if let Err(e) = notifier.notify(self.characteristic, &[ACTION_END]) {
            warn!("{}: END not sent ({})", self.characteristic, e);
        }
        info!("{}: transfer complete", self.characteristic);
        TickOutcome::Finished
    }

    fn abort(&mut self, error: TransferError, notifier: &mut dyn Notifier) -> TickOutcome {
        self.active = None;
        warn!("{}: transfer aborted ({})", self.characteristic, error);
        send_error::<S>(self.characteristic, error, notifier);
        TickOutcome::Aborted(error)
    }
}

fn send_error<S: ChunkSource>(ch: Characteristic, error: TransferError, notifier: &mut dyn Notifier) {
    let mut frame = Frame::new();
    let _ = frame.push(ACTION_ERROR);
    S::encode_error(error, &mut frame);
    if let Err(e) = notifier.notify(ch, &frame) {
        warn!("{}: ERROR not sent ({})", ch, e);
    }
}

/// Read the next DATA frame: `min(remaining, max_chunk)` bytes, rounded
/// down to whole records.
fn next_frame<S: ChunkSource>(t: &mut Transfer<S>, max_chunk: usize) -> Result<Frame, TransferError> {
    let remaining = (t.total - t.sent) as usize;
    let record = t.source.record_size().max(1);
    let mut len = remaining.min(max_chunk);
    len -= len % record;
    if len == 0 {
        return Err(TransferError::Truncated);
    }

    let mut frame = Frame::new();
    let _ = frame.push(ACTION_DATA);
    let _ = frame.resize(1 + len, 0);
    let mut filled = 0;
    while filled < len {
        match t.source.read(&mut frame[1 + filled..])? {
            0 => return Err(TransferError::Truncated),
            n => filled += n,
        }
    }
    Ok(frame)
}
