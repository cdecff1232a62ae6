//! Single-writer event queue between the GATT callbacks and the main loop.
//!
//! Bluedroid runs its callbacks on its own task. They only push events
//! here; the main loop is the single consumer and the only code that
//! mutates [`LinkSession`](super::session::LinkSession).
//!
//! ```text
//! ┌──────────────┐  LinkEvent  ┌──────────────┐
//! │ GATT task    │────────────▶│  Main loop   │
//! │ (callbacks)  │             │ (LinkSession)│
//! └──────────────┘             └──────────────┘
//! ```

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use super::Characteristic;
use super::transport::MAX_NOTIFY_LEN;

/// What the GATT layer reports to the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// The phone finished the MTU exchange.
    MtuChanged(u16),
    /// One ATT write, exactly as received.
    Write {
        characteristic: Characteristic,
        data: Vec<u8, MAX_NOTIFY_LEN>,
    },
    /// Writes to this characteristic were lost. Everything queued before
    /// the first lost write has already been delivered.
    Overrun(Characteristic),
}

/// Channel depth. A tile upload is stop-and-wait, so depth only matters
/// for control writes arriving in a burst.
const LINK_DEPTH: usize = 32;

/// Slots writes may never take, kept for connection events.
const LINK_RESERVED: usize = 2;

const NO_LINK_EVENT: u8 = 0;
const LINK_CONNECTED: u8 = 1;
const LINK_DISCONNECTED: u8 = 2;

/// Bounded event queue plus the out-of-band state that makes a full
/// queue visible to the consumer.
///
/// Once a write to a characteristic is refused, every later write to it
/// is refused too until [`drain`] has reported the [`LinkEvent::Overrun`].
/// The consumer therefore sees the queued prefix, then the overrun, and
/// never a stream with a silent hole in it. Connection events are never
/// lost: one that does not fit is parked and delivered after the queue.
pub struct LinkChannel {
    events: Channel<CriticalSectionRawMutex, LinkEvent, LINK_DEPTH>,
    overrun: [AtomicBool; Characteristic::ALL.len()],
    parked_link: AtomicU8,
    /// Zero when no MTU change is parked.
    parked_mtu: AtomicU16,
}

impl LinkChannel {
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            overrun: [const { AtomicBool::new(false) }; Characteristic::ALL.len()],
            parked_link: AtomicU8::new(NO_LINK_EVENT),
            parked_mtu: AtomicU16::new(0),
        }
    }

    fn has_parked(&self) -> bool {
        self.parked_link.load(Ordering::Acquire) != NO_LINK_EVENT
            || self.parked_mtu.load(Ordering::Acquire) != 0
    }

    /// Writes to `characteristic` are being refused until the next drain.
    pub fn is_overrun(&self, characteristic: Characteristic) -> bool {
        self.overrun_flag(characteristic).load(Ordering::Acquire)
    }

    fn overrun_flag(&self, characteristic: Characteristic) -> &AtomicBool {
        &self.overrun[characteristic.index()]
    }

    fn mark_overrun(&self, characteristic: Characteristic) {
        if !self.overrun_flag(characteristic).swap(true, Ordering::AcqRel) {
            warn!("BLE: {} writes lost, reassembly will restart", characteristic);
        }
    }
}

impl Default for LinkChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// GATT callbacks → main loop.
pub static LINK_CHANNEL: LinkChannel = LinkChannel::new();

/// Queue a raw write. Returns `false` when the write was refused; the
/// consumer will then see a [`LinkEvent::Overrun`] for `characteristic`.
pub fn push_write(channel: &LinkChannel, characteristic: Characteristic, bytes: &[u8]) -> bool {
    if channel.is_overrun(characteristic)
        || channel.has_parked()
        || channel.events.len() >= LINK_DEPTH - LINK_RESERVED
    {
        channel.mark_overrun(characteristic);
        return false;
    }
    let Ok(data) = Vec::from_slice(bytes) else {
        warn!("BLE: {} write of {} bytes too large", characteristic, bytes.len());
        channel.mark_overrun(characteristic);
        return false;
    };
    if channel
        .events
        .try_send(LinkEvent::Write {
            characteristic,
            data,
        })
        .is_err()
    {
        channel.mark_overrun(characteristic);
        return false;
    }
    true
}

/// Queue an event. Connection and MTU events always succeed, parked if
/// the queue is full; writes go through [`push_write`].
pub fn push(channel: &LinkChannel, event: LinkEvent) -> bool {
    let parked = match event {
        LinkEvent::MtuChanged(mtu) => {
            if !channel.has_parked() && channel.events.try_send(event).is_ok() {
                return true;
            }
            warn!("BLE: link queue full, MTU change parked");
            channel.parked_mtu.store(mtu.max(1), Ordering::Release);
            return true;
        }
        LinkEvent::Write {
            characteristic,
            data,
        } => return push_write(channel, characteristic, &data),
        LinkEvent::Overrun(characteristic) => {
            channel.mark_overrun(characteristic);
            return true;
        }
        LinkEvent::Connected => LINK_CONNECTED,
        LinkEvent::Disconnected => LINK_DISCONNECTED,
    };

    // Nothing may overtake an already parked event.
    if !channel.has_parked() && channel.events.try_send(event).is_ok() {
        return true;
    }
    warn!("BLE: link queue full, connection event parked");
    // An MTU parked earlier belongs to the connection that just ended.
    channel.parked_mtu.store(0, Ordering::Release);
    channel.parked_link.store(parked, Ordering::Release);
    true
}

/// Hand every queued event to `handle`, oldest first, followed by any
/// parked connection and MTU events and then the overruns.
pub fn drain(channel: &LinkChannel, mut handle: impl FnMut(LinkEvent)) -> usize {
    let mut n = 0;
    while let Ok(event) = channel.events.try_receive() {
        handle(event);
        n += 1;
    }

    match channel.parked_link.swap(NO_LINK_EVENT, Ordering::AcqRel) {
        LINK_CONNECTED => {
            handle(LinkEvent::Connected);
            n += 1;
        }
        LINK_DISCONNECTED => {
            handle(LinkEvent::Disconnected);
            n += 1;
        }
        _ => {}
    }
    match channel.parked_mtu.swap(0, Ordering::AcqRel) {
        0 => {}
        mtu => {
            handle(LinkEvent::MtuChanged(mtu));
            n += 1;
        }
    }

    for ch in Characteristic::ALL {
        if channel.overrun_flag(ch).swap(false, Ordering::AcqRel) {
            handle(LinkEvent::Overrun(ch));
            n += 1;
        }
    }
    n
}
