//! Inbound message reassembly.
//!
//! BLE writes arrive as MTU-bounded chunks with no framing of their own.
//! Each inbound characteristic owns one [`Reassembler`] that turns a
//! sequence of [`feed`](Reassembler::feed) calls into complete messages:
//!
//! ```text
//!   AwaitingHeader ──(header complete)──▶ validate
//!        ▲                                  │ bad ──▶ AwaitingHeader
//!        │                                  ▼
//!        │                 allocate ── ok ──▶ Accumulating ─┐
//!        │                    │                              │ len reached
//!        │                    └─ fail ─▶ Skipping ───────────┤
//!        │                                                   ▼
//!        └──────────────── reset, then on_frame(Assembled) ◀─┘
//! ```
//!
//! The payload buffer is owned by the state itself. It moves out to the
//! dispatcher on completion, and dropping the state (reset, disconnect,
//! rejection) releases it, so there is exactly one release path.

use core::fmt;
use core::marker::PhantomData;

use log::{debug, warn};

use crate::diagnostics::RxStats;
use crate::error::FrameError;

/// Largest fixed header of any inbound protocol.
pub const MAX_HEADER_LEN: usize = 16;

/// Per-protocol bounds applied when a header is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest payload the header may declare.
    pub max_payload: u32,
}

impl Limits {
    pub const fn new(max_payload: u32) -> Self {
        Self { max_payload }
    }
}

/// Wire shape of one inbound protocol.
pub trait FrameSpec {
    /// Routing metadata carried from header to dispatch.
    type Header: Copy + fmt::Debug;

    /// Short tag for log lines.
    const NAME: &'static str;

    /// Fixed header length. Zero for protocols that are a single fixed struct.
    const HEADER_LEN: usize;

    /// Cheap check on the first byte of a fresh message. A byte that fails
    /// is dropped as noise without touching accumulation state.
    fn precheck(first: u8) -> bool;

    /// Parse and validate a complete header, returning it together with
    /// the payload length still to come.
    fn parse_header(raw: &[u8], limits: &Limits) -> Result<(Self::Header, usize), FrameError>;
}

/// A message that is one fixed-size struct with no header of its own.
pub trait FixedRecord: Sized {
    const NAME: &'static str;
    /// Exact wire size.
    const LEN: usize;

    /// Check on the first byte, typically a flag with a known range.
    fn precheck(first: u8) -> bool;

    /// Parse exactly [`Self::LEN`] bytes.
    fn parse(raw: &[u8]) -> Self;
}

/// [`FrameSpec`] for a [`FixedRecord`]: no header, constant payload length.
pub struct FixedStruct<T>(PhantomData<T>);

impl<T: FixedRecord> FrameSpec for FixedStruct<T> {
    type Header = ();
    const NAME: &'static str = T::NAME;
    const HEADER_LEN: usize = 0;

    fn precheck(first: u8) -> bool {
        T::precheck(first)
    }

    fn parse_header(_raw: &[u8], _limits: &Limits) -> Result<((), usize), FrameError> {
        Ok(((), T::LEN))
    }
}

/// Source of reassembly buffers.
pub trait BufferAllocator {
    /// An empty buffer with room for exactly `len` bytes, or `None`.
    fn allocate(&mut self, len: usize) -> Option<Vec<u8>>;
}

/// Heap allocator that refuses oversized requests and survives heap
/// exhaustion instead of aborting.
#[derive(Debug, Clone, Copy)]
pub struct HeapAllocator {
    limit: usize,
}

impl HeapAllocator {
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&mut self, len: usize) -> Option<Vec<u8>> {
        if len > self.limit {
            return None;
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).ok()?;
        Some(buf)
    }
}

/// A message handed to the dispatcher.
#[derive(Debug, PartialEq, Eq)]
pub enum Assembled<H> {
    /// Every payload byte arrived and was buffered.
    Complete { header: H, payload: Vec<u8> },
    /// The payload was consumed without a buffer.
    Skipped { header: H, len: usize },
}

/// Coarse state, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingHeader,
    Accumulating,
    Skipping,
}

enum RxState<H> {
    AwaitingHeader { filled: usize },
    Accumulating { header: H, buf: Vec<u8>, expected: usize },
    Skipping { header: H, seen: usize, expected: usize },
}

impl<H> RxState<H> {
    const IDLE: Self = Self::AwaitingHeader { filled: 0 };
}

pub struct Reassembler<S: FrameSpec> {
    state: RxState<S::Header>,
    header: [u8; MAX_HEADER_LEN],
    limits: Limits,
    stats: RxStats,
}

impl<S: FrameSpec> Reassembler<S> {
    pub fn new(limits: Limits) -> Self {
        debug_assert!(S::HEADER_LEN <= MAX_HEADER_LEN);
        Self {
            state: RxState::IDLE,
            header: [0; MAX_HEADER_LEN],
            limits,
            stats: RxStats::default(),
        }
    }

    /// Drop any partial message and its buffer.
    pub fn reset(&mut self) {
        self.state = RxState::IDLE;
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            RxState::AwaitingHeader { .. } => Phase::AwaitingHeader,
            RxState::Accumulating { .. } => Phase::Accumulating,
            RxState::Skipping { .. } => Phase::Skipping,
        }
    }

    /// Nothing buffered, not even part of a header.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, RxState::AwaitingHeader { filled: 0 })
    }

    pub fn stats(&self) -> &RxStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = RxStats::default();
    }

    /// Consume one BLE write.
    ///
    /// `on_frame` runs once per finished message, after the reassembler is
    /// already back in `AwaitingHeader`. Bytes following a finished message
    /// in the same chunk start the next one; bytes following a rejected
    /// header are discarded.
    pub fn feed(
        &mut self,
        mut chunk: &[u8],
        alloc: &mut dyn BufferAllocator,
        mut on_frame: impl FnMut(Assembled<S::Header>),
    ) {
        while !chunk.is_empty() {
            match &mut self.state {
                RxState::AwaitingHeader { filled } => {
                    if *filled == 0 && !S::precheck(chunk[0]) {
                        debug!("{}: stray byte 0x{:02x} dropped", S::NAME, chunk[0]);
                        self.stats.stray_bytes += 1;
                        chunk = &chunk[1..];
                        continue;
                    }

                    let take = (S::HEADER_LEN - *filled).min(chunk.len());
                    self.header[*filled..*filled + take].copy_from_slice(&chunk[..take]);
                    *filled += take;
                    chunk = &chunk[take..];
                    if *filled < S::HEADER_LEN {
                        continue;
                    }

                    match S::parse_header(&self.header[..S::HEADER_LEN], &self.limits) {
                        Ok((header, expected)) => {
                            self.begin_payload(header, expected, alloc, &mut on_frame);
                        }
                        Err(e) => {
                            warn!("{}: header rejected ({})", S::NAME, e);
                            self.stats.rejected += 1;
                            self.state = RxState::IDLE;
                            return;
                        }
                    }
                }

                RxState::Accumulating { buf, expected, .. } => {
                    let take = (*expected - buf.len()).min(chunk.len());
                    buf.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    if buf.len() == *expected {
                        self.finish(&mut on_frame);
                    }
                }

                RxState::Skipping { seen, expected, .. } => {
                    let take = (*expected - *seen).min(chunk.len());
                    *seen += take;
                    chunk = &chunk[take..];
                    if *seen == *expected {
                        self.finish(&mut on_frame);
                    }
                }
            }
        }
    }

    fn begin_payload(
        &mut self,
        header: S::Header,
        expected: usize,
        alloc: &mut dyn BufferAllocator,
        on_frame: &mut impl FnMut(Assembled<S::Header>),
    ) {
        self.state = match alloc.allocate(expected) {
            Some(buf) => {
                debug!("{}: {:?}, {} payload bytes", S::NAME, header, expected);
                RxState::Accumulating {
                    header,
                    buf,
                    expected,
                }
            }
            None => {
                warn!(
                    "{}: no buffer for {} bytes, skipping message",
                    S::NAME,
                    expected
                );
                self.stats.alloc_failures += 1;
                RxState::Skipping {
                    header,
                    seen: 0,
                    expected,
                }
            }
        };
        if expected == 0 {
            self.finish(on_frame);
        }
    }

    fn finish(&mut self, on_frame: &mut impl FnMut(Assembled<S::Header>)) {
        let frame = match core::mem::replace(&mut self.state, RxState::IDLE) {
            RxState::Accumulating { header, buf, .. } => {
                self.stats.completed += 1;
                Assembled::Complete {
                    header,
                    payload: buf,
                }
            }
            RxState::Skipping { header, seen, .. } => {
                self.stats.skipped += 1;
                Assembled::Skipped { header, len: seen }
            }
            RxState::AwaitingHeader { .. } => return,
        };
        on_frame(frame);
    }
}

// ── Tests ────────────────────────────────────────────────────
