//! Shared Event Channel: the fixed-layout block both processes map.
//!
//! The block is a single-producer/single-consumer contract. Every field has
//! exactly one writer:
//!
//! | field | writer |
//! |---|---|
//! | `events`, `ev_claim`, `ev_write`, `numlock_off`, `nl_edges`, `nl_new_state`, diagnostics | hook host |
//! | `magic`, `layout_version`, `ev_read`, `nl_acked`, `passthrough`, `running` | input detector |
//!
//! No lock crosses the process boundary. The producer announces every slot
//! it is about to write in `ev_claim`, stores the slot, and then releases
//! `ev_write`. The consumer acquires `ev_write` before indexing into `events`
//! and re-checks `ev_claim` after each read, so an entry the producer started
//! overwriting mid-read is discarded instead of being delivered out of order.
//!
//! Each slot carries the capture-time state next to the scan code (see
//! [`RingEntry`]), so the consumer can order key presses against Num Lock
//! transitions and tell keys the foreground application already received.

use crate::error::{Error, Result};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering, fence};

/// Session-local name of the shared block.
pub const SHM_NAME: &str = "Local\\DeckPad-InputChannel";

/// Number of scan-code slots in the ring. Must be a power of two.
pub const RING_CAPACITY: usize = 256;

/// Stamp written by the consumer when it creates the block ("DKPD").
pub const LAYOUT_MAGIC: u32 = 0x444B_5044;

/// Bumped whenever the field layout of [`SharedBlock`] changes.
pub const LAYOUT_VERSION: u32 = 2;

/// Upper bound on Num Lock transitions replayed from a single poll.
pub const MAX_EDGE_REPLAY: u32 = 64;

const RING_MASK: u32 = (RING_CAPACITY as u32) - 1;

const _: () = assert!(RING_CAPACITY.is_power_of_two());

/// Hook installation has not been attempted yet.
pub const HOOK_PENDING: u32 = 0;
/// The low-level keyboard hook is installed.
pub const HOOK_INSTALLED: u32 = 1;
/// The hook could not be installed; the host runs without suppression.
pub const HOOK_FAILED: u32 = 2;

/// Fixed-layout block shared by the hook host and the input detector.
///
/// All-zero memory is a valid (unstamped) block, which is what a freshly
/// created pagefile-backed mapping contains.
#[repr(C)]
pub struct SharedBlock {
    magic: AtomicU32,
    layout_version: AtomicU32,

    ev_claim: AtomicU32,
    ev_write: AtomicU32,
    ev_read: AtomicU32,
    events: [AtomicU32; RING_CAPACITY],

    numlock_off: AtomicBool,
    nl_new_state: AtomicBool,
    passthrough: AtomicBool,
    running: AtomicBool,
    nl_edges: AtomicU32,
    nl_acked: AtomicU32,

    keys_seen: AtomicU32,
    numpad_seen: AtomicU32,
    suppressed: AtomicU32,
    dropped: AtomicU32,
    hook_state: AtomicU32,
}

impl Default for SharedBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of pushing a scan code into the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The entry was stored without displacing anything.
    Stored,
    /// The ring was full; the oldest unread entry was overwritten.
    DroppedOldest,
}

const ENTRY_SCAN_MASK: u32 = 0xFF;
const ENTRY_SEQ_SHIFT: u32 = 8;
const ENTRY_PASSTHROUGH: u32 = 1 << 30;
const ENTRY_NUMLOCK_OFF: u32 = 1 << 31;

/// One key press as published in a ring slot.
///
/// Packed into a single `u32`: the scan code in bits 0-7, `edge_seq` in bits
/// 8-23, passthrough in bit 30 and Num-Lock-off in bit 31. Only keypad scan
/// codes are published, so eight bits are enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEntry {
    pub scan_code: u32,
    /// Num Lock was off when the key was captured.
    pub numlock_off: bool,
    /// Passthrough was on when the key was captured.
    pub passthrough: bool,
    /// Low 16 bits of the Num Lock transition counter at capture time.
    pub edge_seq: u16,
}

impl RingEntry {
    pub fn to_raw(self) -> u32 {
        let mut raw = (self.scan_code & ENTRY_SCAN_MASK) | (u32::from(self.edge_seq) << ENTRY_SEQ_SHIFT);
        if self.passthrough {
            raw |= ENTRY_PASSTHROUGH;
        }
        if self.numlock_off {
            raw |= ENTRY_NUMLOCK_OFF;
        }
        raw
    }

    pub fn from_raw(raw: u32) -> Self {
        Self {
            scan_code: raw & ENTRY_SCAN_MASK,
            numlock_off: raw & ENTRY_NUMLOCK_OFF != 0,
            passthrough: raw & ENTRY_PASSTHROUGH != 0,
            edge_seq: (raw >> ENTRY_SEQ_SHIFT) as u16,
        }
    }

    /// Whether the hook consumed this key, i.e. the foreground application
    /// never saw it.
    pub fn was_suppressed(&self) -> bool {
        crate::hook::suppression_decision(self.numlock_off, self.passthrough)
    }

    /// Whether this key was captured after the transition that moved the
    /// counter to `counter`.
    pub fn captured_after(&self, counter: u32) -> bool {
        !seq_before(self.edge_seq, counter as u16)
    }
}

/// `a` strictly precedes `b` on the wrapping 16-bit transition sequence.
fn seq_before(a: u16, b: u16) -> bool {
    (b.wrapping_sub(a) as i16) > 0
}

/// Num Lock transitions not yet seen by the consumer.
///
/// Each transition flips the state, so `count` transitions ending in
/// `last_off` fully determine the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumLockEdges {
    /// Number of transitions to replay.
    pub count: u32,
    /// Num-Lock-off state after the last transition.
    pub last_off: bool,
    /// Transition counter after the last transition.
    pub end: u32,
}

impl NumLockEdges {
    /// The Num-Lock-off state after each transition, oldest first.
    pub fn states(&self) -> impl Iterator<Item = bool> + use<> {
        self.transitions().map(|(_, off)| off)
    }

    /// `(counter, off)` for each transition, oldest first, where `counter` is
    /// the transition counter right after it.
    pub fn transitions(&self) -> impl Iterator<Item = (u32, bool)> + use<> {
        let count = self.count;
        let last_off = self.last_off;
        let end = self.end;
        (0..count).map(move |i| {
            let from_end = count - 1 - i;
            let off = if from_end % 2 == 0 { last_off } else { !last_off };
            (end.wrapping_sub(from_end), off)
        })
    }
}

impl SharedBlock {
    /// Create an unstamped, zeroed block.
    pub fn new() -> Self {
        Self {
            magic: AtomicU32::new(0),
            layout_version: AtomicU32::new(0),
            ev_claim: AtomicU32::new(0),
            ev_write: AtomicU32::new(0),
            ev_read: AtomicU32::new(0),
            events: std::array::from_fn(|_| AtomicU32::new(0)),
            numlock_off: AtomicBool::new(false),
            nl_new_state: AtomicBool::new(false),
            passthrough: AtomicBool::new(false),
            running: AtomicBool::new(false),
            nl_edges: AtomicU32::new(0),
            nl_acked: AtomicU32::new(0),
            keys_seen: AtomicU32::new(0),
            numpad_seen: AtomicU32::new(0),
            suppressed: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            hook_state: AtomicU32::new(HOOK_PENDING),
        }
    }

    // ------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------

    /// Stamp the block and mark it running. Called by the consumer before the
    /// host is spawned.
    pub fn initialize(&self, numlock_off: bool) {
        let write = self.ev_write.load(Ordering::Acquire);
        self.ev_read.store(write, Ordering::Release);
        self.nl_acked
            .store(self.nl_edges.load(Ordering::Acquire), Ordering::Release);
        self.numlock_off.store(numlock_off, Ordering::Release);
        self.passthrough.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);
        self.layout_version.store(LAYOUT_VERSION, Ordering::Release);
        self.magic.store(LAYOUT_MAGIC, Ordering::Release);
    }

    /// Whether the block carries the stamp of a compatible consumer.
    pub fn is_compatible(&self) -> bool {
        self.magic.load(Ordering::Acquire) == LAYOUT_MAGIC
            && self.layout_version.load(Ordering::Acquire) == LAYOUT_VERSION
    }

    /// Drain every published entry in FIFO order, advancing `ev_read` after
    /// each. Returns the number of entries handed to `f`.
    ///
    /// If the producer lapped the reader, the reader jumps to the oldest entry
    /// still in the ring.
    pub fn drain(&self, mut f: impl FnMut(RingEntry)) -> usize {
        self.drain_while(|entry| {
            f(entry);
            true
        })
    }

    /// Like [`drain`](Self::drain), but stops at the first entry for which
    /// `f` returns `false`. That entry stays unread.
    pub fn drain_while(&self, mut f: impl FnMut(RingEntry) -> bool) -> usize {
        self.drain_raw_while(|raw| f(RingEntry::from_raw(raw)))
    }

    fn drain_raw_while(&self, mut f: impl FnMut(u32) -> bool) -> usize {
        let cap = RING_CAPACITY as u32;
        let mut read = self.ev_read.load(Ordering::Relaxed);
        let mut delivered = 0;

        loop {
            // Claim first: every claim implies the previous write is visible,
            // so `read` never passes `write` below.
            let claim = self.ev_claim.load(Ordering::Acquire);
            let write = self.ev_write.load(Ordering::Acquire);
            if claim.wrapping_sub(read) > cap {
                read = claim.wrapping_sub(cap);
            }
            if read == write {
                break;
            }

            let raw = self.events[(read & RING_MASK) as usize].load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            let after = self.ev_claim.load(Ordering::Relaxed);

            if after.wrapping_sub(read) > cap {
                // The producer started overwriting this slot while we read it.
                continue;
            }

            if !f(raw) {
                break;
            }
            read = read.wrapping_add(1);
            self.ev_read.store(read, Ordering::Release);
            delivered += 1;
        }

        self.ev_read.store(read, Ordering::Release);
        delivered
    }

    /// Number of entries currently waiting to be drained (at most the ring
    /// capacity).
    pub fn pending(&self) -> u32 {
        let write = self.ev_write.load(Ordering::Acquire);
        let read = self.ev_read.load(Ordering::Acquire);
        write.wrapping_sub(read).min(RING_CAPACITY as u32)
    }

    /// Take the unacknowledged Num Lock transitions, if any, and acknowledge
    /// them.
    pub fn take_numlock_edges(&self) -> Option<NumLockEdges> {
        let edges = self.nl_edges.load(Ordering::Acquire);
        let acked = self.nl_acked.load(Ordering::Relaxed);
        if edges == acked {
            return None;
        }
        let last_off = self.nl_new_state.load(Ordering::Acquire);
        self.nl_acked.store(edges, Ordering::Release);
        Some(NumLockEdges {
            count: edges.wrapping_sub(acked).min(MAX_EDGE_REPLAY),
            last_off,
            end: edges,
        })
    }

    /// Transition counter the consumer has acknowledged so far.
    pub fn acknowledged_edges(&self) -> u32 {
        self.nl_acked.load(Ordering::Relaxed)
    }

    /// Enable or disable passthrough (no suppression).
    pub fn set_passthrough(&self, enabled: bool) {
        self.passthrough.store(enabled, Ordering::Release);
    }

    /// Ask the host to leave its message loop at its next liveness check.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Mark the block running again, e.g. before respawning the host.
    pub fn mark_running(&self) {
        self.running.store(true, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    /// Publish a key press, overwriting the oldest unread entry when full.
    pub fn push_entry(&self, entry: RingEntry) -> PushOutcome {
        self.push_raw(entry.to_raw())
    }

    /// Publish a key press stamped with the block's current Num Lock,
    /// passthrough and transition state.
    pub fn push_event(&self, scan_code: u32) -> PushOutcome {
        self.push_entry(RingEntry {
            scan_code,
            numlock_off: self.numlock_off(),
            passthrough: self.passthrough(),
            edge_seq: self.edge_seq(),
        })
    }

    fn push_raw(&self, raw: u32) -> PushOutcome {
        let write = self.ev_write.load(Ordering::Relaxed);
        let read = self.ev_read.load(Ordering::Acquire);

        let outcome = if write.wrapping_sub(read) >= RING_CAPACITY as u32 {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Stored
        };

        let next = write.wrapping_add(1);
        // Announce the slot before touching it; a reader that sees the new
        // slot contents is then guaranteed to see this claim.
        self.ev_claim.store(next, Ordering::Release);
        fence(Ordering::Release);
        self.events[(write & RING_MASK) as usize].store(raw, Ordering::Relaxed);
        self.ev_write.store(next, Ordering::Release);
        outcome
    }

    /// Low 16 bits of the Num Lock transition counter, as stamped into
    /// entries.
    pub fn edge_seq(&self) -> u16 {
        self.nl_edges.load(Ordering::Relaxed) as u16
    }

    /// Record a Num Lock state. Publishes an edge only when the state differs
    /// from the current snapshot; returns whether it did.
    pub fn publish_numlock(&self, off: bool) -> bool {
        if self.numlock_off.load(Ordering::Relaxed) == off {
            return false;
        }
        self.numlock_off.store(off, Ordering::Release);
        self.nl_new_state.store(off, Ordering::Release);
        self.nl_edges.fetch_add(1, Ordering::Release);
        true
    }

    /// Store the Num Lock snapshot without raising an edge.
    pub fn sync_numlock(&self, off: bool) {
        self.numlock_off.store(off, Ordering::Release);
    }

    pub fn note_key_seen(&self) {
        self.keys_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_numpad_seen(&self) {
        self.numpad_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of hook installation.
    pub fn set_hook_installed(&self, installed: bool) {
        let state = if installed { HOOK_INSTALLED } else { HOOK_FAILED };
        self.hook_state.store(state, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Shared reads
    // ------------------------------------------------------------------

    pub fn numlock_off(&self) -> bool {
        self.numlock_off.load(Ordering::Acquire)
    }

    pub fn passthrough(&self) -> bool {
        self.passthrough.load(Ordering::Acquire)
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Current producer counter. Only advances while a producer is attached.
    pub fn write_counter(&self) -> u32 {
        self.ev_write.load(Ordering::Acquire)
    }

    pub fn keys_seen(&self) -> u32 {
        self.keys_seen.load(Ordering::Relaxed)
    }

    pub fn numpad_seen(&self) -> u32 {
        self.numpad_seen.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u32 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn hook_state(&self) -> u32 {
        self.hook_state.load(Ordering::Acquire)
    }
}

enum Backing {
    InProcess(Arc<SharedBlock>),
    #[cfg(target_os = "windows")]
    Mapped(crate::platform::MappedView),
}

impl Backing {
    fn block(&self) -> &SharedBlock {
        match self {
            Backing::InProcess(block) => block,
            #[cfg(target_os = "windows")]
            Backing::Mapped(view) => view.block(),
        }
    }
}

/// Handle to a [`SharedBlock`], either mapped from the named section or
/// held in-process.
///
/// Cloning is cheap; the mapping is released when the last clone drops.
#[derive(Clone)]
pub struct SharedChannel {
    backing: Arc<Backing>,
}

impl SharedChannel {
    /// Create (or reuse) the named block. Consumer side.
    pub fn create(name: &str) -> Result<Self> {
        let view = crate::platform::create_mapping(name)?;
        Ok(Self::from_view(view))
    }

    /// Open an existing named block. Producer side; never creates.
    pub fn open(name: &str) -> Result<Self> {
        let view = crate::platform::open_mapping(name)?;
        let channel = Self::from_view(view);
        channel.check_attachable(name)?;
        Ok(channel)
    }

    /// A producer may only attach to a stamped block whose consumer is live.
    fn check_attachable(&self, name: &str) -> Result<()> {
        if !self.is_compatible() {
            return Err(Error::ChannelUnavailable(format!(
                "{name} has an incompatible layout"
            )));
        }
        if !self.running() {
            return Err(Error::NotRunning);
        }
        Ok(())
    }

    /// Wrap a block living in this process.
    pub fn in_process(block: Arc<SharedBlock>) -> Self {
        Self {
            backing: Arc::new(Backing::InProcess(block)),
        }
    }

    /// Fresh, unstamped in-process block.
    pub fn new_in_process() -> Self {
        Self::in_process(Arc::new(SharedBlock::new()))
    }

    #[cfg(target_os = "windows")]
    fn from_view(view: crate::platform::MappedView) -> Self {
        Self {
            backing: Arc::new(Backing::Mapped(view)),
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn from_view(view: crate::platform::MappedView) -> Self {
        match view {}
    }
}

impl Deref for SharedChannel {
    type Target = SharedBlock;

    fn deref(&self) -> &SharedBlock {
        self.backing.block()
    }
}

impl std::fmt::Debug for SharedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedChannel")
            .field("running", &self.running())
            .field("pending", &self.pending())
            .finish()
    }
}
