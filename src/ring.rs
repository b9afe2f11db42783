//! Per-channel ring buffer (spec.md §4.D, component C).
//!
//! One [`Ring`] backs each channel (CMD, EVENT, RES, and one per DAQ/STIM
//! list). A single producer and a single consumer share it across an
//! interrupt boundary, so synchronization is a single atomic per slot
//! rather than a lock: the state byte is written last by the producer and
//! read first by the consumer, acting as the fence (spec.md §4.D invariant
//! I3). This mirrors the `nolock::queues` ring buffers in the reference
//! NIC driver and the `heapless::BinaryHeap`/RTIC channel pairing in the
//! reference CAN queue.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::limits::CAN_PAYLOAD_LEN;

/// Slot lifecycle. Transitions are one-directional except the final
/// `Free` -> `Free` no-op: a producer only ever claims a `Free` slot and
/// leaves it `Ready`; a consumer only ever takes a `Ready`/`InFlight` slot
/// and leaves it `Free`. No slot is ever written by both sides at once
/// (spec.md §4.D invariant I2).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free = 0,
    /// Producer has claimed the slot and is writing payload into it.
    Claimed = 1,
    /// Payload is complete and the slot is queued for consumption.
    Ready = 2,
    /// Consumer (e.g. CAN TX hardware) has taken the slot and is using it;
    /// distinct from `Ready` so a retried transmit is not double-counted.
    InFlight = 3,
}

impl SlotState {
    fn from_u8(v: u8) -> SlotState {
        match v {
            0 => SlotState::Free,
            1 => SlotState::Claimed,
            2 => SlotState::Ready,
            3 => SlotState::InFlight,
            _ => SlotState::Free,
        }
    }
}

struct Slot {
    /// Bits 0..=1: `SlotState`. Bits 4..=7: payload length (0..=8).
    state: AtomicU8,
    data: UnsafeCell<[u8; CAN_PAYLOAD_LEN]>,
}

unsafe impl Sync for Slot {}

impl Slot {
    const fn new() -> Self {
        Slot { state: AtomicU8::new(SlotState::Free as u8), data: UnsafeCell::new([0; CAN_PAYLOAD_LEN]) }
    }

    fn pack(state: SlotState, len: u8) -> u8 {
        (state as u8) | (len << 4)
    }

    fn state(&self, word: u8) -> SlotState {
        SlotState::from_u8(word & 0x0F)
    }

    fn len(&self, word: u8) -> u8 {
        word >> 4
    }
}

/// Fixed-capacity single-producer/single-consumer ring of CAN-frame-sized
/// slots. `N` is the per-channel depth ([`crate::limits::RING_SLOTS_PER_CHANNEL`]).
pub struct Ring<const N: usize> {
    slots: [Slot; N],
    head: AtomicU8,
    tail: AtomicU8,
}

impl<const N: usize> Ring<N> {
    pub const fn new() -> Self {
        const SLOT: Slot = Slot::new();
        Ring { slots: [SLOT; N], head: AtomicU8::new(0), tail: AtomicU8::new(0) }
    }

    fn idx(pos: u8) -> usize {
        pos as usize % N
    }

    /// Look up the next free slot for the producer side without committing
    /// to it: a pure peek at the head cursor, safe to call repeatedly
    /// (spec.md §4.D `get_tx_buf`: "idempotent until `tx_next`"). Only
    /// [`Ring::publish`] advances the producer cursor, so a caller that
    /// decides not to write anything this round leaves the ring exactly as
    /// it found it. Returns `None` if the ring is full (spec.md §4.D: "a
    /// full channel rejects the new frame rather than overwriting an older
    /// one").
    pub fn claim(&self) -> Option<usize> {
        let pos = self.head.load(Ordering::Relaxed);
        let idx = Self::idx(pos);
        let word = self.slots[idx].state.load(Ordering::Acquire);
        if self.slots[idx].state(word) != SlotState::Free {
            return None;
        }
        Some(idx)
    }

    /// Write `len` bytes of `payload` into the claimed slot `idx`.
    ///
    /// # Safety
    /// `idx` must have come from a `claim()` call whose slot has not yet
    /// been published, and no other caller may write the same `idx`
    /// concurrently (single-producer invariant I2).
    pub fn write(&self, idx: usize, payload: &[u8]) {
        let len = payload.len().min(CAN_PAYLOAD_LEN);
        unsafe {
            let dst = &mut *self.slots[idx].data.get();
            dst[..len].copy_from_slice(&payload[..len]);
        }
        let word = Slot::pack(SlotState::Claimed, len as u8);
        self.slots[idx].state.store(word, Ordering::Relaxed);
    }

    /// Mark slot `idx` ready for consumption and advance the producer
    /// cursor past it: the commit point `claim()` alone never reaches
    /// (spec.md §4.D `tx_next`). Release-ordered so the payload write in
    /// [`Ring::write`] is visible to the consumer once it observes `Ready`
    /// (the fence of invariant I3).
    pub fn publish(&self, idx: usize) {
        let word = self.slots[idx].state.load(Ordering::Relaxed);
        let len = self.slots[idx].len(word);
        self.slots[idx]
            .state
            .store(Slot::pack(SlotState::Ready, len), Ordering::Release);
        self.head.fetch_add(1, Ordering::Relaxed);
    }

    /// Peek the slot `depth` positions ahead of the consumer cursor (0 =
    /// head) without modifying cursors, for the STIM completeness check
    /// (spec.md §4.D: "peek may look ahead by <= queue length"). `None` if
    /// that slot is not `Ready` (either empty, or interrupted by a
    /// non-ready slot, signalling the queue does not go that deep yet).
    pub fn peek_at(&self, depth: usize) -> Option<(usize, usize)> {
        if depth >= N {
            return None;
        }
        let pos = self.tail.load(Ordering::Relaxed).wrapping_add(depth as u8);
        let idx = Self::idx(pos);
        let word = self.slots[idx].state.load(Ordering::Acquire);
        match self.slots[idx].state(word) {
            SlotState::Ready => Some((idx, self.slots[idx].len(word) as usize)),
            _ => None,
        }
    }

    /// Index of the slot at the consumer cursor, regardless of its current
    /// state. Used by the TX-complete path to locate the slot it marked
    /// in flight, since by then its state is no longer `Ready`.
    pub fn tail_index(&self) -> usize {
        Self::idx(self.tail.load(Ordering::Relaxed))
    }

    /// Peek the oldest ready slot without removing it, for priority
    /// comparisons during TX arbitration (spec.md §4.D). Returns the slot
    /// index and its payload length.
    pub fn peek_ready(&self) -> Option<(usize, usize)> {
        let pos = self.tail.load(Ordering::Relaxed);
        let idx = Self::idx(pos);
        let word = self.slots[idx].state.load(Ordering::Acquire);
        match self.slots[idx].state(word) {
            SlotState::Ready => Some((idx, self.slots[idx].len(word) as usize)),
            _ => None,
        }
    }

    /// Copy the payload of ready slot `idx` into `dst` without changing its
    /// state, for the RX-consumer side where the protocol task must
    /// inspect a frame before deciding whether to pop it (spec.md §4.F
    /// point 4: some outcomes leave the RX slot in place).
    pub fn copy_ready(&self, idx: usize, dst: &mut [u8]) -> usize {
        let word = self.slots[idx].state.load(Ordering::Acquire);
        let len = self.slots[idx].len(word) as usize;
        unsafe {
            let src = &*self.slots[idx].data.get();
            dst[..len].copy_from_slice(&src[..len]);
        }
        len
    }

    /// Free ready slot `idx` and advance the consumer cursor, without
    /// going through the in-flight state (used by the RX-consumer side,
    /// spec.md §4.D `rx_next`).
    pub fn pop_ready(&self, idx: usize) {
        self.slots[idx]
            .state
            .store(Slot::pack(SlotState::Free, 0), Ordering::Release);
        self.tail.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the payload of ready slot `idx` into `dst`, returning the
    /// length copied, and mark it in flight.
    pub fn take_in_flight(&self, idx: usize, dst: &mut [u8]) -> usize {
        let word = self.slots[idx].state.load(Ordering::Acquire);
        let len = self.slots[idx].len(word) as usize;
        unsafe {
            let src = &*self.slots[idx].data.get();
            dst[..len].copy_from_slice(&src[..len]);
        }
        self.slots[idx]
            .state
            .store(Slot::pack(SlotState::InFlight, len as u8), Ordering::Relaxed);
        len
    }

    /// Release the in-flight slot back to the pool and advance the tail,
    /// called once the CAN hardware confirms transmission.
    pub fn release_in_flight(&self, idx: usize) {
        self.slots[idx]
            .state
            .store(Slot::pack(SlotState::Free, 0), Ordering::Release);
        self.tail.fetch_add(1, Ordering::Relaxed);
    }

    /// Put an in-flight slot back to `Ready` without advancing the tail, so
    /// it is retried on the next arbitration pass (spec.md §4.D: a lost
    /// arbitration retries, it is never dropped).
    pub fn requeue_in_flight(&self, idx: usize) {
        let word = self.slots[idx].state.load(Ordering::Relaxed);
        let len = self.slots[idx].len(word);
        self.slots[idx]
            .state
            .store(Slot::pack(SlotState::Ready, len), Ordering::Release);
    }

    pub fn is_empty(&self) -> bool {
        self.peek_ready().is_none()
    }
}

impl<const N: usize> Default for Ring<N> {
    fn default() -> Self {
        Self::new()
    }
}
