//! Compile-time sizing for the slave driver.
//!
//! The original ASCET/STM32 source expresses these as generated `#define`s
//! (`XCP_NUM_SESSIONS`, `XCP_MAX_DAQ`, ...) consumed by hand-written pointer
//! graphs into static tables (see the design note in spec §9). Here they are
//! plain `const`s so every fixed-size array in the crate is sized
//! consistently without a code generator. A project wiring this crate to a
//! real target edits these to fit its session/DAQ-list count.

/// Maximum number of concurrent XCP sessions (tool connections).
pub const MAX_SESSIONS: usize = 4;

/// Maximum number of DAQ lists configurable per session (static + dynamic).
pub const MAX_DAQ_LISTS: usize = 8;

/// Non-DAQ channels every session carries: CMD, EVENT, RES.
pub const FIXED_CHANNELS: usize = 3;

/// Total channels per session: fixed channels plus one per DAQ list.
pub const MAX_CHANNELS: usize = FIXED_CHANNELS + MAX_DAQ_LISTS;

/// Maximum number of ODTs in a single DAQ list.
pub const MAX_ODTS_PER_LIST: usize = 8;

/// Maximum number of ODT entries in a single ODT. Bounded by the 8-byte CAN
/// payload: with the PID byte present, at most 7 one-byte entries fit; with
/// PIDOFF or in a fully bit-packed ODT, up to 8 fit. The array is sized to
/// the worst case.
pub const MAX_ODT_ENTRIES_PER_ODT: usize = 8;

/// Ring buffer depth (slots) for every channel.
pub const RING_SLOTS_PER_CHANNEL: usize = 8;

/// Number of hardware CAN message objects (mailboxes) shared across sessions.
pub const MAX_MSG_OBJECTS: usize = 16;

/// Width in bytes of a single CAN frame payload.
pub const CAN_PAYLOAD_LEN: usize = 8;

/// Largest CTO (command/response) payload: one CAN frame.
pub const MAX_CTO_LEN: usize = CAN_PAYLOAD_LEN;

/// Largest DTO (DAQ/STIM) payload: one CAN frame.
pub const MAX_DTO_LEN: usize = CAN_PAYLOAD_LEN;
