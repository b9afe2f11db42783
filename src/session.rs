//! Per-session mutable state (spec.md §3 "Session", §4.C).
//!
//! [`Session`] pairs an immutable [`SessionConfig`] with everything that
//! changes over the session's lifetime: connection status, MTA, DAQ list
//! runtime state, seed/key progress and the pending-command marker. One
//! `Session` exists per tool connection, up to [`crate::limits::MAX_SESSIONS`].

use bitflags::bitflags;
use heapless::Vec;

use crate::config::{OdtEntryConfig, SessionConfig};
use crate::limits::{MAX_DAQ_LISTS, MAX_ODTS_PER_LIST, MAX_ODT_ENTRIES_PER_ODT};
use crate::target::XcpAddress;

bitflags! {
    /// Connection/resource status reported by GET_STATUS (spec.md §4.G).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionStatus: u8 {
        const CONNECTED      = 0x01;
        const DAQ_RUNNING     = 0x40;
        const RESUME          = 0x80;
    }
}

bitflags! {
    /// DAQ list mode bits (spec.md §3 "DAQ list").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DaqListMode: u8 {
        const RESUME    = 0x01;
        const RUNNING   = 0x08;
        const PIDOFF    = 0x10;
        const TIMESTAMP = 0x10 << 1;
        const DIRECTION = 0x40;
        const SELECTED  = 0x80;
    }
}

bitflags! {
    /// Resource bits unlocked by seed/key (spec.md §4.G UNLOCK).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResourceMask: u8 {
        const CAL_PAG = crate::pid::resource::CAL_PAG;
        const DAQ     = crate::pid::resource::DAQ;
        const STIM    = crate::pid::resource::STIM;
        const PGM     = crate::pid::resource::PGM;
    }
}

/// Whether the session was brought up in normal mode or via a user-defined
/// connect hook (CONNECT mode byte, spec.md §4.G table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Disconnected,
    Normal,
    UserDefined,
}

/// Seed/key progress (spec.md §4.G UNLOCK row, §9 OQ2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKeyState {
    Idle,
    SeedBegun { resource: u8, offset: usize },
    SeedFinished { resource: u8 },
    UnlockBegun { resource: u8, offset: usize },
}

/// One dynamically- or statically-populated ODT entry, as stored at
/// runtime (distinct from [`OdtEntryConfig`], which is the build-time seed
/// for a static list).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OdtEntryRuntime {
    pub address: u32,
    pub extension: u8,
    /// 0 means unconfigured (spec.md §3 ODT entry storage rule (i)).
    pub length: u8,
    pub is_bit: bool,
    /// Bit offset, normalized to 0..7 at configuration time (spec.md §3).
    pub bit_offset: u8,
}

impl OdtEntryRuntime {
    pub const fn empty() -> Self {
        OdtEntryRuntime { address: 0, extension: 0, length: 0, is_bit: false, bit_offset: 0 }
    }

    pub fn is_configured(&self) -> bool {
        self.length != 0
    }

    pub fn from_config(cfg: &OdtEntryConfig) -> Self {
        OdtEntryRuntime { address: cfg.address, extension: cfg.extension, length: cfg.length, is_bit: false, bit_offset: 0 }
    }
}

/// Pointer set by SET_DAQ_PTR and advanced by WRITE_DAQ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaqPointer {
    pub daq_list: u16,
    pub odt: u8,
    pub entry: u8,
}

/// Per-DAQ-list mutable state.
#[derive(Debug, Clone)]
pub struct DaqListRuntime {
    pub mode: DaqListMode,
    pub event: u16,
    pub first_pid: u8,
    pub max_odt_id_used: u8,
    /// Entries, `odts[odt_index][entry_index]`; `None` row for an
    /// unallocated ODT in a dynamic list.
    pub odts: Vec<Vec<OdtEntryRuntime, MAX_ODT_ENTRIES_PER_ODT>, MAX_ODTS_PER_LIST>,
    /// Runtime-assigned message id for dynamic STIM lists (spec.md §4.E
    /// rule 3, `SET_DAQ_ID`); `None` means "use the channel's configured
    /// or session default id".
    pub runtime_msg_id: Option<u32>,
    /// For dynamic lists: how many entries each ALLOC_ODT_ENTRY call has
    /// reserved per ODT, enforcing the strict FREE/ALLOC ordering of
    /// spec.md §4.G.
    pub alloc_entries_per_odt: Vec<u8, MAX_ODTS_PER_LIST>,
    pub is_dynamic: bool,
}

impl DaqListRuntime {
    pub fn from_config(cfg: &crate::config::DaqListConfig) -> Self {
        let mut odts = Vec::new();
        for odt_cfg in &cfg.odts {
            let mut row: Vec<OdtEntryRuntime, MAX_ODT_ENTRIES_PER_ODT> = Vec::new();
            for e in &odt_cfg.entries {
                let _ = row.push(OdtEntryRuntime::from_config(e));
            }
            let _ = odts.push(row);
        }
        let mut mode = DaqListMode::empty();
        if cfg.direction_stim {
            mode |= DaqListMode::DIRECTION;
        }
        if !matches!(cfg.timestamp, crate::target::TimestampWidth::None) {
            mode |= DaqListMode::TIMESTAMP;
        }
        DaqListRuntime {
            mode,
            event: cfg.event_channel,
            first_pid: cfg.first_pid,
            max_odt_id_used: 0,
            odts,
            runtime_msg_id: None,
            alloc_entries_per_odt: Vec::new(),
            is_dynamic: false,
        }
    }

    pub fn empty(event: u16, direction_stim: bool) -> Self {
        let mut mode = DaqListMode::empty();
        if direction_stim {
            mode |= DaqListMode::DIRECTION;
        }
        DaqListRuntime {
            mode,
            event,
            first_pid: 0,
            max_odt_id_used: 0,
            odts: Vec::new(),
            runtime_msg_id: None,
            alloc_entries_per_odt: Vec::new(),
            is_dynamic: true,
        }
    }

    pub fn num_odt(&self) -> u8 {
        self.odts.len() as u8
    }

    /// spec.md §3 I6: a list's first ODT with an empty first entry makes
    /// the whole list a no-op for DAQ/STIM purposes.
    pub fn first_odt_empty(&self) -> bool {
        match self.odts.first() {
            None => true,
            Some(odt) => match odt.first() {
                None => true,
                Some(entry) => !entry.is_configured(),
            },
        }
    }
}

/// Non-volatile programming (PGM) sequencing state (spec.md §4.G
/// PROGRAM_* row); kept coarse, the detailed sector/sequence bookkeeping
/// is an application-callback concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgmState {
    Idle,
    Clearing,
    Programming,
}

/// One XCP session: immutable configuration plus everything that mutates
/// over CONNECT..DISCONNECT.
pub struct Session {
    pub config: SessionConfig,
    pub connection: ConnectionMode,
    pub mta: XcpAddress,
    /// Last-received command PID, for the dispatcher's `prev_cmd` sentinel
    /// (spec.md §4.F) and for block-mode continuation bookkeeping.
    pub last_cmd: Option<u8>,
    /// Set when the last dispatch committed `MoreToSend` (response sent,
    /// RX frame deliberately left in place): the next tick for the same
    /// PID is a continuation of block-mode UPLOAD/BUILD_CHECKSUM, not a
    /// fresh command (spec.md §4.F point 3).
    pub continuation_active: bool,
    pub daq_lists: Vec<DaqListRuntime, MAX_DAQ_LISTS>,
    pub daq_ptr: DaqPointer,
    pub unlocked: ResourceMask,
    pub seed_key: SeedKeyState,
    pub pgm_state: PgmState,
    /// Active calibration page per segment, indexed by segment order in
    /// `config.segments` (spec.md §4.J).
    pub active_page: Vec<u8, 8>,
    /// SET/GET_SEGMENT_MODE byte per segment, indexed the same way as
    /// `active_page`. Bit 0 is FREEZE (spec.md §4.G table).
    pub segment_mode: Vec<u8, 8>,
    pub cmd_msg_id: u32,
    pub res_msg_id: u32,
    pub event_msg_id: u32,
    pub broadcast_msg_id: u32,
    /// GET_SLAVE_ID mode-1 (inverse echo) is only accepted immediately
    /// after a mode-0 request (spec.md §4.G note).
    pub echo_requested: bool,
    /// Dynamic DAQ allocation progress, enforcing FREE_DAQ/ALLOC_DAQ
    /// ordering (spec.md §4.G row, P4).
    pub alloc_stage: AllocStage,
    /// Pending-command timeout counter for EV_CMD_PENDING (spec.md §4.F).
    pub pending_ticks: u16,
    /// Set once `pending_ticks` has crossed [`crate::dispatch::CMD_PENDING_TIMEOUT_TICKS`]
    /// for the command currently in progress, so the EVENT is emitted once
    /// per stall rather than on every tick past the threshold.
    pub pending_notified: bool,
    /// Bytes left to send for a block-mode UPLOAD (spec.md §4.G UPLOAD row,
    /// R5 "Block upload").
    pub upload_remaining: u32,
    /// Bytes left to receive for a block-mode DOWNLOAD_NEXT sequence.
    pub download_remaining: u32,
    /// `BUILD_CHECKSUM` block size currently in progress, for the async
    /// re-poll path.
    pub checksum_remaining: u32,
}

/// Strict ordering state machine for dynamic DAQ allocation (spec.md §4.G:
/// "ordering violation -> ERR_SEQUENCE").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStage {
    /// FREE_DAQ has been issued (or never configured); ALLOC_DAQ may run.
    Freed,
    /// ALLOC_DAQ has run for `num_lists` lists; ALLOC_ODT may run for any
    /// of them, in any order, but must precede ALLOC_ODT_ENTRY for a list.
    DaqAllocated,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let mut daq_lists = Vec::new();
        for cfg in &config.daq_lists {
            let _ = daq_lists.push(DaqListRuntime::from_config(cfg));
        }
        let mut active_page = Vec::new();
        let mut segment_mode = Vec::new();
        for _ in &config.segments {
            let _ = active_page.push(0);
            let _ = segment_mode.push(0);
        }
        Session {
            config,
            connection: ConnectionMode::Disconnected,
            mta: XcpAddress::default(),
            last_cmd: None,
            continuation_active: false,
            daq_lists,
            daq_ptr: DaqPointer::default(),
            unlocked: ResourceMask::empty(),
            seed_key: SeedKeyState::Idle,
            pgm_state: PgmState::Idle,
            active_page,
            segment_mode,
            cmd_msg_id: 0,
            res_msg_id: 0,
            event_msg_id: 0,
            broadcast_msg_id: 0,
            echo_requested: false,
            alloc_stage: AllocStage::Freed,
            pending_ticks: 0,
            pending_notified: false,
            upload_remaining: 0,
            download_remaining: 0,
            checksum_remaining: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self.connection, ConnectionMode::Disconnected)
    }

    /// Returns `true` exactly once per pending-command stall that has
    /// crossed the EV_CMD_PENDING timeout, clearing the flag so the caller
    /// doesn't re-emit the event on every subsequent tick (spec.md §4.F
    /// point 4).
    pub fn take_pending_event(&mut self) -> bool {
        if self.pending_notified {
            self.pending_notified = false;
            true
        } else {
            false
        }
    }

    pub fn daq_running(&self) -> bool {
        self.daq_lists.iter().any(|l| l.mode.contains(DaqListMode::RUNNING))
    }

    pub fn status(&self) -> SessionStatus {
        let mut s = SessionStatus::empty();
        if self.is_connected() {
            s |= SessionStatus::CONNECTED;
        }
        if self.daq_running() {
            s |= SessionStatus::DAQ_RUNNING;
        }
        s
    }

    /// DISCONNECT / forced disconnect (spec.md §3 Session lifecycle, §7
    /// item 3: bad UNLOCK key forces this; §4.G PROGRAM_RESET also forces
    /// this on success).
    pub fn disconnect(&mut self) {
        self.connection = ConnectionMode::Disconnected;
        self.mta = XcpAddress::default();
        self.last_cmd = None;
        self.continuation_active = false;
        self.unlocked = ResourceMask::empty();
        self.seed_key = SeedKeyState::Idle;
        self.pgm_state = PgmState::Idle;
        self.daq_ptr = DaqPointer::default();
        self.alloc_stage = AllocStage::Freed;
        self.pending_ticks = 0;
        self.pending_notified = false;
        self.upload_remaining = 0;
        self.download_remaining = 0;
        self.checksum_remaining = 0;
        for list in &mut self.daq_lists {
            list.mode.remove(DaqListMode::RUNNING | DaqListMode::SELECTED);
            for odt in &mut list.odts {
                for entry in odt.iter_mut() {
                    *entry = OdtEntryRuntime::empty();
                }
            }
            list.max_odt_id_used = 0;
        }
    }
}
