//! Wire-level packet identifiers and little-endian packing helpers.
//!
//! Numerics are normative (spec.md §6) - these are the bytes a real XCP
//! master expects on the wire and must not be renumbered.

/// Command PIDs, first byte of a CTO sent by the master. Values for the
/// commands enumerated in spec.md §6 are normative; the handful of
/// additional standard ASAM XCP commands needed to implement the full
/// handler catalogue of §4.G (segment/page info, DAQ list info, flash
/// sequencing) follow the same standard numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandPid {
    Connect = 0xFF,
    Disconnect = 0xFE,
    GetStatus = 0xFD,
    Synch = 0xFC,
    GetCommModeInfo = 0xFB,
    GetId = 0xFA,
    SetRequest = 0xF9,
    GetSeed = 0xF8,
    Unlock = 0xF7,
    SetMta = 0xF6,
    Upload = 0xF5,
    ShortUpload = 0xF4,
    BuildChecksum = 0xF3,
    TransportLayerCmd = 0xF2,
    UserCmd = 0xF1,
    Download = 0xF0,
    DownloadNext = 0xEF,
    DownloadMax = 0xEE,
    ShortDownload = 0xED,
    ModifyBits = 0xEC,
    SetCalPage = 0xEB,
    GetCalPage = 0xEA,
    GetPagProcessorInfo = 0xE9,
    GetSegmentInfo = 0xE8,
    GetPageInfo = 0xE7,
    SetSegmentMode = 0xE6,
    GetSegmentMode = 0xE5,
    CopyCalPage = 0xE4,
    ClearDaqList = 0xE3,
    SetDaqPtr = 0xE2,
    WriteDaq = 0xE1,
    SetDaqListMode = 0xE0,
    GetDaqListMode = 0xDF,
    StartStopDaqList = 0xDE,
    StartStopSynch = 0xDD,
    GetDaqClock = 0xDC,
    ReadDaq = 0xDB,
    GetDaqProcessorInfo = 0xDA,
    GetDaqResolutionInfo = 0xD9,
    GetDaqListInfo = 0xD8,
    GetDaqEventInfo = 0xD7,
    FreeDaq = 0xD6,
    AllocDaq = 0xD5,
    AllocOdt = 0xD4,
    AllocOdtEntry = 0xD3,
    ProgramStart = 0xD2,
    ProgramClear = 0xD1,
    Program = 0xD0,
    ProgramReset = 0xCF,
    GetPgmProcessorInfo = 0xCE,
    GetSectorInfo = 0xCD,
    ProgramPrepare = 0xCC,
    ProgramFormat = 0xCB,
    ProgramNext = 0xCA,
    ProgramMax = 0xC9,
}

/// Response PIDs, first byte of a CTO sent by the slave.
pub mod response {
    pub const OK: u8 = 0xFF;
    pub const ERROR: u8 = 0xFE;
    pub const EVENT: u8 = 0xFD;
    pub const SERVICE_REQUEST: u8 = 0xFC;
}

/// Event codes carried as the second byte of an `EVENT` response packet.
pub mod event_code {
    pub const EV_CMD_PENDING: u8 = 0x05;
}

/// Transport-layer subcommands (second byte after PID `TRANSPORT_LAYER_CMD`).
pub mod transport_cmd {
    pub const GET_SLAVE_ID: u8 = 0xFF;
    pub const GET_DAQ_ID: u8 = 0xFE;
    pub const SET_DAQ_ID: u8 = 0xFD;
    /// §4.E rule 2: any payload[0] at or above this value, on the command
    /// message id, is a command (not a DAQ/STIM frame).
    pub const PID_CMD_LAST: u8 = 0xC0;
}

/// Resource bitmask values used by GET_SEED / UNLOCK (spec.md §4.G).
pub mod resource {
    pub const CAL_PAG: u8 = 0x01;
    pub const DAQ: u8 = 0x04;
    pub const STIM: u8 = 0x08;
    pub const PGM: u8 = 0x10;
}

/// Page-switching mode bits used by SET/GET_CAL_PAGE (`xcp/mod.rs`'s
/// `CAL_PAGE_MODE_*` constants, carried over verbatim).
pub mod cal_page_mode {
    pub const ECU: u8 = 0x01;
    pub const XCP: u8 = 0x02;
    pub const ALL: u8 = 0x80;
}

/// Write a `u16` to `dst[..2]` little-endian, byte by byte (§9: "must not
/// rely on memory aliasing to achieve this").
#[inline]
pub fn put_u16_le(dst: &mut [u8], value: u16) {
    dst[0] = (value & 0xFF) as u8;
    dst[1] = (value >> 8) as u8;
}

/// Write a `u32` to `dst[..4]` little-endian, byte by byte.
#[inline]
pub fn put_u32_le(dst: &mut [u8], value: u32) {
    dst[0] = (value & 0xFF) as u8;
    dst[1] = ((value >> 8) & 0xFF) as u8;
    dst[2] = ((value >> 16) & 0xFF) as u8;
    dst[3] = ((value >> 24) & 0xFF) as u8;
}

/// Read a little-endian `u16` from `src[..2]`.
#[inline]
pub fn get_u16_le(src: &[u8]) -> u16 {
    (src[0] as u16) | ((src[1] as u16) << 8)
}

/// Read a little-endian `u32` from `src[..4]`.
#[inline]
pub fn get_u32_le(src: &[u8]) -> u32 {
    (src[0] as u32) | ((src[1] as u32) << 8) | ((src[2] as u32) << 16) | ((src[3] as u32) << 24)
}
