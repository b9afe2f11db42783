//! Error types.
//!
//! The wire-visible error space is fixed by the XCP specification (§7 of the
//! design spec); [`ErrorCode`] is that 1-byte space. [`XcpError`] is the
//! crate-internal error enum command handlers build from, following the
//! teacher crate's use of `thiserror` for `XcpError` in `xcp/mod.rs`.
//! Command handlers never let an `XcpError` escape a command boundary
//! (§7: "Errors are local") - they map it to an `ErrorCode` and pack it into
//! the response themselves.

use thiserror::Error;

/// XCP protocol error codes, wire value as documented by the ASAM XCP
/// specification and used verbatim by `original_source/XcpDriver/xcp_cmd.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    CmdSynch = 0x00,
    CmdBusy = 0x10,
    DaqActive = 0x11,
    PgmActive = 0x12,
    CmdUnknown = 0x20,
    CmdSyntax = 0x21,
    OutOfRange = 0x22,
    WriteProtected = 0x23,
    AccessDenied = 0x24,
    AccessLocked = 0x25,
    PageNotValid = 0x26,
    ModeNotValid = 0x27,
    SegmentNotValid = 0x28,
    Sequence = 0x29,
    DaqConfig = 0x2A,
    MemoryOverflow = 0x30,
    Generic = 0x31,
    VerifyOverflow = 0x32,
    ResourceTempNotAccessible = 0x33,
}

impl ErrorCode {
    pub const fn wire(self) -> u8 {
        self as u8
    }
}

/// Application-callback result, exactly the five-origin-plus-success
/// taxonomy of spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Finished,
    Busy,
    OutOfRam,
    Rejected,
    BadAddress,
    PageNotValid,
    SegNotValid,
    RequestNotValid,
}

impl AppStatus {
    /// Map an asynchronous application status to a protocol error, for the
    /// cases that abort the current command (§7 item 4). `Busy` is handled
    /// by the dispatcher's suspend path and never reaches this mapping.
    pub fn to_error(self) -> Option<ErrorCode> {
        match self {
            AppStatus::Finished => None,
            AppStatus::Busy => None,
            AppStatus::OutOfRam => Some(ErrorCode::MemoryOverflow),
            AppStatus::Rejected => Some(ErrorCode::AccessDenied),
            AppStatus::BadAddress => Some(ErrorCode::OutOfRange),
            AppStatus::PageNotValid => Some(ErrorCode::PageNotValid),
            AppStatus::SegNotValid => Some(ErrorCode::SegmentNotValid),
            AppStatus::RequestNotValid => Some(ErrorCode::Generic),
        }
    }
}

/// Crate-internal error type. Never crosses a command boundary (§7).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcpError {
    #[error("protocol error {0:?}")]
    Protocol(ErrorCode),

    #[error("session is not connected")]
    NotConnected,

    #[error("no session slot available")]
    NoSessionSlot,

    #[error("channel has no buffer available")]
    NoBuffer,

    #[error("configuration is invalid: {0}")]
    Config(&'static str),
}

impl From<ErrorCode> for XcpError {
    fn from(code: ErrorCode) -> Self {
        XcpError::Protocol(code)
    }
}

/// Errors raised while validating a [`crate::config::SessionConfig`] built
/// through [`crate::config::SessionConfigBuilder`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("too many channels for session limits")]
    TooManyChannels,
    #[error("too many DAQ lists for session limits")]
    TooManyDaqLists,
    #[error("too many ODTs for a single DAQ list")]
    TooManyOdts,
    #[error("too many ODT entries for a single ODT")]
    TooManyOdtEntries,
    #[error("too many segments for session limits")]
    TooManySegments,
    #[error("a segment must have at least two pages")]
    SegmentNeedsTwoPages,
    #[error("firstPid + numOdt overflows the PID space or collides with another DAQ list")]
    PidRangeOverlap,
}

/// Errors raised while loading persisted (RESUME) state.
#[cfg(feature = "resume-persist")]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistError {
    #[error("magic number mismatch, persisted region is not valid")]
    BadMagic,
    #[error("persisted region is truncated")]
    Truncated,
    #[error("persisted list id is out of range")]
    ListOutOfRange,
}
