//! Application callback collaborator (spec.md §4.A/§4.G, component B).
//!
//! Memory access, calibration-page commit, seed/key computation and flash
//! programming are all application-specific; the protocol engine only
//! knows the `(address, extension, length)` shape of a request and the
//! [`crate::error::AppStatus`] shape of a reply. A call may finish
//! synchronously (spec.md §7: "most calls return Finished immediately") or
//! asynchronously, in which case the command dispatcher suspends (§4.B) and
//! polls [`ApplicationCallbacks::poll`] on a later `dispatch` call with
//! `prev_cmd` set to the sentinel that re-invoked it.

use crate::error::AppStatus;
use crate::target::XcpAddress;

/// Application-specific memory, calibration and programming operations.
///
/// Every method may be called from the dispatcher's thread/task context
/// only, never from an interrupt handler (unlike [`crate::can::CanDriver`]
/// and [`crate::can_bridge`], which are interrupt-safe by contract).
pub trait ApplicationCallbacks {
    /// Copy `len` bytes starting at `src` into `dst`. `dst.len() >= len`.
    fn read_memory(&mut self, src: XcpAddress, dst: &mut [u8], len: usize) -> AppStatus;

    /// Copy `len` bytes from `src` into the memory at `dst`. `src.len() >= len`.
    fn write_memory(&mut self, dst: XcpAddress, src: &[u8], len: usize) -> AppStatus;

    /// Recompute and return a checksum over `[start, start + len)`, in
    /// whatever algorithm the integrator has configured (BUILD_CHECKSUM,
    /// spec.md §4.G). `AppStatus::Finished` with the checksum value, or a
    /// pending/error status with the value unspecified.
    fn checksum(&mut self, start: XcpAddress, len: u32) -> (AppStatus, u32);

    /// Commit the effect of switching `segment`'s active page to `page`
    /// (SET_CAL_PAGE, spec.md §4.G). Pure bookkeeping of which page is
    /// active lives in [`crate::calpage_proxy`]; this call is the hook for
    /// side effects the application needs (e.g. copying a page's RAM shadow).
    fn set_cal_page(&mut self, segment: u8, page: u8) -> AppStatus;

    /// Copy all values from `src_page` to `dst_page` within `segment`
    /// (COPY_CAL_PAGE, spec.md §4.G).
    fn copy_cal_page(&mut self, segment: u8, src_page: u8, dst_page: u8) -> AppStatus;

    /// Produce the `length`-byte key for the most recent GET_SEED's
    /// `resource`/`seed`, or reject it (spec.md §4.G UNLOCK). A return of
    /// `false` with `AppStatus::Finished` means "key rejected", mapped by
    /// the caller to `ErrorCode::AccessLocked`.
    fn unlock(&mut self, resource: u8, key: &[u8]) -> (AppStatus, bool);

    /// Produce `len` bytes of seed for `resource` into `seed`.
    fn get_seed(&mut self, resource: u8, seed: &mut [u8], len: usize) -> (AppStatus, usize);

    /// Begin a flash programming sequence covering `[start, start + len)`
    /// (PROGRAM_START/PROGRAM_CLEAR family, spec.md §1 component coverage
    /// note - kept minimal, full PGM state machine detail is integrator-owned).
    fn program_clear(&mut self, start: XcpAddress, len: u32) -> AppStatus;

    /// Program `len` bytes of `data` at the current programming pointer.
    fn program(&mut self, data: &[u8], len: usize) -> AppStatus;

    /// Finish the programming sequence and reset, if requested by the tool.
    fn program_reset(&mut self) -> AppStatus;

    /// Freeze the active calibration page of every segment to non-volatile
    /// storage (SET_REQUEST STORE_CAL, spec.md §4.G). May suspend while
    /// each segment is written.
    fn freeze_cal(&mut self) -> AppStatus;

    /// Persist the current DAQ list configuration to non-volatile storage
    /// for RESUME (SET_REQUEST STORE_DAQ, spec.md §4.G and §6 "Persisted
    /// state"). A typical implementation calls [`crate::persist::store`]
    /// against its own [`crate::persist::NvStore`].
    fn store_daq(&mut self) -> AppStatus;

    /// Erase the non-volatile RESUME DAQ configuration (SET_REQUEST
    /// CLEAR_DAQ, spec.md §4.G).
    fn clear_daq(&mut self) -> AppStatus;

    /// Re-poll a call that previously returned `AppStatus::Busy`. The
    /// dispatcher calls this, not the original method, once per `dispatch`
    /// while a command is suspended (spec.md §4.B).
    fn poll(&mut self) -> AppStatus;
}
