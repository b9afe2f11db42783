//! Command handlers (spec.md §4.G, component G).
//!
//! One function per command, all sharing the shape
//! `(session, app, rx, tx) -> (DispatchResult, len)`. Every handler
//! validates against session state and parameter bounds first; on
//! violation it writes a 2-byte ERROR packet and returns "fully handled"
//! (§4.G: "on violation the handler returns an ERROR packet... Errors are
//! local", spec.md §7).

use crate::app::ApplicationCallbacks;
use crate::dispatch::{DispatchResult, CURR_CMD};
use crate::error::{AppStatus, ErrorCode};
use crate::pid::{self, cal_page_mode, event_code, resource, response, transport_cmd, CommandPid};
use crate::session::{AllocStage, ConnectionMode, DaqListMode, ResourceMask, SeedKeyState, Session};
use crate::target::XcpAddress;

const DONE: DispatchResult = DispatchResult::from_bits_truncate(
    DispatchResult::RX_READY.bits() | DispatchResult::TX_READY.bits(),
);

fn error_response(tx: &mut [u8], code: ErrorCode) -> (DispatchResult, usize) {
    tx[0] = response::ERROR;
    tx[1] = code.wire();
    (DONE, 2)
}

fn ok_header(tx: &mut [u8]) {
    tx[0] = response::OK;
}

fn connected_or_error(session: &Session, tx: &mut [u8]) -> Option<(DispatchResult, usize)> {
    if !session.is_connected() {
        return Some(error_response(tx, ErrorCode::CmdSynch));
    }
    None
}

/// Entry point called once per pending command by [`crate::dispatch::tick`].
pub fn dispatch_command<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
    prev_cmd: u16,
) -> (DispatchResult, usize) {
    if rx.is_empty() {
        return (DispatchResult::empty(), 0);
    }
    let pid_byte = rx[0];

    match pid_byte {
        x if x == CommandPid::Connect as u8 => connect(session, rx, tx),
        x if x == CommandPid::Disconnect as u8 => disconnect(session, tx),
        x if x == CommandPid::GetStatus as u8 => get_status(session, tx),
        x if x == CommandPid::Synch as u8 => synch(tx),
        x if x == CommandPid::GetCommModeInfo as u8 => get_comm_mode_info(session, tx),
        x if x == CommandPid::GetId as u8 => get_id(session, rx, tx),
        x if x == CommandPid::SetMta as u8 => set_mta(session, rx, tx),
        x if x == CommandPid::Upload as u8 => upload(session, app, rx, tx, prev_cmd),
        x if x == CommandPid::ShortUpload as u8 => short_upload(session, app, rx, tx),
        x if x == CommandPid::BuildChecksum as u8 => build_checksum(session, app, rx, tx, prev_cmd),
        x if x == CommandPid::Download as u8 => download(session, app, rx, tx),
        x if x == CommandPid::DownloadNext as u8 => download_next(session, app, rx, tx),
        x if x == CommandPid::DownloadMax as u8 => download_max(session, app, rx, tx),
        x if x == CommandPid::ModifyBits as u8 => modify_bits(session, app, rx, tx),
        x if x == CommandPid::SetCalPage as u8 => set_cal_page(session, app, rx, tx),
        x if x == CommandPid::GetCalPage as u8 => get_cal_page(session, rx, tx),
        x if x == CommandPid::SetSegmentMode as u8 => set_segment_mode(session, rx, tx),
        x if x == CommandPid::GetSegmentMode as u8 => get_segment_mode(session, rx, tx),
        x if x == CommandPid::CopyCalPage as u8 => copy_cal_page(session, app, rx, tx),
        x if x == CommandPid::ClearDaqList as u8 => clear_daq_list(session, rx, tx),
        x if x == CommandPid::SetDaqPtr as u8 => set_daq_ptr(session, rx, tx),
        x if x == CommandPid::WriteDaq as u8 => write_daq(session, rx, tx),
        x if x == CommandPid::SetDaqListMode as u8 => set_daq_list_mode(session, rx, tx),
        x if x == CommandPid::GetDaqListMode as u8 => get_daq_list_mode(session, rx, tx),
        x if x == CommandPid::StartStopDaqList as u8 => start_stop_daq_list(session, rx, tx),
        x if x == CommandPid::StartStopSynch as u8 => start_stop_synch(session, rx, tx),
        x if x == CommandPid::GetDaqClock as u8 => get_daq_clock(session, tx),
        x if x == CommandPid::GetDaqProcessorInfo as u8 => get_daq_processor_info(session, tx),
        x if x == CommandPid::GetDaqResolutionInfo as u8 => get_daq_resolution_info(session, tx),
        x if x == CommandPid::GetDaqListInfo as u8 => get_daq_list_info(session, rx, tx),
        x if x == CommandPid::FreeDaq as u8 => free_daq(session, tx),
        x if x == CommandPid::AllocDaq as u8 => alloc_daq(session, rx, tx),
        x if x == CommandPid::AllocOdt as u8 => alloc_odt(session, rx, tx),
        x if x == CommandPid::AllocOdtEntry as u8 => alloc_odt_entry(session, rx, tx),
        x if x == CommandPid::GetSeed as u8 => get_seed(session, app, rx, tx),
        x if x == CommandPid::Unlock as u8 => unlock(session, app, rx, tx),
        x if x == CommandPid::TransportLayerCmd as u8 => transport_layer_cmd(session, rx, tx),
        x if x == CommandPid::UserCmd as u8 => user_cmd(session, tx),
        x if x == CommandPid::ProgramStart as u8 => program_start(session, tx),
        x if x == CommandPid::ProgramClear as u8 => program_clear(session, app, rx, tx),
        x if x == CommandPid::Program as u8 => program(session, app, rx, tx),
        x if x == CommandPid::ProgramReset as u8 => program_reset(session, app, tx),
        x if x == CommandPid::ProgramPrepare as u8 => program_prepare(session, app, rx, tx),
        x if x == CommandPid::ProgramFormat as u8 => program_format(session, rx, tx),
        x if x == CommandPid::ProgramNext as u8 => program_next(session, app, rx, tx),
        x if x == CommandPid::ProgramMax as u8 => program_max(session, app, rx, tx),
        x if x == CommandPid::SetRequest as u8 => set_request(session, app, rx, tx),
        _ => error_response(tx, ErrorCode::CmdUnknown),
    }
}

fn connect(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    let mode = rx.get(1).copied().unwrap_or(0);
    session.connection = if mode == 1 { ConnectionMode::UserDefined } else { ConnectionMode::Normal };

    ok_header(tx);
    tx[1] = session.config.protected_resources;
    // Bit 7: optional commands supported (GET_ID, GET_SEED/UNLOCK,
    // calibration paging and the full DAQ/STIM family are all present).
    tx[2] = 0x80;
    tx[3] = session.config.max_cto_len;
    pid::put_u16_le(&mut tx[4..6], session.config.max_dto_len as u16);
    tx[6] = 1; // protocol layer version
    tx[7] = 1; // transport layer version
    (DONE, 8)
}

fn disconnect(session: &mut Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if session.pgm_state != crate::session::PgmState::Idle {
        return error_response(tx, ErrorCode::PgmActive);
    }
    session.disconnect();
    ok_header(tx);
    (DONE, 1)
}

fn get_status(session: &Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    ok_header(tx);
    tx[1] = session.status().bits();
    tx[2] = session.unlocked.bits();
    pid::put_u16_le(&mut tx[3..5], 0);
    (DONE, 5)
}

fn synch(tx: &mut [u8]) -> (DispatchResult, usize) {
    error_response(tx, ErrorCode::CmdSynch)
}

fn get_comm_mode_info(session: &Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    ok_header(tx);
    tx[1] = 0;
    tx[2] = 0; // reserved
    tx[3] = 0; // max bs (block size), block mode not negotiated
    tx[4] = 0; // min st
    tx[5] = 0; // queue size
    tx[6] = 1; // xcp driver version
    (DONE, 7)
}

fn get_id(session: &Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let id_type = rx.get(1).copied().unwrap_or(0);
    if id_type != 0 {
        // Only ASCII identification is supported (spec.md §1 Non-goals).
        return error_response(tx, ErrorCode::OutOfRange);
    }
    ok_header(tx);
    tx[1] = 0; // mode
    tx[2] = 0;
    pid::put_u32_le(&mut tx[3..7], 0);
    (DONE, 7)
}

fn set_mta(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 8 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let ext = rx[3];
    let addr = pid::get_u32_le(&rx[4..8]);
    if addr == 0 && ext == 0 {
        return error_response(tx, ErrorCode::OutOfRange);
    }
    session.mta = XcpAddress::new(addr, ext);
    ok_header(tx);
    (DONE, 1)
}

fn map_app_status(status: AppStatus, tx: &mut [u8]) -> Option<(DispatchResult, usize)> {
    match status {
        AppStatus::Finished => None,
        AppStatus::Busy => Some((DispatchResult::empty(), 0)),
        other => {
            let code = other.to_error().unwrap_or(ErrorCode::Generic);
            Some(error_response(tx, code))
        }
    }
}

fn upload<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
    prev_cmd: u16,
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let is_continuation = prev_cmd == CURR_CMD;
    let total: u32 = if is_continuation {
        session.upload_remaining
    } else {
        rx.get(1).copied().unwrap_or(0) as u32
    };
    if total == 0 {
        ok_header(tx);
        return (DONE, 1);
    }
    let chunk_cap = tx.len() - 1;
    let chunk = (total as usize).min(chunk_cap);
    let status = app.read_memory(session.mta, &mut tx[1..1 + chunk], chunk);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.mta = session.mta.advance(chunk as u32);
    ok_header(tx);
    let remaining = total - chunk as u32;
    if remaining > 0 {
        session.upload_remaining = remaining;
        (DispatchResult::TX_READY, 1 + chunk)
    } else {
        session.upload_remaining = 0;
        (DONE, 1 + chunk)
    }
}

fn short_upload<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 8 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let n = rx[1] as usize;
    let ext = rx[3];
    let addr = pid::get_u32_le(&rx[4..8]);
    let src = XcpAddress::new(addr, ext);
    let chunk = n.min(tx.len() - 1);
    let status = app.read_memory(src, &mut tx[1..1 + chunk], chunk);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.mta = src.advance(chunk as u32);
    ok_header(tx);
    (DONE, 1 + chunk)
}

/// Largest BUILD_CHECKSUM block, spec.md §8 B1.
pub const MAX_CHECKSUM_BLOCKSIZE: u32 = 0x0010_0000;

fn build_checksum<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
    prev_cmd: u16,
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let is_continuation = prev_cmd == CURR_CMD;
    let block_size = if is_continuation {
        session.checksum_remaining
    } else {
        if rx.len() < 8 {
            return error_response(tx, ErrorCode::CmdSyntax);
        }
        pid::get_u32_le(&rx[4..8])
    };
    if block_size > MAX_CHECKSUM_BLOCKSIZE {
        ok_header(tx);
        tx[0] = response::ERROR;
        tx[1] = ErrorCode::OutOfRange.wire();
        pid::put_u32_le(&mut tx[2..6], MAX_CHECKSUM_BLOCKSIZE);
        return (DONE, 6);
    }
    session.checksum_remaining = block_size;
    let (status, value) = app.checksum(session.mta, block_size);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.mta = session.mta.advance(block_size);
    session.checksum_remaining = 0;
    ok_header(tx);
    tx[1] = 0x01; // checksum type: XCP_ADD_11 placeholder, algorithm is integrator-defined
    tx[2] = 0;
    pid::put_u32_le(&mut tx[4..8], value);
    (DONE, 8)
}

fn download<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 2 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let n = rx[1] as usize;
    if rx.len() < 2 + n {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let status = app.write_memory(session.mta, &rx[2..2 + n], n);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.mta = session.mta.advance(n as u32);
    ok_header(tx);
    (DONE, 1)
}

fn download_next<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 2 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let n = rx[1] as usize;
    if rx.len() < 2 + n {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    if session.download_remaining > 0 && n as u32 > session.download_remaining {
        session.download_remaining = 0;
        return error_response(tx, ErrorCode::Sequence);
    }
    let status = app.write_memory(session.mta, &rx[2..2 + n], n);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.mta = session.mta.advance(n as u32);
    session.download_remaining = session.download_remaining.saturating_sub(n as u32);
    ok_header(tx);
    (DONE, 1)
}

/// Unlike DOWNLOAD, the block length isn't carried on the wire: it's always
/// exactly `max_cto_len - 1` bytes (spec.md §4.G table, DOWNLOAD_MAX row).
fn download_max<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let n = (session.config.max_cto_len as usize).saturating_sub(1);
    if rx.len() < 1 + n {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let status = app.write_memory(session.mta, &rx[1..1 + n], n);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.mta = session.mta.advance(n as u32);
    ok_header(tx);
    (DONE, 1)
}

fn modify_bits<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 6 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let shift = rx[1];
    let and_mask = pid::get_u16_le(&rx[2..4]);
    let xor_mask = pid::get_u16_le(&rx[4..6]);
    let mut buf = [0u8; 2];
    let status = app.read_memory(session.mta, &mut buf, 2);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    let mut value = pid::get_u16_le(&buf);
    value &= and_mask | !(1u16.wrapping_shl(shift as u32).wrapping_sub(1));
    value ^= xor_mask;
    pid::put_u16_le(&mut buf, value);
    let status = app.write_memory(session.mta, &buf, 2);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    (DONE, 1)
}

fn segment_index(session: &Session, segment: u8) -> Option<usize> {
    session.config.segments.iter().position(|s| s.segment_id == segment)
}

fn set_cal_page<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let mode = rx[1];
    let segment = rx[2];
    let page = rx[3];
    if mode & !(cal_page_mode::ECU | cal_page_mode::XCP | cal_page_mode::ALL) != 0 {
        return error_response(tx, ErrorCode::ModeNotValid);
    }
    let Some(idx) = segment_index(session, segment) else {
        return error_response(tx, ErrorCode::SegmentNotValid);
    };
    if page as usize >= session.config.segments[idx].num_pages as usize {
        return error_response(tx, ErrorCode::PageNotValid);
    }
    let status = app.set_cal_page(segment, page);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.active_page[idx] = page;
    ok_header(tx);
    (DONE, 1)
}

fn get_cal_page(session: &Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 3 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let segment = rx[2];
    let Some(idx) = segment_index(session, segment) else {
        return error_response(tx, ErrorCode::SegmentNotValid);
    };
    ok_header(tx);
    tx[1] = 0;
    tx[2] = 0;
    tx[3] = session.active_page[idx];
    (DONE, 4)
}

/// Only FREEZE (bit 0) is a meaningful mode bit for this driver; anything
/// else is rejected rather than silently ignored (spec.md §4.G table).
const SEGMENT_MODE_VALID_BITS: u8 = 0x01;

fn set_segment_mode(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 3 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let mode = rx[1];
    let segment = rx[2];
    if mode & !SEGMENT_MODE_VALID_BITS != 0 {
        return error_response(tx, ErrorCode::ModeNotValid);
    }
    let Some(idx) = segment_index(session, segment) else {
        return error_response(tx, ErrorCode::SegmentNotValid);
    };
    session.segment_mode[idx] = mode;
    ok_header(tx);
    (DONE, 1)
}

fn get_segment_mode(session: &Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 3 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let segment = rx[2];
    let Some(idx) = segment_index(session, segment) else {
        return error_response(tx, ErrorCode::SegmentNotValid);
    };
    ok_header(tx);
    tx[1] = 0;
    tx[2] = session.segment_mode[idx];
    (DONE, 3)
}

fn copy_cal_page<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let src_segment = rx[1];
    let src_page = rx[2];
    let dst_segment = rx[3];
    let dst_page = rx.get(4).copied().unwrap_or(src_page);
    if segment_index(session, src_segment).is_none() || segment_index(session, dst_segment).is_none() {
        return error_response(tx, ErrorCode::SegmentNotValid);
    }
    let status = app.copy_cal_page(src_segment, src_page, dst_page);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    (DONE, 1)
}

fn daq_list_index(session: &Session, daq_list: u16) -> Option<usize> {
    let idx = daq_list as usize;
    if idx < session.daq_lists.len() {
        Some(idx)
    } else {
        None
    }
}

fn clear_daq_list(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &mut session.daq_lists[idx];
    for odt in &mut list.odts {
        for entry in odt.iter_mut() {
            *entry = crate::session::OdtEntryRuntime::empty();
        }
    }
    list.max_odt_id_used = 0;
    // §9 OQ1: mode/event intentionally survive a clear, matching a
    // specific master's expectations; see DESIGN.md.
    ok_header(tx);
    (DONE, 1)
}

fn set_daq_ptr(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 6 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let odt = rx[4];
    let entry = rx[5];
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &session.daq_lists[idx];
    if list.mode.contains(DaqListMode::RUNNING) {
        return error_response(tx, ErrorCode::DaqActive);
    }
    if (odt as usize) >= list.odts.len() || (entry as usize) >= crate::limits::MAX_ODT_ENTRIES_PER_ODT {
        return error_response(tx, ErrorCode::OutOfRange);
    }
    session.daq_ptr = crate::session::DaqPointer { daq_list, odt, entry };
    ok_header(tx);
    (DONE, 1)
}

fn write_daq(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 8 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let bit_offset_field = rx[1];
    let size = rx[2];
    let ext = rx[3];
    let addr = pid::get_u32_le(&rx[4..8]);

    let ptr = session.daq_ptr;
    let Some(list_idx) = daq_list_index(session, ptr.daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &mut session.daq_lists[list_idx];
    if list.mode.contains(DaqListMode::RUNNING) {
        return error_response(tx, ErrorCode::DaqActive);
    }
    let Some(odt) = list.odts.get_mut(ptr.odt as usize) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let Some(entry) = odt.get_mut(ptr.entry as usize) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };

    // Bit mode is flagged with size == 0xFF by convention (spec.md §3:
    // "a single flag bit indicates bit- versus byte-mode"); bit offset 0..31
    // is normalized to a byte advance plus bit offset 0..7 (spec.md §8 B2).
    if size == 0xFF {
        let raw_bit = bit_offset_field;
        if raw_bit > 31 {
            return error_response(tx, ErrorCode::OutOfRange);
        }
        let byte_advance = raw_bit / 8;
        let bit_in_byte = raw_bit % 8;
        *entry = crate::session::OdtEntryRuntime {
            address: addr.wrapping_add(byte_advance as u32),
            extension: ext,
            length: 1,
            is_bit: true,
            bit_offset: bit_in_byte,
        };
    } else {
        if size == 0 || size as usize > crate::limits::CAN_PAYLOAD_LEN {
            return error_response(tx, ErrorCode::OutOfRange);
        }
        *entry = crate::session::OdtEntryRuntime {
            address: addr,
            extension: ext,
            length: size,
            is_bit: false,
            bit_offset: 0,
        };
    }

    let list = &mut session.daq_lists[list_idx];
    if ptr.odt as u8 >= list.max_odt_id_used {
        list.max_odt_id_used = ptr.odt + 1;
    }
    session.daq_ptr.entry = session.daq_ptr.entry.saturating_add(1);
    ok_header(tx);
    (DONE, 1)
}

fn set_daq_list_mode(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 8 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let mode_bits = rx[1];
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let event = pid::get_u16_le(&rx[4..6]);
    let prescaler = rx[6];
    let priority = rx[7];
    if prescaler != 1 || priority != 0 {
        // Non-goals: prioritised DAQ lists, variable prescaler (spec.md §1).
        return error_response(tx, ErrorCode::ModeNotValid);
    }
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &mut session.daq_lists[idx];
    let mutable_mask = DaqListMode::RESUME | DaqListMode::PIDOFF | DaqListMode::TIMESTAMP | DaqListMode::SELECTED;
    let requested = DaqListMode::from_bits_truncate(mode_bits) & mutable_mask;
    list.mode = (list.mode & !mutable_mask) | requested;
    list.event = event;
    ok_header(tx);
    (DONE, 1)
}

fn get_daq_list_mode(session: &Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &session.daq_lists[idx];
    ok_header(tx);
    tx[1] = list.mode.bits();
    tx[2] = 0;
    pid::put_u16_le(&mut tx[3..5], list.event);
    tx[5] = 1; // prescaler
    tx[6] = 0; // priority
    (DONE, 7)
}

fn start_stop_daq_list(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let mode = rx[1]; // 0=STOP, 1=START, 2=SELECT
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &mut session.daq_lists[idx];
    match mode {
        0 => list.mode.remove(DaqListMode::RUNNING),
        1 => list.mode.insert(DaqListMode::RUNNING),
        2 => list.mode.insert(DaqListMode::SELECTED),
        _ => return error_response(tx, ErrorCode::ModeNotValid),
    }
    let first_pid = list.first_pid;
    ok_header(tx);
    tx[1] = first_pid;
    (DONE, 2)
}

fn start_stop_synch(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let mode = rx.get(1).copied().unwrap_or(0); // 0=STOP_ALL,1=START_SELECTED,2=STOP_SELECTED
    match mode {
        0 => {
            for list in &mut session.daq_lists {
                list.mode.remove(DaqListMode::RUNNING);
            }
        }
        1 => {
            for list in &mut session.daq_lists {
                if list.mode.contains(DaqListMode::SELECTED) {
                    list.mode.insert(DaqListMode::RUNNING);
                }
            }
        }
        2 => {
            for list in &mut session.daq_lists {
                if list.mode.contains(DaqListMode::SELECTED) {
                    list.mode.remove(DaqListMode::RUNNING);
                }
            }
        }
        _ => return error_response(tx, ErrorCode::ModeNotValid),
    }
    for list in &mut session.daq_lists {
        list.mode.remove(DaqListMode::SELECTED);
    }
    ok_header(tx);
    (DONE, 1)
}

fn get_daq_clock(session: &Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    // GET_DAQ_CLOCK is a bare PID on the wire; the width is a session
    // property configured ahead of time (spec.md §4.G table), not a command
    // parameter.
    let width = session.config.daq_clock_width;
    if matches!(width, crate::target::TimestampWidth::None) {
        return error_response(tx, ErrorCode::Generic);
    }
    ok_header(tx);
    // The caller plugs in the real clock via the DAQ engine's ClockSource;
    // command-path GET_DAQ_CLOCK reports 0 here since no ClockSource handle
    // reaches command handlers directly (see crate::xcp for the wiring).
    crate::target::write_timestamp(&mut tx[1..], 0, width);
    (DONE, 1 + width.len())
}

fn get_daq_processor_info(session: &Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    ok_header(tx);
    // DAQ_PROPERTIES: dynamic list configuration, PID-off, timestamp, resume
    // and STIM direction are all supported; overload-event reporting and
    // prioritised lists are not (spec.md §1 Non-goals).
    tx[1] = 0b0010_1101;
    pid::put_u16_le(&mut tx[2..4], session.daq_lists.capacity() as u16);
    pid::put_u16_le(&mut tx[4..6], u16::MAX); // event channels: application-defined, unbounded here
    tx[6] = session.config.daq_lists.len() as u8; // MIN_DAQ: statically configured lists
    tx[7] = 0; // DAQ_KEY_BYTE: absolute addressing, no address extension, no optimisation
    (DONE, 8)
}

fn get_daq_resolution_info(session: &Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    ok_header(tx);
    tx[1] = 1; // GRANULARITY_ODT_ENTRY_SIZE_DAQ: byte granularity
    tx[2] = crate::limits::CAN_PAYLOAD_LEN as u8; // MAX_ODT_ENTRY_SIZE_DAQ
    tx[3] = 1; // GRANULARITY_ODT_ENTRY_SIZE_STIM
    tx[4] = crate::limits::CAN_PAYLOAD_LEN as u8; // MAX_ODT_ENTRY_SIZE_STIM
    let width_bytes = session.config.daq_clock_width.len() as u8;
    tx[5] = width_bytes; // TIMESTAMP_MODE: size in bytes, unit left at raw ticks
    pid::put_u16_le(&mut tx[6..8], 1); // TIMESTAMP_TICKS: one tick per clock unit
    (DONE, 8)
}

fn get_daq_list_info(session: &Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &session.daq_lists[idx];
    ok_header(tx);
    let mut properties = 0u8;
    if !list.is_dynamic {
        properties |= 0x01; // predefined (static) list
    }
    if list.mode.contains(DaqListMode::DIRECTION) {
        properties |= 0x02; // STIM-capable
    }
    tx[1] = properties;
    tx[2] = crate::limits::MAX_ODTS_PER_LIST as u8; // MAX_ODT
    tx[3] = crate::limits::MAX_ODT_ENTRIES_PER_ODT as u8; // MAX_ODT_ENTRIES
    pid::put_u16_le(&mut tx[4..6], list.event); // FIXED_EVENT_CHANNEL
    (DONE, 6)
}

fn free_daq(session: &mut Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    for list in &mut session.daq_lists {
        if list.is_dynamic {
            list.odts.clear();
            list.alloc_entries_per_odt.clear();
            list.max_odt_id_used = 0;
            list.mode = DaqListMode::empty();
        }
    }
    session.alloc_stage = AllocStage::Freed;
    ok_header(tx);
    (DONE, 1)
}

fn alloc_daq(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if session.alloc_stage != AllocStage::Freed {
        return error_response(tx, ErrorCode::Sequence);
    }
    let count = pid::get_u16_le(rx.get(2..4).unwrap_or(&[0, 0]));
    if count as usize > session.daq_lists.capacity() {
        return error_response(tx, ErrorCode::MemoryOverflow);
    }
    session.alloc_stage = AllocStage::DaqAllocated;
    ok_header(tx);
    (DONE, 1)
}

fn alloc_odt(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if session.alloc_stage != AllocStage::DaqAllocated {
        return error_response(tx, ErrorCode::Sequence);
    }
    if rx.len() < 5 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let count = rx[4];
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &mut session.daq_lists[idx];
    if count as usize > crate::limits::MAX_ODTS_PER_LIST {
        return error_response(tx, ErrorCode::MemoryOverflow);
    }
    list.odts.clear();
    for _ in 0..count {
        let _ = list.odts.push(heapless::Vec::new());
        let _ = list.alloc_entries_per_odt.push(0);
    }
    ok_header(tx);
    (DONE, 1)
}

fn alloc_odt_entry(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 6 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let daq_list = pid::get_u16_le(&rx[2..4]);
    let odt = rx[4];
    let count = rx[5];
    let Some(idx) = daq_list_index(session, daq_list) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    let list = &mut session.daq_lists[idx];
    if list.alloc_entries_per_odt.is_empty() {
        // ALLOC_ODT has never run for this list: ordering violation
        // (spec.md §8 P4).
        return error_response(tx, ErrorCode::Sequence);
    }
    let Some(row) = list.odts.get_mut(odt as usize) else {
        return error_response(tx, ErrorCode::OutOfRange);
    };
    if count as usize > crate::limits::MAX_ODT_ENTRIES_PER_ODT {
        return error_response(tx, ErrorCode::MemoryOverflow);
    }
    row.clear();
    for _ in 0..count {
        let _ = row.push(crate::session::OdtEntryRuntime::empty());
    }
    if let Some(slot) = list.alloc_entries_per_odt.get_mut(odt as usize) {
        *slot = count;
    }
    ok_header(tx);
    (DONE, 1)
}

const SEED_CHUNK_HEADROOM: usize = 2;

fn get_seed<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 3 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let mode = rx[1]; // 0 = first chunk, 1 = remaining
    let resource = rx[2];
    let chunk_cap = tx.len() - SEED_CHUNK_HEADROOM;

    if mode == 0 {
        session.seed_key = SeedKeyState::SeedBegun { resource, offset: 0 };
    }
    let offset = match session.seed_key {
        SeedKeyState::SeedBegun { resource: r, offset } if r == resource => offset,
        _ => {
            session.seed_key = SeedKeyState::SeedBegun { resource, offset: 0 };
            0
        }
    };

    let (status, produced) = app.get_seed(resource, &mut tx[2..2 + chunk_cap], chunk_cap);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    tx[1] = produced as u8;
    if produced < chunk_cap {
        session.seed_key = SeedKeyState::SeedFinished { resource };
    } else {
        session.seed_key = SeedKeyState::SeedBegun { resource, offset: offset + produced };
    }
    (DONE, 2 + produced)
}

fn unlock<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if rx.len() < 2 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let resource = match session.seed_key {
        SeedKeyState::SeedFinished { resource } => resource,
        SeedKeyState::UnlockBegun { resource, .. } => resource,
        _ => return error_response(tx, ErrorCode::Sequence),
    };
    let key_len = rx[1] as usize;
    if rx.len() < 2 + key_len {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let (status, accepted) = app.unlock(resource, &rx[2..2 + key_len]);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    if !accepted {
        // §7 item 3: a bad key forces the session to disconnect.
        session.disconnect();
        return error_response(tx, ErrorCode::AccessLocked);
    }
    session.unlocked |= ResourceMask::from_bits_truncate(resource);
    session.seed_key = SeedKeyState::Idle;
    ok_header(tx);
    tx[1] = session.unlocked.bits();
    (DONE, 2)
}

fn transport_layer_cmd(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if rx.len() < 2 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    match rx[1] {
        x if x == transport_cmd::GET_SLAVE_ID => get_slave_id(session, rx, tx),
        x if x == transport_cmd::GET_DAQ_ID => {
            if let Some(e) = connected_or_error(session, tx) {
                return e;
            }
            if rx.len() < 4 {
                return error_response(tx, ErrorCode::CmdSyntax);
            }
            let daq_list = pid::get_u16_le(&rx[2..4]);
            let Some(idx) = daq_list_index(session, daq_list) else {
                return error_response(tx, ErrorCode::OutOfRange);
            };
            ok_header(tx);
            let id = session.daq_lists[idx].runtime_msg_id.unwrap_or(session.cmd_msg_id);
            tx[1] = 0;
            pid::put_u32_le(&mut tx[2..6], id);
            (DONE, 6)
        }
        x if x == transport_cmd::SET_DAQ_ID => {
            if let Some(e) = connected_or_error(session, tx) {
                return e;
            }
            if rx.len() < 8 {
                return error_response(tx, ErrorCode::CmdSyntax);
            }
            let daq_list = pid::get_u16_le(&rx[2..4]);
            let msg_id = pid::get_u32_le(&rx[4..8]);
            let Some(idx) = daq_list_index(session, daq_list) else {
                return error_response(tx, ErrorCode::OutOfRange);
            };
            session.daq_lists[idx].runtime_msg_id = Some(msg_id);
            ok_header(tx);
            (DONE, 1)
        }
        _ => error_response(tx, ErrorCode::CmdUnknown),
    }
}

/// GET_SLAVE_ID specifics (spec.md §4.G note, scenario 2). Valid even while
/// disconnected, since the broadcast id exists precisely to discover
/// sessions that have not connected yet.
fn get_slave_id(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if rx.len() < 6 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    if &rx[2..5] != b"XCP" {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let mode = rx[5];
    if mode == 1 && !session.echo_requested {
        return error_response(tx, ErrorCode::Sequence);
    }
    ok_header(tx);
    if mode == 0 {
        tx[1] = b'X';
        tx[2] = b'C';
        tx[3] = b'P';
        session.echo_requested = true;
    } else {
        tx[1] = !b'X';
        tx[2] = !b'C';
        tx[3] = !b'P';
        session.echo_requested = false;
    }
    pid::put_u32_le(&mut tx[4..8], session.cmd_msg_id);
    (DONE, 8)
}

fn user_cmd(session: &Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    // Pass-through to the application is not representable without an
    // application-defined wire format; report "unknown" rather than guess
    // one (spec.md §4.G: "USER_CMD: pass-through to app").
    error_response(tx, ErrorCode::CmdUnknown)
}

fn program_start(session: &mut Session, tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    session.pgm_state = crate::session::PgmState::Programming;
    ok_header(tx);
    tx[1] = 0;
    tx[2] = session.config.max_cto_len;
    tx[3] = session.config.max_dto_len;
    (DONE, 4)
}

fn program_clear<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    if rx.len() < 8 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let len = pid::get_u32_le(&rx[4..8]);
    session.pgm_state = crate::session::PgmState::Clearing;
    let status = app.program_clear(session.mta, len);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.pgm_state = crate::session::PgmState::Programming;
    ok_header(tx);
    (DONE, 1)
}

fn program<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    if rx.len() < 2 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let n = rx[1] as usize;
    if rx.len() < 2 + n {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let status = app.program(&rx[2..2 + n], n);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    (DONE, 1)
}

fn program_reset<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let status = app.program_reset();
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    // RESET triggers DISCONNECT on success (spec.md §4.G note).
    session.disconnect();
    (DONE, 1)
}

fn program_prepare<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    if rx.len() < 4 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let len = pid::get_u16_le(&rx[2..4]) as u32;
    session.pgm_state = crate::session::PgmState::Clearing;
    let status = app.program_clear(session.mta, len);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    session.pgm_state = crate::session::PgmState::Programming;
    ok_header(tx);
    (DONE, 1)
}

fn program_format(session: &mut Session, rx: &[u8], tx: &mut [u8]) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    if rx.len() < 5 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let (compression, encryption, program_method, access_mode) = (rx[1], rx[2], rx[3], rx[4]);
    if compression != 0 || encryption != 0 || program_method != 0 || access_mode != 0 {
        // Only plain, uncompressed/unencrypted sequential programming is
        // supported (spec.md §1 Non-goals: flash compression/encryption).
        return error_response(tx, ErrorCode::ModeNotValid);
    }
    ok_header(tx);
    (DONE, 1)
}

fn program_next<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    if session.pgm_state != crate::session::PgmState::Programming {
        return error_response(tx, ErrorCode::Sequence);
    }
    if rx.len() < 2 {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let n = rx[1] as usize;
    if rx.len() < 2 + n {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let status = app.program(&rx[2..2 + n], n);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    tx[1] = 0; // MAX_BS: block mode not negotiated (spec.md §1 Non-goals)
    (DONE, 2)
}

fn program_max<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    if !session.unlocked.contains(ResourceMask::PGM) {
        return error_response(tx, ErrorCode::AccessDenied);
    }
    if session.pgm_state != crate::session::PgmState::Programming {
        return error_response(tx, ErrorCode::Sequence);
    }
    let n = (session.config.max_cto_len as usize).saturating_sub(1);
    if rx.len() < 1 + n {
        return error_response(tx, ErrorCode::CmdSyntax);
    }
    let status = app.program(&rx[1..1 + n], n);
    if let Some(r) = map_app_status(status, tx) {
        return r;
    }
    ok_header(tx);
    (DONE, 1)
}

const SET_REQUEST_STORE_CAL: u8 = 0x01;
const SET_REQUEST_STORE_DAQ: u8 = 0x02;
const SET_REQUEST_CLEAR_DAQ: u8 = 0x04;

fn set_request<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: &[u8],
    tx: &mut [u8],
) -> (DispatchResult, usize) {
    if let Some(e) = connected_or_error(session, tx) {
        return e;
    }
    let mode = rx.get(1).copied().unwrap_or(0);
    // CLEAR_DAQ and STORE_DAQ both touch the NV RESUME image, STORE_CAL
    // touches calibration pages; order doesn't matter between them, so run
    // whichever bits are set in a fixed order (spec.md §4.G row).
    if mode & SET_REQUEST_CLEAR_DAQ != 0 {
        let status = app.clear_daq();
        if let Some(r) = map_app_status(status, tx) {
            return r;
        }
    }
    if mode & SET_REQUEST_STORE_DAQ != 0 {
        let status = app.store_daq();
        if let Some(r) = map_app_status(status, tx) {
            return r;
        }
    }
    if mode & SET_REQUEST_STORE_CAL != 0 {
        let status = app.freeze_cal();
        if let Some(r) = map_app_status(status, tx) {
            return r;
        }
    }
    ok_header(tx);
    (DONE, 1)
}

// response/event_code re-exported for callers that need to recognize the
// pending-command event written by crate::xcp's tick loop.
pub use event_code::EV_CMD_PENDING;
