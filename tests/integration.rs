//! End-to-end scenarios driving the dispatcher and DAQ engine the way a
//! real master/ECU pair would, without any CAN hardware or ring buffers
//! in the loop - one [`xcp_slave::session::Session`], one application
//! double, ticked directly.

use xcp_slave::app::ApplicationCallbacks;
use xcp_slave::config::{DaqListConfig, OdtConfig, OdtEntryConfig, SegmentConfig};
use xcp_slave::daq_engine::{self, DtoSink};
use xcp_slave::dispatch::{self, TickOutcome};
use xcp_slave::error::AppStatus;
use xcp_slave::pid::{self, response, transport_cmd, CommandPid};
use xcp_slave::target::{ClockSource, TimestampWidth, XcpAddress};
use xcp_slave::{Session, SessionConfigBuilder};

const MEM_LEN: usize = 64;

struct FakeApp {
    memory: [u8; MEM_LEN],
}

impl FakeApp {
    fn new() -> Self {
        FakeApp { memory: [0u8; MEM_LEN] }
    }
}

impl ApplicationCallbacks for FakeApp {
    fn read_memory(&mut self, src: XcpAddress, dst: &mut [u8], len: usize) -> AppStatus {
        let start = src.address as usize;
        dst[..len].copy_from_slice(&self.memory[start..start + len]);
        AppStatus::Finished
    }

    fn write_memory(&mut self, dst: XcpAddress, src: &[u8], len: usize) -> AppStatus {
        let start = dst.address as usize;
        self.memory[start..start + len].copy_from_slice(&src[..len]);
        AppStatus::Finished
    }

    fn checksum(&mut self, _start: XcpAddress, _len: u32) -> (AppStatus, u32) {
        (AppStatus::Finished, 0)
    }

    fn set_cal_page(&mut self, _segment: u8, _page: u8) -> AppStatus {
        AppStatus::Finished
    }

    fn copy_cal_page(&mut self, _segment: u8, _src_page: u8, _dst_page: u8) -> AppStatus {
        AppStatus::Finished
    }

    fn unlock(&mut self, _resource: u8, key: &[u8]) -> (AppStatus, bool) {
        (AppStatus::Finished, key.first() == Some(&0))
    }

    fn get_seed(&mut self, _resource: u8, seed: &mut [u8], len: usize) -> (AppStatus, usize) {
        // Always shorter than any requested chunk, so a single GET_SEED
        // call reaches SeedFinished without a second "remaining" round.
        let produced = len.min(4);
        for (i, b) in seed.iter_mut().take(produced).enumerate() {
            *b = i as u8;
        }
        (AppStatus::Finished, produced)
    }

    fn program_clear(&mut self, _start: XcpAddress, _len: u32) -> AppStatus {
        AppStatus::Finished
    }

    fn program(&mut self, _data: &[u8], _len: usize) -> AppStatus {
        AppStatus::Finished
    }

    fn program_reset(&mut self) -> AppStatus {
        AppStatus::Finished
    }

    fn freeze_cal(&mut self) -> AppStatus {
        AppStatus::Finished
    }

    fn store_daq(&mut self) -> AppStatus {
        AppStatus::Finished
    }

    fn clear_daq(&mut self) -> AppStatus {
        AppStatus::Finished
    }

    fn poll(&mut self) -> AppStatus {
        AppStatus::Finished
    }
}

struct FixedClock(u64);

impl ClockSource for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

struct VecSink {
    frames: Vec<(usize, usize, Vec<u8>)>,
}

impl VecSink {
    fn new() -> Self {
        VecSink { frames: Vec::new() }
    }
}

impl DtoSink for VecSink {
    fn enqueue(&mut self, list_index: usize, odt_index: usize, payload: &[u8]) -> bool {
        self.frames.push((list_index, odt_index, payload.to_vec()));
        true
    }
}

fn tick_cmd(session: &mut Session, app: &mut FakeApp, rx: &[u8]) -> (TickOutcome, Vec<u8>) {
    let mut tx = [0u8; 8];
    let (outcome, len) = dispatch::tick(session, app, Some(rx), true, &mut tx);
    (outcome, tx[..len].to_vec())
}

fn connected_session() -> (Session, FakeApp) {
    let config = SessionConfigBuilder::new().build().unwrap();
    let mut session = Session::new(config);
    session.cmd_msg_id = 0x100;
    let mut app = FakeApp::new();
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &[CommandPid::Connect as u8, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    assert!(session.is_connected());
    (session, app)
}

#[test]
fn handshake_connects_and_reports_status() {
    let (mut session, mut app) = connected_session();

    let (outcome, tx) = tick_cmd(&mut session, &mut app, &[CommandPid::GetStatus as u8, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    assert_eq!(tx[1] & 0x01, 0x01); // CONNECTED bit set

    let (outcome, tx) = tick_cmd(&mut session, &mut app, &[CommandPid::Disconnect as u8, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    assert!(!session.is_connected());
}

#[test]
fn commands_are_dropped_while_disconnected() {
    let config = SessionConfigBuilder::new().build().unwrap();
    let mut session = Session::new(config);
    let mut app = FakeApp::new();

    let (outcome, tx) = tick_cmd(&mut session, &mut app, &[CommandPid::GetStatus as u8, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(outcome, TickOutcome::Completed);
    assert!(tx.is_empty(), "unconnected commands other than CONNECT get no response");
}

#[test]
fn slave_id_broadcast_echo_mode_handshake() {
    let (mut session, mut app) = connected_session();

    let req = [CommandPid::TransportLayerCmd as u8, transport_cmd::GET_SLAVE_ID, b'X', b'C', b'P', 0];
    let mut req8 = [0u8; 8];
    req8[..req.len()].copy_from_slice(&req);
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &req8);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(&tx[1..4], b"XCP");
    assert!(session.echo_requested);

    let req_echo = [CommandPid::TransportLayerCmd as u8, transport_cmd::GET_SLAVE_ID, b'X', b'C', b'P', 1];
    let mut req8 = [0u8; 8];
    req8[..req_echo.len()].copy_from_slice(&req_echo);
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &req8);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[1], !b'X');
    assert_eq!(tx[2], !b'C');
    assert_eq!(tx[3], !b'P');
    assert!(!session.echo_requested);
}

#[test]
fn calibration_round_trip_set_mta_download_upload() {
    let (mut session, mut app) = connected_session();

    // SET_MTA to address 0x10, extension 0.
    let mut set_mta = [CommandPid::SetMta as u8, 0, 0, 0, 0, 0, 0, 0];
    pid::put_u32_le(&mut set_mta[4..8], 0x10);
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &set_mta);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);

    // DOWNLOAD 6 bytes of payload.
    let payload = [1u8, 2, 3, 4, 5, 6];
    let mut download = [0u8; 8];
    download[0] = CommandPid::Download as u8;
    download[1] = payload.len() as u8;
    download[2..8].copy_from_slice(&payload);
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &download);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    assert_eq!(&app.memory[0x10..0x16], &payload);

    // Rewind the MTA and read it back via SHORT_UPLOAD.
    let mut short_upload = [CommandPid::ShortUpload as u8, payload.len() as u8, 0, 0, 0, 0, 0, 0];
    pid::put_u32_le(&mut short_upload[4..8], 0x10);
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &short_upload);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    assert_eq!(&tx[1..1 + payload.len()], &payload);
}

#[test]
fn block_upload_of_twenty_bytes_over_eight_byte_cto() {
    let (mut session, mut app) = connected_session();
    for (i, b) in app.memory[0..20].iter_mut().enumerate() {
        *b = i as u8;
    }

    // Address 0 with extension 0 is rejected as null, so address the
    // block with a nonzero extension instead.
    let set_mta = [CommandPid::SetMta as u8, 0, 0, 1, 0, 0, 0, 0];
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &set_mta);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);

    let mut collected = Vec::new();
    let upload = [CommandPid::Upload as u8, 20, 0, 0, 0, 0, 0, 0];
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &upload);
    assert_eq!(outcome, TickOutcome::MoreToSend);
    assert_eq!(tx.len(), 8); // 1 header + 7 payload bytes
    collected.extend_from_slice(&tx[1..]);
    assert_eq!(session.upload_remaining, 13);

    let (outcome, tx) = tick_cmd(&mut session, &mut app, &upload);
    assert_eq!(outcome, TickOutcome::MoreToSend);
    assert_eq!(tx.len(), 8);
    collected.extend_from_slice(&tx[1..]);
    assert_eq!(session.upload_remaining, 6);

    let (outcome, tx) = tick_cmd(&mut session, &mut app, &upload);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx.len(), 7); // 1 header + 6 remaining payload bytes
    collected.extend_from_slice(&tx[1..]);
    assert_eq!(session.upload_remaining, 0);

    let expected: Vec<u8> = (0u8..20).collect();
    assert_eq!(collected, expected);
}

#[test]
fn seed_key_unlock_flow() {
    let (mut session, mut app) = connected_session();

    let seed_req = [CommandPid::GetSeed as u8, 0, pid::resource::CAL_PAG, 0, 0, 0, 0, 0];
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &seed_req);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    let seed_len = tx[1] as usize;
    assert!(seed_len > 0);

    let mut unlock_req = [0u8; 8];
    unlock_req[0] = CommandPid::Unlock as u8;
    unlock_req[1] = 1;
    unlock_req[2] = 0; // key[0] == 0 is accepted by FakeApp::unlock
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &unlock_req);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::OK);
    assert_eq!(tx[1] & pid::resource::CAL_PAG, pid::resource::CAL_PAG);

    // A bad key forces disconnection (spec.md §7 item 3).
    let (mut session, mut app) = connected_session();
    let (_, _) = tick_cmd(&mut session, &mut app, &seed_req);
    let mut bad_unlock = [0u8; 8];
    bad_unlock[0] = CommandPid::Unlock as u8;
    bad_unlock[1] = 1;
    bad_unlock[2] = 0xFF; // rejected by FakeApp::unlock
    let (outcome, tx) = tick_cmd(&mut session, &mut app, &bad_unlock);
    assert_eq!(outcome, TickOutcome::Completed);
    assert_eq!(tx[0], response::ERROR);
    assert!(!session.is_connected());
}

#[test]
fn static_daq_list_fires_on_event_and_packs_entries() {
    let odt = OdtConfig { entries: heapless::Vec::from_slice(&[OdtEntryConfig { address: 0x20, extension: 0, length: 4 }]).unwrap() };
    let mut list = DaqListConfig::empty(7, false);
    list.odts.push(odt).unwrap();
    list.timestamp = TimestampWidth::None;

    let config = SessionConfigBuilder::new()
        .add_segment(SegmentConfig { segment_id: 0, num_pages: 2 })
        .unwrap()
        .add_daq_list(list)
        .unwrap()
        .build()
        .unwrap();

    let mut session = Session::new(config);
    session.daq_lists[0].mode |= xcp_slave::session::DaqListMode::RUNNING;

    let mut app = FakeApp::new();
    app.memory[0x20..0x24].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let clock = FixedClock(1234);
    let mut sink = VecSink::new();
    let outcome = daq_engine::run_event(&session, &mut app, &clock, 7, &mut sink);
    assert!(outcome.contains(daq_engine::DaqOutcome::EXECUTED));
    assert_eq!(sink.frames.len(), 1);
    let (list_index, odt_index, payload) = &sink.frames[0];
    assert_eq!(*list_index, 0);
    assert_eq!(*odt_index, 0);
    assert_eq!(payload[0], 0); // PID of ODT 0
    assert_eq!(&payload[1..5], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn daq_list_with_empty_first_odt_is_not_executed() {
    let list = DaqListConfig::empty(3, false);
    let config = SessionConfigBuilder::new().add_daq_list(list).unwrap().build().unwrap();
    let mut session = Session::new(config);
    session.daq_lists[0].mode |= xcp_slave::session::DaqListMode::RUNNING;

    let mut app = FakeApp::new();
    let clock = FixedClock(0);
    let mut sink = VecSink::new();
    let outcome = daq_engine::run_event(&session, &mut app, &clock, 3, &mut sink);
    assert!(outcome.contains(daq_engine::DaqOutcome::NOT_EXECUTED));
    assert!(sink.frames.is_empty());
}
