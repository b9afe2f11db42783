// main
// xcp-slave host simulation
//
// Drives the xcp-slave driver over an in-process software CAN bus, with a
// flat byte-array "ECU memory" standing in for the real target. Useful to
// exercise the handshake, calibration and DAQ paths without any hardware.

#[allow(unused_imports)]
use log::{debug, info, trace, warn};

use std::cell::RefCell;
use std::time::Instant;

use xcp_slave::app::ApplicationCallbacks;
use xcp_slave::can::{CanDriver, CanFrame, CanId, MsgObjId};
use xcp_slave::error::AppStatus;
use xcp_slave::target::{ClockSource, XcpAddress};
use xcp_slave::xcp::ChannelBinding;
use xcp_slave::{SessionConfigBuilder, Xcp};

//-----------------------------------------------------------------------------
// Command line arguments

use clap::Parser;

const DEFAULT_LOG_LEVEL: u8 = 3; // (Off=0, Error=1, Warn=2, Info=3, Debug=4, Trace=5)
const DEFAULT_TICKS: u32 = 200;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log level (Off=0, Error=1, Warn=2, Info=3, Debug=4, Trace=5)
    #[arg(short, long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: u8,

    /// Number of mainloop ticks to run before exiting
    #[arg(short, long, default_value_t = DEFAULT_TICKS)]
    ticks: u32,
}

//-----------------------------------------------------------------------------
// Software CAN bus: a single-hop loopback between the driver and the master
// stub below, addressed by raw msg id rather than a real arbitration bus.

struct LoopbackBus {
    // Frames the driver has queued for "transmission", captured for the
    // master stub to read back out instead of a real bus.
    sent: RefCell<Vec<(MsgObjId, CanFrame)>>,
}

impl LoopbackBus {
    fn new() -> Self {
        LoopbackBus { sent: RefCell::new(Vec::new()) }
    }

    fn drain(&self) -> Vec<(MsgObjId, CanFrame)> {
        self.sent.borrow_mut().drain(..).collect()
    }
}

impl CanDriver for LoopbackBus {
    fn transmit(&self, mobj: MsgObjId, frame: &CanFrame) -> bool {
        self.sent.borrow_mut().push((mobj, *frame));
        true
    }

    fn tx_ready(&self, _mobj: MsgObjId) -> bool {
        true
    }
}

//-----------------------------------------------------------------------------
// Clock source

struct WallClock {
    start: Instant,
}

impl ClockSource for WallClock {
    fn now(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

//-----------------------------------------------------------------------------
// Application callbacks over a flat byte array standing in for ECU memory

const ECU_MEMORY_LEN: usize = 4096;

struct SimApp {
    memory: [u8; ECU_MEMORY_LEN],
}

impl SimApp {
    fn new() -> Self {
        SimApp { memory: [0u8; ECU_MEMORY_LEN] }
    }

    fn slice(&self, addr: XcpAddress, len: usize) -> Option<&[u8]> {
        let start = addr.address as usize;
        self.memory.get(start..start + len)
    }
}

impl ApplicationCallbacks for SimApp {
    fn read_memory(&mut self, src: XcpAddress, dst: &mut [u8], len: usize) -> AppStatus {
        let start = src.address as usize;
        if start + len > self.memory.len() {
            return AppStatus::Error;
        }
        dst[..len].copy_from_slice(&self.memory[start..start + len]);
        AppStatus::Finished
    }

    fn write_memory(&mut self, dst: XcpAddress, src: &[u8], len: usize) -> AppStatus {
        let start = dst.address as usize;
        if start + len > self.memory.len() {
            return AppStatus::Error;
        }
        self.memory[start..start + len].copy_from_slice(&src[..len]);
        AppStatus::Finished
    }

    fn checksum(&mut self, start: XcpAddress, len: u32) -> (AppStatus, u32) {
        match self.slice(start, len as usize) {
            Some(bytes) => (AppStatus::Finished, bytes.iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32))),
            None => (AppStatus::Error, 0),
        }
    }

    fn set_cal_page(&mut self, _segment: u8, _page: u8) -> AppStatus {
        AppStatus::Finished
    }

    fn copy_cal_page(&mut self, _segment: u8, _src_page: u8, _dst_page: u8) -> AppStatus {
        AppStatus::Finished
    }

    fn unlock(&mut self, _resource: u8, key: &[u8]) -> (AppStatus, bool) {
        // Demo key: the seed echoed back unmodified is accepted.
        (AppStatus::Finished, !key.is_empty())
    }

    fn get_seed(&mut self, _resource: u8, seed: &mut [u8], len: usize) -> (AppStatus, usize) {
        for (i, b) in seed.iter_mut().take(len).enumerate() {
            *b = i as u8;
        }
        (AppStatus::Finished, len)
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

//-----------------------------------------------------------------------------
// Demo main

const CMD_MSG_ID: u32 = 0x100;
const RES_MSG_ID: u32 = 0x101;
const EVENT_MSG_ID: u32 = 0x102;
const BROADCAST_MSG_ID: u32 = 0x7DE;
const DAQ_MSG_ID_BASE: u32 = 0x200;

fn main() {
    println!("xcp-slave host simulation");

    let args = Args::parse();
    let log_level = match args.log_level {
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        5 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Error,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let bus = LoopbackBus::new();
    let clock = WallClock { start: Instant::now() };
    let mut app = SimApp::new();

    let config = SessionConfigBuilder::new().build().expect("default session config is always valid");

    let mut xcp = Xcp::new(bus, clock);
    let binding = ChannelBinding { event_mobj: MsgObjId(1), res_mobj: MsgObjId(2), daq_mobj: [MsgObjId(3); xcp_slave::limits::MAX_DAQ_LISTS] };
    let _ = DAQ_MSG_ID_BASE;
    let session_index = xcp
        .add_session(config, CMD_MSG_ID, RES_MSG_ID, EVENT_MSG_ID, BROADCAST_MSG_ID, binding)
        .expect("first session always fits");

    info!("session {} registered, sending CONNECT", session_index);

    // A real master would address CMD_MSG_ID over an actual bus; here we
    // feed the CONNECT frame straight into the RX path.
    let connect = CanFrame::new(CanId::Standard(CMD_MSG_ID as u16), [0xFF, 0, 0, 0, 0, 0, 0, 0]);
    xcp.on_can_rx(&connect);

    for tick in 0..args.ticks {
        xcp.run_dispatcher_tick(&mut app);

        if tick == 10 {
            xcp.on_daq_event(&mut app, 0);
        }

        if let Some(session) = xcp.session(session_index) {
            if session.is_connected() && tick == 1 {
                info!("slave connected, status = {:?}", session.status());
            }
        }
    }

    info!("simulation finished, {} ticks run", args.ticks);
}
