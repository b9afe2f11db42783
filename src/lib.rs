//! XCP slave driver core: protocol engine, DAQ/STIM sampling and CAN
//! transport for embedded targets.
//!
//! This crate implements the slave (ECU) side of the ASAM XCP protocol
//! over CAN. It owns the command dispatcher, the per-session state
//! machine, the DAQ/STIM sampling engines and the ring-buffer transport
//! discipline between an interrupt-driven CAN controller and the
//! cooperative command-processor task. It does not own a CAN controller,
//! memory map, or clock source — those are supplied by the integrator
//! through the traits in [`target`], [`can`] and [`app`].
#![no_std]

pub mod app;
pub mod can;
pub mod can_bridge;
pub mod calpage_proxy;
pub mod commands;
pub mod config;
pub mod daq_engine;
pub mod dispatch;
pub mod error;
pub mod limits;
pub mod pid;
pub mod ring;
pub mod session;
pub mod stim_engine;
pub mod target;
pub mod xcp;

#[cfg(feature = "resume-persist")]
pub mod persist;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{AppStatus, ConfigError, ErrorCode, XcpError};
pub use session::Session;
pub use xcp::Xcp;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DaqListConfig, OdtConfig, OdtEntryConfig, SegmentConfig};

    pub(crate) fn two_page_segment() -> SessionConfig {
        SessionConfigBuilder::new()
            .add_segment(SegmentConfig { segment_id: 0, num_pages: 2 })
            .expect("segment config valid")
            .build()
            .expect("session config valid")
    }

    #[test]
    fn builder_rejects_single_page_segment() {
        let err = SessionConfigBuilder::new().add_segment(SegmentConfig { segment_id: 0, num_pages: 1 });
        assert_eq!(err.unwrap_err(), ConfigError::SegmentNeedsTwoPages);
    }

    #[test]
    fn builder_rejects_overlapping_pid_ranges() {
        let mut odts_a: heapless::Vec<OdtConfig, { crate::limits::MAX_ODTS_PER_LIST }> = heapless::Vec::new();
        let mut odt = OdtConfig::empty();
        odt.entries.push(OdtEntryConfig { address: 0x1000, extension: 0, length: 2 }).unwrap();
        odts_a.push(odt).unwrap();

        let list_a = DaqListConfig { event_channel: 1, direction_stim: false, first_pid: 0x10, odts: odts_a.clone(), timestamp: target::TimestampWidth::None, priority: 0 };
        let list_b = DaqListConfig { event_channel: 1, direction_stim: false, first_pid: 0x10, odts: odts_a, timestamp: target::TimestampWidth::None, priority: 0 };

        let builder = SessionConfigBuilder::new().add_daq_list(list_a).unwrap();
        let err = builder.add_daq_list(list_b);
        assert_eq!(err.unwrap_err(), ConfigError::PidRangeOverlap);
    }

    #[test]
    fn session_starts_disconnected_and_connect_sets_status() {
        let config = two_page_segment();
        let mut session = Session::new(config);
        assert!(!session.is_connected());

        let rx = [pid::CommandPid::Connect as u8, 0x00];
        let mut tx = [0u8; 8];
        let (result, len) = commands::dispatch_command(&mut session, &mut NullApp, &rx, &mut tx, 0);
        assert!(result.contains(dispatch::DispatchResult::TX_READY));
        assert_eq!(len, 8);
        assert_eq!(tx[0], pid::response::OK);
        assert!(session.is_connected());
    }

    #[test]
    fn disconnect_wipes_daq_state() {
        let config = two_page_segment();
        let mut session = Session::new(config);
        session.connection = session::ConnectionMode::Normal;
        session.mta = target::XcpAddress::new(0x2000, 0);

        let rx = [pid::CommandPid::Disconnect as u8];
        let mut tx = [0u8; 8];
        let (result, _) = commands::dispatch_command(&mut session, &mut NullApp, &rx, &mut tx, 0);
        assert!(result.contains(dispatch::DispatchResult::RX_READY));
        assert!(!session.is_connected());
        assert_eq!(session.mta, target::XcpAddress::default());
    }

    struct NullApp;
    impl app::ApplicationCallbacks for NullApp {
        fn read_memory(&mut self, _src: target::XcpAddress, dst: &mut [u8], len: usize) -> AppStatus {
            dst[..len].fill(0);
            AppStatus::Finished
        }
        fn write_memory(&mut self, _dst: target::XcpAddress, _src: &[u8], _len: usize) -> AppStatus {
            AppStatus::Finished
        }
        fn checksum(&mut self, _start: target::XcpAddress, _len: u32) -> (AppStatus, u32) {
            (AppStatus::Finished, 0)
        }
        fn set_cal_page(&mut self, _segment: u8, _page: u8) -> AppStatus {
            AppStatus::Finished
        }
        fn copy_cal_page(&mut self, _segment: u8, _src_page: u8, _dst_page: u8) -> AppStatus {
            AppStatus::Finished
        }
        fn unlock(&mut self, _resource: u8, _key: &[u8]) -> (AppStatus, bool) {
            (AppStatus::Finished, true)
        }
        fn get_seed(&mut self, _resource: u8, seed: &mut [u8], len: usize) -> (AppStatus, usize) {
            seed[..len.min(seed.len())].fill(0);
            (AppStatus::Finished, len.min(seed.len()))
        }
        fn program_clear(&mut self, _start: target::XcpAddress, _len: u32) -> AppStatus {
            AppStatus::Finished
        }
        fn program(&mut self, _data: &[u8], _len: usize) -> AppStatus {
            AppStatus::Finished
        }
        fn program_reset(&mut self) -> AppStatus {
            AppStatus::Finished
        }
        fn poll(&mut self) -> AppStatus {
            AppStatus::Finished
        }
    }
}
