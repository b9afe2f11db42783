//! DAQ sampling engine (spec.md §4.H, component H).
//!
//! Invoked once per application event tick. Walks every RUNNING,
//! non-STIM DAQ list bound to that event, packs ODT entries into DTOs and
//! hands each to the transport layer via [`crate::ring::Ring`]. Never
//! suspends (spec.md §5): it either enqueues atomically or reports
//! overload.

use bitflags::bitflags;

use crate::session::{DaqListMode, Session};
use crate::target::{write_timestamp, ClockSource};

bitflags! {
    /// Union of outcomes across every list processed this tick (spec.md
    /// §4.H "Return code").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DaqOutcome: u8 {
        const EXECUTED      = 0x01;
        const NOT_EXECUTED  = 0x02;
        const DAQ_OVERLOAD  = 0x04;
        const DTO_OVERFILL  = 0x08;
    }
}

/// Sink the engine hands completed DTO payloads to — one call per ODT.
/// Implemented by [`crate::xcp::Xcp`] over the session's per-list
/// [`crate::ring::Ring`]; kept as a trait here so the engine has no direct
/// dependency on the fixed channel layout.
pub trait DtoSink {
    /// Attempt to enqueue `payload` for DAQ list `list_index`, ODT
    /// `odt_index`. `false` means no buffer was free (spec.md §4.H step b).
    fn enqueue(&mut self, list_index: usize, odt_index: usize, payload: &[u8]) -> bool;
}

/// Run one DAQ pass for `event_id` across every list in `session`.
pub fn run_event<S: DtoSink, C: ClockSource, A: crate::app::ApplicationCallbacks>(
    session: &Session,
    app: &mut A,
    clock: &C,
    event_id: u16,
    sink: &mut S,
) -> DaqOutcome {
    let mut outcome = DaqOutcome::empty();
    let mut any_considered = false;

    for (list_index, list) in session.daq_lists.iter().enumerate() {
        let selected = list.mode.contains(DaqListMode::RUNNING)
            && !list.mode.contains(DaqListMode::DIRECTION)
            && list.event == event_id;
        if !selected {
            continue;
        }
        any_considered = true;

        if list.first_odt_empty() {
            outcome |= DaqOutcome::NOT_EXECUTED;
            continue;
        }

        let timestamp_width = if list.mode.contains(DaqListMode::TIMESTAMP) {
            crate::target::TimestampWidth::Byte4
        } else {
            crate::target::TimestampWidth::None
        };

        'odts: for (odt_index, odt) in list.odts.iter().enumerate() {
            if odt.first().map(|e| !e.is_configured()).unwrap_or(true) {
                // §3 I6: an empty ODT ends processing of this list.
                break 'odts;
            }

            let mut frame = [0u8; crate::limits::CAN_PAYLOAD_LEN];
            let mut cursor = 0usize;

            if !list.mode.contains(DaqListMode::PIDOFF) {
                frame[cursor] = list.first_pid.wrapping_add(odt_index as u8);
                cursor += 1;
            }

            if odt_index == 0 && !matches!(timestamp_width, crate::target::TimestampWidth::None) {
                let width = timestamp_width.len();
                if cursor + width > frame.len() {
                    outcome |= DaqOutcome::DTO_OVERFILL;
                    break 'odts;
                }
                write_timestamp(&mut frame[cursor..], clock.now(), timestamp_width);
                cursor += width;
            }

            for entry in odt.iter() {
                if !entry.is_configured() {
                    break;
                }
                if entry.is_bit {
                    if cursor + 1 > frame.len() {
                        outcome |= DaqOutcome::DTO_OVERFILL;
                        break 'odts;
                    }
                    let addr = crate::target::XcpAddress::new(entry.address, entry.extension);
                    let mut byte = [0u8; 1];
                    app.read_memory(addr, &mut byte, 1);
                    frame[cursor] = (byte[0] >> entry.bit_offset) & 1;
                    cursor += 1;
                } else {
                    let len = entry.length as usize;
                    if cursor + len > frame.len() {
                        outcome |= DaqOutcome::DTO_OVERFILL;
                        break 'odts;
                    }
                    let addr = crate::target::XcpAddress::new(entry.address, entry.extension);
                    app.read_memory(addr, &mut frame[cursor..cursor + len], len);
                    cursor += len;
                }
            }

            if !sink.enqueue(list_index, odt_index, &frame[..cursor]) {
                outcome |= DaqOutcome::DAQ_OVERLOAD;
                break 'odts;
            }
            outcome |= DaqOutcome::EXECUTED;
        }
    }

    if !any_considered {
        outcome |= DaqOutcome::NOT_EXECUTED;
    }
    outcome
}
