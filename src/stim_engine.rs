//! STIM engine (spec.md §4.I, component I).
//!
//! Dual of [`crate::daq_engine`]: deframes stimulation DTOs received from
//! the master back into application memory. Unlike the DAQ engine, a STIM
//! pass starts with a completeness check, since frames may have arrived
//! out of order or not at all.

use crate::session::{DaqListMode, Session};

/// Source the engine pulls received STIM frames from — one call per ODT
/// slot, peeking without consuming until the completeness check passes.
pub trait DtoSource {
    /// Peek the frame queued at position `depth` (0 = oldest) for DAQ list
    /// `list_index`, without dequeuing it. `None` if no frame is queued at
    /// that depth yet.
    fn peek(&self, list_index: usize, depth: usize) -> Option<[u8; crate::limits::CAN_PAYLOAD_LEN]>;

    /// Drop the oldest queued frame for `list_index` (used to resynchronize
    /// after a dropped/garbled frame).
    fn pop(&mut self, list_index: usize);
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StimOutcome: u8 {
        const EXECUTED    = 0x01;
        const NOT_EXECUTED = 0x02;
        const DELAYED      = 0x04;
        const MISSING_DTO  = 0x08;
        /// A configured entry reaches past the received frame's length
        /// (dual of `DaqOutcome::DTO_OVERFILL`, spec.md §4.I).
        const DTO_OVERFILL = 0x10;
    }
}

/// Run one STIM pass for `event_id` across every STIM-direction list.
pub fn run_event<S: DtoSource, A: crate::app::ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    event_id: u16,
    source: &mut S,
) -> StimOutcome {
    let mut outcome = StimOutcome::empty();
    let mut any = false;

    for list_index in 0..session.daq_lists.len() {
        let (selected, num_odt, first_pid, pidoff) = {
            let list = &session.daq_lists[list_index];
            (
                list.mode.contains(DaqListMode::RUNNING) && list.mode.contains(DaqListMode::DIRECTION) && list.event == event_id,
                list.num_odt(),
                list.first_pid,
                list.mode.contains(DaqListMode::PIDOFF),
            )
        };
        if !selected {
            continue;
        }
        any = true;

        // Completeness check: every ODT of the list must be present, in
        // PID order (unless PIDOFF), before anything is applied.
        let mut complete = true;
        let mut dropped = false;
        for odt_index in 0..num_odt as usize {
            match source.peek(list_index, odt_index) {
                None => {
                    complete = false;
                    break;
                }
                Some(frame) => {
                    if !pidoff {
                        let expected = first_pid.wrapping_add(odt_index as u8);
                        if frame[0] != expected {
                            dropped = true;
                            complete = false;
                            break;
                        }
                    }
                }
            }
        }

        if dropped {
            // Resynchronize: drop frames until firstPid is at the head, or
            // the queue empties (spec.md §4.I).
            loop {
                match source.peek(list_index, 0) {
                    Some(frame) if pidoff || frame[0] == first_pid => break,
                    Some(_) => source.pop(list_index),
                    None => break,
                }
            }
            outcome |= StimOutcome::MISSING_DTO;
            continue;
        }

        if !complete {
            outcome |= StimOutcome::DELAYED;
            continue;
        }

        'odts: for odt_index in 0..num_odt as usize {
            let Some(frame) = source.peek(list_index, odt_index) else { break };
            let mut cursor = if pidoff { 0 } else { 1 };
            let entries_len = session.daq_lists[list_index]
                .odts
                .get(odt_index)
                .map(|o| o.len())
                .unwrap_or(0);
            for entry_idx in 0..entries_len {
                let entry = session.daq_lists[list_index].odts[odt_index][entry_idx];
                if !entry.is_configured() {
                    break;
                }
                let addr = crate::target::XcpAddress::new(entry.address, entry.extension);
                if entry.is_bit {
                    if cursor + 1 > frame.len() {
                        outcome |= StimOutcome::DTO_OVERFILL;
                        source.pop(list_index);
                        break 'odts;
                    }
                    let mut byte = [0u8; 1];
                    app.read_memory(addr, &mut byte, 1);
                    let bit = (frame[cursor] & 1) != 0;
                    if bit {
                        byte[0] |= 1 << entry.bit_offset;
                    } else {
                        byte[0] &= !(1 << entry.bit_offset);
                    }
                    app.write_memory(addr, &byte, 1);
                    cursor += 1;
                } else {
                    let len = entry.length as usize;
                    if cursor + len > frame.len() {
                        outcome |= StimOutcome::DTO_OVERFILL;
                        source.pop(list_index);
                        break 'odts;
                    }
                    app.write_memory(addr, &frame[cursor..cursor + len], len);
                    cursor += len;
                }
            }
            source.pop(list_index);
        }
        outcome |= StimOutcome::EXECUTED;
    }

    if !any {
        outcome |= StimOutcome::NOT_EXECUTED;
    }
    outcome
}
