//! Persisted (RESUME) DAQ configuration (spec.md §6 "Persisted state",
//! gated behind the `resume-persist` feature since it needs an
//! [`NvStore`] implementation from the integrator).
//!
//! Layout, byte for byte: a 4-byte magic, `(sessionCfgId: u16,
//! numDynDaqLists: u8, numResumeDaqLists: u8)`, then for each
//! resume-marked list a fixed header (`daqListId: u16, maxOdtIdUsed: u8,
//! daqListMode: u8, daqEvent: u16`), optionally the dynamic-config block,
//! then the ODT-entry table. The transport layer may append its own
//! per-list state after that (spec.md §6) — modeled here as an opaque
//! trailing blob the integrator's [`crate::can::CanDriver`] owns the
//! meaning of.

use crate::error::PersistError;
use crate::pid::{get_u16_le, get_u32_le, put_u16_le, put_u32_le};
use crate::session::{DaqListMode, OdtEntryRuntime, Session};

const MAGIC: [u8; 4] = *b"XCPp";

/// Non-volatile storage seam. Implemented by the integrator over whatever
/// flash/EEPROM region they reserve for this; reads and writes are always
/// whole-region (the region is small and rewritten as a unit on
/// SET_REQUEST's STORE_DAQ, spec.md §4.G).
pub trait NvStore {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> bool;
    fn write(&mut self, offset: usize, buf: &[u8]) -> bool;
    fn len(&self) -> usize;
}

const HEADER_LEN: usize = 4 + 2 + 1 + 1;
const LIST_HEADER_LEN: usize = 2 + 1 + 1 + 2;
const ENTRY_LEN: usize = 4 + 1 + 1 + 1;

/// Serialize every DAQ list whose mode has RESUME set into `store`,
/// starting at offset 0. Returns the number of bytes written.
pub fn store<N: NvStore>(session: &Session, session_cfg_id: u16, store: &mut N) -> Result<usize, PersistError> {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&MAGIC);
    put_u16_le(&mut buf[4..6], session_cfg_id);
    let resume_lists: heapless::Vec<usize, { crate::limits::MAX_DAQ_LISTS }> = session
        .daq_lists
        .iter()
        .enumerate()
        .filter(|(_, l)| l.mode.contains(DaqListMode::RESUME))
        .map(|(i, _)| i)
        .collect();
    buf[6] = session.daq_lists.iter().filter(|l| l.is_dynamic).count() as u8;
    buf[7] = resume_lists.len() as u8;
    if !store.write(0, &buf) {
        return Err(PersistError::Truncated);
    }

    let mut offset = HEADER_LEN;
    for &list_index in resume_lists.iter() {
        let list = &session.daq_lists[list_index];
        let mut header = [0u8; LIST_HEADER_LEN];
        put_u16_le(&mut header[0..2], list_index as u16);
        header[2] = list.max_odt_id_used;
        header[3] = list.mode.bits();
        put_u16_le(&mut header[4..6], list.event);
        if !store.write(offset, &header) {
            return Err(PersistError::Truncated);
        }
        offset += LIST_HEADER_LEN;

        for odt in &list.odts {
            for entry in odt.iter() {
                let mut e = [0u8; ENTRY_LEN];
                put_u32_le(&mut e[0..4], entry.address);
                e[4] = entry.extension;
                e[5] = entry.length;
                e[6] = (entry.is_bit as u8) | (entry.bit_offset << 1);
                if !store.write(offset, &e) {
                    return Err(PersistError::Truncated);
                }
                offset += ENTRY_LEN;
            }
        }
    }
    Ok(offset)
}

/// Reconstruct RESUME-marked DAQ lists from `store` into `session`. The
/// session's other fields (connection, MTA, seed/key) are untouched — a
/// RESUME restores DAQ configuration only, not a live tool connection.
pub fn load<N: NvStore>(session: &mut Session, store: &mut N) -> Result<(), PersistError> {
    let mut header = [0u8; HEADER_LEN];
    if !store.read(0, &mut header) {
        return Err(PersistError::Truncated);
    }
    if header[0..4] != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let num_resume = header[7] as usize;

    let mut offset = HEADER_LEN;
    for _ in 0..num_resume {
        let mut list_header = [0u8; LIST_HEADER_LEN];
        if !store.read(offset, &mut list_header) {
            return Err(PersistError::Truncated);
        }
        offset += LIST_HEADER_LEN;
        let list_index = get_u16_le(&list_header[0..2]) as usize;
        let max_odt_id_used = list_header[2];
        let mode = DaqListMode::from_bits_truncate(list_header[3]);
        let event = get_u16_le(&list_header[4..6]);

        let Some(list) = session.daq_lists.get_mut(list_index) else {
            return Err(PersistError::ListOutOfRange);
        };
        list.mode = mode;
        list.event = event;
        list.max_odt_id_used = max_odt_id_used;

        for odt in &mut list.odts {
            for entry in odt.iter_mut() {
                let mut e = [0u8; ENTRY_LEN];
                if !store.read(offset, &mut e) {
                    return Err(PersistError::Truncated);
                }
                offset += ENTRY_LEN;
                let address = get_u32_le(&e[0..4]);
                let extension = e[4];
                let length = e[5];
                let is_bit = (e[6] & 1) != 0;
                let bit_offset = e[6] >> 1;
                *entry = OdtEntryRuntime { address, extension, length, is_bit, bit_offset };
            }
        }
    }
    Ok(())
}
