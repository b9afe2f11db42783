//! Target primitives (spec.md §4.A, component A).
//!
//! These are the thinnest possible abstraction over the hardware: a
//! timestamp source, a byte-order witness and the interrupt-disable guard.
//! Byte copy/zero are not delegated - `core::ptr`/`slice` already provide
//! them and there is no target-specific variation worth a trait for.
//!
//! Concrete hardware adaptors (the actual timer peripheral, the actual CAN
//! controller) are out of scope (spec.md §1); only the interface is defined
//! here, to be implemented by the integrator.

/// Width, in bytes, of the DAQ clock reported by GET_DAQ_CLOCK and stamped
/// into ODT 0 of a TIMESTAMP-enabled DAQ list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampWidth {
    /// GET_DAQ_CLOCK with width 0 is a protocol error (spec.md §4.G table).
    #[default]
    None,
    Byte1,
    Byte2,
    Byte4,
}

impl TimestampWidth {
    pub const fn len(self) -> usize {
        match self {
            TimestampWidth::None => 0,
            TimestampWidth::Byte1 => 1,
            TimestampWidth::Byte2 => 2,
            TimestampWidth::Byte4 => 4,
        }
    }

    pub fn from_wire(code: u8) -> Option<TimestampWidth> {
        match code {
            0 => Some(TimestampWidth::None),
            1 => Some(TimestampWidth::Byte1),
            2 => Some(TimestampWidth::Byte2),
            4 => Some(TimestampWidth::Byte4),
            _ => None,
        }
    }
}

/// Byte order the slave reports to the master in the CONNECT response.
///
/// Resolved once, at compile time, from the actual in-memory representation
/// of the target - the open question in spec.md §9 (OQ3) about a build-time
/// flag silently drifting from the real target endianness cannot arise here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

pub const TARGET_BYTE_ORDER: ByteOrder = {
    // A 1 stored as a native u16 has its low byte first iff the target is
    // little-endian; read that byte back out at compile time.
    let probe: u16 = 1;
    let bytes = probe.to_ne_bytes();
    if bytes[0] == 1 { ByteOrder::Little } else { ByteOrder::Big }
};

/// Read the current value of the free-running DAQ clock, in the unit the
/// integrator has configured (arbitrary or PTP epoch, microsecond or
/// nanosecond resolution - the crate is agnostic, it only truncates to the
/// requested [`TimestampWidth`]).
pub trait ClockSource {
    fn now(&self) -> u64;
}

/// Write `timestamp`, truncated and in host byte order (spec.md §9: "the
/// timestamp helper is the only exception that follows host endianness"),
/// into `dst`. `dst` must have at least `width.len()` bytes.
pub fn write_timestamp(dst: &mut [u8], timestamp: u64, width: TimestampWidth) {
    match width {
        TimestampWidth::None => {}
        TimestampWidth::Byte1 => dst[0] = timestamp as u8,
        TimestampWidth::Byte2 => {
            let bytes = (timestamp as u16).to_ne_bytes();
            dst[..2].copy_from_slice(&bytes);
        }
        TimestampWidth::Byte4 => {
            let bytes = (timestamp as u32).to_ne_bytes();
            dst[..4].copy_from_slice(&bytes);
        }
    }
}

/// A byte offset into calibration/measurement memory, tagged with the XCP
/// address extension. Not a real pointer - the [`crate::app::ApplicationCallbacks`]
/// implementation resolves `(address, extension)` pairs to effective memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XcpAddress {
    pub address: u32,
    pub extension: u8,
}

impl XcpAddress {
    pub const fn new(address: u32, extension: u8) -> Self {
        XcpAddress { address, extension }
    }

    /// Address 0 is reserved/invalid for SET_MTA (spec.md §4.G table).
    pub fn is_null(self) -> bool {
        self.address == 0 && self.extension == 0
    }

    pub fn advance(self, by: u32) -> Self {
        XcpAddress { address: self.address.wrapping_add(by), extension: self.extension }
    }
}
