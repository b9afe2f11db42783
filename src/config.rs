//! Session and DAQ configuration (spec.md §4.C/§4.G static-DAQ table, §9).
//!
//! [`SessionConfig`] is the validated, immutable shape a [`crate::session::Session`]
//! is built from; [`SessionConfigBuilder`] is how an integrator assembles one
//! without hand-checking every invariant themselves, in the same
//! builder style as a validated-config-then-build API.

use heapless::Vec;

use crate::error::ConfigError;
use crate::limits::{
    MAX_CHANNELS, MAX_DAQ_LISTS, MAX_ODTS_PER_LIST, MAX_ODT_ENTRIES_PER_ODT,
};
use crate::target::TimestampWidth;

/// One calibration memory segment: a named, page-switchable region.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    pub segment_id: u8,
    /// Number of pages (ECU page + tool page at minimum; spec.md §4.G
    /// invariant: a segment must have at least two pages to be switchable).
    pub num_pages: u8,
}

/// One ODT entry: a fixed-size field sampled or stimulated each event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OdtEntryConfig {
    pub address: u32,
    pub extension: u8,
    pub length: u8,
}

/// One ODT: an ordered list of entries, transmitted as a single CAN frame.
#[derive(Debug, Clone)]
pub struct OdtConfig {
    pub entries: Vec<OdtEntryConfig, MAX_ODT_ENTRIES_PER_ODT>,
}

impl OdtConfig {
    pub fn empty() -> Self {
        OdtConfig { entries: Vec::new() }
    }

    /// Bytes of payload the entries occupy, excluding the PID byte.
    pub fn payload_len(&self) -> usize {
        self.entries.iter().map(|e| e.length as usize).sum()
    }
}

/// Static configuration of one DAQ list (spec.md §4.G static-DAQ table).
/// Dynamic lists (allocated via FREE_DAQ/ALLOC_DAQ/ALLOC_ODT/ALLOC_ODT_ENTRY,
/// spec.md §4.C) start from [`DaqListConfig::empty`] and are filled in at
/// runtime by [`crate::session::Session`]; the shape is identical either way.
#[derive(Debug, Clone)]
pub struct DaqListConfig {
    pub event_channel: u16,
    pub direction_stim: bool,
    pub first_pid: u8,
    pub odts: Vec<OdtConfig, MAX_ODTS_PER_LIST>,
    pub timestamp: TimestampWidth,
    /// Priority used by TX arbitration (spec.md §4.D): lower is more
    /// urgent, matching the CAN message id of the first ODT.
    pub priority: u8,
}

impl DaqListConfig {
    pub fn empty(event_channel: u16, direction_stim: bool) -> Self {
        DaqListConfig {
            event_channel,
            direction_stim,
            first_pid: 0,
            odts: Vec::new(),
            timestamp: TimestampWidth::None,
            priority: u8::MAX,
        }
    }

    /// Highest PID used by this list's ODTs; used by [`SessionConfigBuilder`]
    /// to detect PID range collisions between DAQ lists (spec.md §9 OQ
    /// resolution, see DESIGN.md).
    pub fn last_pid(&self) -> u16 {
        self.first_pid as u16 + self.odts.len().saturating_sub(1) as u16
    }
}

/// Validated, immutable session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub segments: Vec<SegmentConfig, 8>,
    pub daq_lists: Vec<DaqListConfig, MAX_DAQ_LISTS>,
    pub max_cto_len: u8,
    pub max_dto_len: u8,
    /// Seed/key resource mask the driver requires unlocked before allowing
    /// DAQ start or calibration writes (spec.md §4.G RESOURCE bits).
    pub protected_resources: u8,
    /// Width of the clock GET_DAQ_CLOCK reports. Configured once per
    /// session, not read from the command (GET_DAQ_CLOCK is a bare PID with
    /// no payload; spec.md §4.G table).
    pub daq_clock_width: TimestampWidth,
}

impl SessionConfig {
    pub fn channel_count(&self) -> usize {
        crate::limits::FIXED_CHANNELS + self.daq_lists.len()
    }
}

/// Builder for [`SessionConfig`], validating every invariant named in
/// spec.md §4.C/§4.G before a session can be built from the result
/// (§9: "configuration errors must be caught before the session starts,
/// not discovered mid-protocol").
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    segments: Vec<SegmentConfig, 8>,
    daq_lists: Vec<DaqListConfig, MAX_DAQ_LISTS>,
    max_cto_len: u8,
    max_dto_len: u8,
    protected_resources: u8,
    daq_clock_width: TimestampWidth,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        SessionConfigBuilder {
            segments: Vec::new(),
            daq_lists: Vec::new(),
            max_cto_len: crate::limits::MAX_CTO_LEN as u8,
            max_dto_len: crate::limits::MAX_DTO_LEN as u8,
            protected_resources: 0,
            daq_clock_width: TimestampWidth::Byte4,
        }
    }

    pub fn protected_resources(mut self, mask: u8) -> Self {
        self.protected_resources = mask;
        self
    }

    /// Set the width GET_DAQ_CLOCK reports (default: 4 bytes).
    pub fn daq_clock_width(mut self, width: TimestampWidth) -> Self {
        self.daq_clock_width = width;
        self
    }

    pub fn add_segment(mut self, segment: SegmentConfig) -> Result<Self, ConfigError> {
        if segment.num_pages < 2 {
            return Err(ConfigError::SegmentNeedsTwoPages);
        }
        self.segments.push(segment).map_err(|_| ConfigError::TooManySegments)?;
        Ok(self)
    }

    pub fn add_daq_list(mut self, list: DaqListConfig) -> Result<Self, ConfigError> {
        if list.odts.len() > MAX_ODTS_PER_LIST {
            return Err(ConfigError::TooManyOdts);
        }
        for odt in &list.odts {
            if odt.entries.len() > MAX_ODT_ENTRIES_PER_ODT {
                return Err(ConfigError::TooManyOdtEntries);
            }
        }
        for existing in &self.daq_lists {
            let overlap = list.first_pid as u16 <= existing.last_pid()
                && existing.first_pid as u16 <= list.last_pid();
            if overlap {
                return Err(ConfigError::PidRangeOverlap);
            }
        }
        self.daq_lists.push(list).map_err(|_| ConfigError::TooManyDaqLists)?;
        Ok(self)
    }

    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        if self.daq_lists.len() + crate::limits::FIXED_CHANNELS > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels);
        }
        Ok(SessionConfig {
            segments: self.segments,
            daq_lists: self.daq_lists,
            max_cto_len: self.max_cto_len,
            max_dto_len: self.max_dto_len,
            protected_resources: self.protected_resources,
            daq_clock_width: self.daq_clock_width,
        })
    }
}
