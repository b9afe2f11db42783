//! Calibration-page proxy (spec.md §4.J, component J).
//!
//! Translates an XCP logical address on a segment's "tool page" into the
//! effective address of either the live ECU page or the master-writable
//! working page, and rejects writes that fall outside the working page's
//! extent. The page-switch bookkeeping itself lives in
//! [`crate::session::Session::active_page`]; this module is the pure
//! address-translation function the command handlers and engines share.

use crate::config::SessionConfig;
use crate::target::XcpAddress;

/// One segment's page layout: a base address per page, all the same
/// extent (`page_size`), indexed `0..num_pages`.
#[derive(Debug, Clone, Copy)]
pub struct SegmentLayout {
    pub segment_id: u8,
    pub page_base: [u32; 8],
    pub page_size: u32,
}

/// Resolve a logical address within `segment` on `logical_page` to the
/// effective address on `active_page`, or `None` if the address falls
/// outside the segment's page extent (write-protected, spec.md §4.J).
pub fn resolve(
    layout: &SegmentLayout,
    logical_offset: u32,
    active_page: u8,
) -> Option<XcpAddress> {
    if logical_offset >= layout.page_size {
        return None;
    }
    let base = *layout.page_base.get(active_page as usize)?;
    Some(XcpAddress::new(base + logical_offset, 0))
}

/// Look up a segment's configured page count by id, used to validate
/// SET_CAL_PAGE/COPY_CAL_PAGE page arguments against the session
/// configuration (spec.md §4.G table).
pub fn num_pages(config: &SessionConfig, segment_id: u8) -> Option<u8> {
    config
        .segments
        .iter()
        .find(|s| s.segment_id == segment_id)
        .map(|s| s.num_pages)
}
