//! CAN ISR bridge (spec.md §4.E, component E).
//!
//! Called directly from the integrator's RX and TX-complete interrupt
//! handlers (spec.md §5 contexts 1 and 2) — every function here must be
//! safe to run with interrupts partially disabled and must not block.
//! Classification and arbitration are pure functions over session state
//! and the channel rings; the only side effects are ring operations and
//! the final `CanDriver::transmit` call.

use crate::can::{CanDriver, CanFrame, CanId, MsgObjId};
use crate::limits::{MAX_DAQ_LISTS, RING_SLOTS_PER_CHANNEL};
use crate::pid::transport_cmd::PID_CMD_LAST;
use crate::ring::Ring;
use crate::session::{DaqListMode, Session};

pub type ChannelRing = Ring<RING_SLOTS_PER_CHANNEL>;

/// Channel identity used by [`classify_rx`] / [`pick_tx_ready`]. Mirrors
/// the fixed channel order of spec.md §3 ("Channel").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Cmd,
    Event,
    Res,
    Daq(usize),
}

/// The four fixed-role rings plus one DAQ/STIM ring per configured list,
/// owned by the integrator alongside each [`Session`].
pub struct SessionChannels {
    pub cmd: ChannelRing,
    pub event: ChannelRing,
    pub res: ChannelRing,
    pub daq: [ChannelRing; MAX_DAQ_LISTS],
}

impl SessionChannels {
    pub const fn new() -> Self {
        const R: ChannelRing = ChannelRing::new();
        SessionChannels { cmd: ChannelRing::new(), event: ChannelRing::new(), res: ChannelRing::new(), daq: [R; MAX_DAQ_LISTS] }
    }

    fn ring(&self, kind: ChannelKind) -> &ChannelRing {
        match kind {
            ChannelKind::Cmd => &self.cmd,
            ChannelKind::Event => &self.event,
            ChannelKind::Res => &self.res,
            ChannelKind::Daq(i) => &self.daq[i],
        }
    }
}

impl Default for SessionChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// Effective msg-id fallback chain shared by RX classification (for STIM
/// channels) and TX arbitration (for the RES default), spec.md §4.E.
fn effective_stim_msg_id(session: &Session, list_index: usize, _invalid_msgid: u32) -> u32 {
    let list = &session.daq_lists[list_index];
    list.runtime_msg_id.unwrap_or(session.cmd_msg_id)
}

fn effective_tx_msg_id(session: &Session, list_index: Option<usize>, _invalid_msgid: u32) -> u32 {
    match list_index {
        None => session.res_msg_id,
        Some(i) => session.daq_lists[i].runtime_msg_id.unwrap_or(session.res_msg_id),
    }
}

/// Sentinel CAN id meaning "this DAQ list has no statically configured
/// msg-id", per spec.md §4.E rule 3.
pub const INVALID_MSGID: u32 = u32::MAX;

/// Classify one received frame into `(session_index, channel)` following
/// spec.md §4.E's ordered rules, and enqueue it. Returns `true` if the
/// frame was accepted by some session's channel.
pub fn on_rx_frame(sessions: &[Session], channels: &mut [SessionChannels], frame: &CanFrame) -> bool {
    let msg_id = frame.id.raw();
    let dlc = frame.data.len();

    for (session_index, session) in sessions.iter().enumerate() {
        // Rule 1: broadcast GET_SLAVE_ID reaches CMD even while disconnected.
        if msg_id == session.broadcast_msg_id
            && frame.data[0] == crate::pid::CommandPid::TransportLayerCmd as u8
            && frame.data.get(1) == Some(&crate::pid::transport_cmd::GET_SLAVE_ID)
        {
            return enqueue_rx(&mut channels[session_index].cmd, &frame.data[..dlc]);
        }

        // Rule 2: any command-range byte on the session's CMD id.
        if frame.data[0] >= PID_CMD_LAST && msg_id == session.cmd_msg_id {
            return enqueue_rx(&mut channels[session_index].cmd, &frame.data[..dlc]);
        }

        // Rule 3: STIM-capable DAQ channels.
        for (list_index, list) in session.daq_lists.iter().enumerate() {
            if !(list.mode.contains(DaqListMode::RUNNING) && list.mode.contains(DaqListMode::DIRECTION)) {
                continue;
            }
            let effective = effective_stim_msg_id(session, list_index, INVALID_MSGID);
            if effective != msg_id {
                continue;
            }
            let pid_in_range = (frame.data[0] as i32 - list.first_pid as i32) < list.num_odt() as i32
                && frame.data[0] >= list.first_pid;
            if pid_in_range || list.mode.contains(DaqListMode::PIDOFF) {
                return enqueue_rx(&mut channels[session_index].daq[list_index], &frame.data[..dlc]);
            }
        }
    }
    // Rule 4: no session claimed it.
    false
}

fn enqueue_rx(ring: &mut ChannelRing, payload: &[u8]) -> bool {
    match ring.claim() {
        Some(idx) => {
            ring.write(idx, payload);
            ring.publish(idx);
            true
        }
        None => false, // FREE slot unavailable: drop silently (spec.md §4.E).
    }
}

/// Scan for the highest-priority TX-ready channel bound to `mobj` across
/// every session, per spec.md §4.E TX arbitration (lowest effective msg-id
/// wins). Returns the session/channel to drain, if any.
pub fn pick_tx_ready(
    sessions: &[Session],
    channels: &[SessionChannels],
    candidates: &[(usize, ChannelKind, u32)],
) -> Option<(usize, ChannelKind)> {
    let mut best: Option<(usize, ChannelKind, u32)> = None;
    for &(session_index, kind, bound_msg_obj_hint) in candidates {
        let _ = bound_msg_obj_hint;
        let ring = channels[session_index].ring(kind);
        if ring.peek_ready().is_none() {
            continue;
        }
        let list_index = match kind {
            ChannelKind::Daq(i) => Some(i),
            _ => None,
        };
        let msg_id = effective_tx_msg_id(&sessions[session_index], list_index, INVALID_MSGID);
        let better = match &best {
            None => true,
            Some((_, _, cur)) => msg_id < *cur,
        };
        if better {
            best = Some((session_index, kind, msg_id));
        }
    }
    best.map(|(s, k, _)| (s, k))
}

/// Hand the winning channel's ready slot to the CAN driver, marking it in
/// flight. Called once arbitration has picked a winner.
pub fn dispatch_tx<D: CanDriver>(
    channels: &SessionChannels,
    kind: ChannelKind,
    driver: &D,
    mobj: MsgObjId,
    msg_id: CanId,
) -> bool {
    let ring = channels.ring(kind);
    let Some((idx, _len)) = ring.peek_ready() else { return false };
    let mut payload = [0u8; crate::limits::CAN_PAYLOAD_LEN];
    let len = ring.take_in_flight(idx, &mut payload);
    let frame = CanFrame::new(msg_id, payload);
    if driver.transmit(mobj, &frame) {
        true
    } else {
        let _ = len;
        ring.requeue_in_flight(idx);
        false
    }
}

/// Called from the TX-complete ISR once the driver confirms transmission,
/// to free the slot and advance the consumer cursor.
pub fn on_tx_complete(channels: &SessionChannels, kind: ChannelKind) {
    let ring = channels.ring(kind);
    ring.release_in_flight(ring.tail_index());
}
