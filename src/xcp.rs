//! Top-level driver: owns every session, their channel rings, and the
//! glue between the dispatcher, the DAQ/STIM engines and the CAN bridge.
//!
//! This is the type an integrator instantiates once (typically inside a
//! `static_cell::StaticCell` rather than a `lazy_static! { static ref XCP:
//! Mutex<Xcp> = ... }` singleton, for a no_std-friendly single-assignment
//! cell) and calls into from four places: the CAN RX ISR, the CAN
//! TX-complete ISR, a periodic dispatcher tick, and the application's
//! DAQ/STIM event ticks (spec.md §5).

use heapless::Vec;

use crate::app::ApplicationCallbacks;
use crate::can::{CanDriver, CanFrame, CanId, MsgObjId};
use crate::can_bridge::{self, ChannelKind, SessionChannels};
use crate::config::SessionConfig;
use crate::daq_engine::{self, DaqOutcome, DtoSink};
use crate::dispatch::{self, TickOutcome};
use crate::error::XcpError;
use crate::limits::{MAX_CTO_LEN, MAX_DAQ_LISTS, MAX_SESSIONS};
use crate::session::Session;
use crate::stim_engine::{self, DtoSource, StimOutcome};
use crate::target::ClockSource;

/// Identity of the hardware message object each fixed channel and DAQ
/// list is bound to, assigned by the integrator at session-add time.
#[derive(Debug, Clone, Copy)]
pub struct ChannelBinding {
    pub event_mobj: MsgObjId,
    pub res_mobj: MsgObjId,
    pub daq_mobj: [MsgObjId; MAX_DAQ_LISTS],
}

/// The driver. Generic over the CAN driver and clock source the
/// integrator supplies (spec.md §1 "explicitly out of scope").
pub struct Xcp<D: CanDriver, C: ClockSource> {
    sessions: Vec<Session, MAX_SESSIONS>,
    channels: Vec<SessionChannels, MAX_SESSIONS>,
    bindings: Vec<ChannelBinding, MAX_SESSIONS>,
    driver: D,
    clock: C,
}

impl<D: CanDriver, C: ClockSource> Xcp<D, C> {
    pub fn new(driver: D, clock: C) -> Self {
        Xcp { sessions: Vec::new(), channels: Vec::new(), bindings: Vec::new(), driver, clock }
    }

    /// Register a new session, returning its index (spec.md §9: "state is
    /// disjoint per session; there is no cross-session sharing except the
    /// hardware TX-pending counter array").
    pub fn add_session(
        &mut self,
        config: SessionConfig,
        cmd_msg_id: u32,
        res_msg_id: u32,
        event_msg_id: u32,
        broadcast_msg_id: u32,
        binding: ChannelBinding,
    ) -> Result<usize, XcpError> {
        let mut session = Session::new(config);
        session.cmd_msg_id = cmd_msg_id;
        session.res_msg_id = res_msg_id;
        session.event_msg_id = event_msg_id;
        session.broadcast_msg_id = broadcast_msg_id;
        self.sessions.push(session).map_err(|_| XcpError::NoSessionSlot)?;
        let _ = self.channels.push(SessionChannels::new());
        let _ = self.bindings.push(binding);
        Ok(self.sessions.len() - 1)
    }

    pub fn session(&self, index: usize) -> Option<&Session> {
        self.sessions.get(index)
    }

    // ---- CAN RX ISR entry point ---------------------------------------

    /// Call from the CAN RX interrupt handler with the just-received
    /// frame. Non-blocking, safe to call with interrupts active for
    /// lower-priority sources (spec.md §5 context 1).
    pub fn on_can_rx(&mut self, frame: &CanFrame) {
        can_bridge::on_rx_frame(&self.sessions, &mut self.channels, frame);
    }

    // ---- CAN TX-complete ISR entry point -------------------------------

    /// Call from the CAN TX-complete interrupt handler for `mobj`.
    /// Arbitrates among every TX-ready channel bound to that mailbox and
    /// hands the winner to the driver (spec.md §4.E TX arbitration).
    pub fn on_can_tx_complete(&mut self, mobj: MsgObjId) {
        let mut candidates: Vec<(usize, ChannelKind, u32), { MAX_SESSIONS * (2 + MAX_DAQ_LISTS) }> = Vec::new();
        for (session_index, (session, binding)) in self.sessions.iter().zip(self.bindings.iter()).enumerate() {
            if binding.event_mobj.0 == mobj.0 {
                let _ = candidates.push((session_index, ChannelKind::Event, mobj.0 as u32));
            }
            if binding.res_mobj.0 == mobj.0 {
                let _ = candidates.push((session_index, ChannelKind::Res, mobj.0 as u32));
            }
            for list_index in 0..session.daq_lists.len() {
                if binding.daq_mobj[list_index].0 == mobj.0 {
                    let _ = candidates.push((session_index, ChannelKind::Daq(list_index), mobj.0 as u32));
                }
            }
        }

        let Some((session_index, kind)) = can_bridge::pick_tx_ready(&self.sessions, &self.channels, &candidates) else {
            return;
        };
        let msg_id = match kind {
            ChannelKind::Daq(i) => self.sessions[session_index].daq_lists[i].runtime_msg_id.unwrap_or(self.sessions[session_index].res_msg_id),
            _ => self.sessions[session_index].res_msg_id,
        };
        let _ = can_bridge::dispatch_tx(&self.channels[session_index], kind, &self.driver, mobj, CanId::Standard(msg_id as u16));
    }

    /// Free the in-flight slot once the driver confirms transmission on
    /// `mobj` for the channel that was last handed to it. Integrators that
    /// don't track which channel won arbitration can instead call
    /// [`Xcp::on_can_tx_complete`] again, which will simply find nothing
    /// ready if the previous transfer already drained its channel.
    pub fn ack_tx_complete(&mut self, session_index: usize, kind: ChannelKind) {
        if let Some(channels) = self.channels.get(session_index) {
            can_bridge::on_tx_complete(channels, kind);
        }
    }

    // ---- Periodic command dispatcher tick ------------------------------

    /// Drive one dispatcher tick across every session (spec.md §4.F,
    /// context 3: "periodic command-processor task").
    pub fn run_dispatcher_tick<A: ApplicationCallbacks>(&mut self, app: &mut A) {
        for (session, channels) in self.sessions.iter_mut().zip(self.channels.iter()) {
            let cmd_ring = &channels.cmd;
            let res_ring = &channels.res;

            let Some((rx_idx, _rx_len)) = cmd_ring.peek_ready() else { continue };
            let mut rx_buf = [0u8; MAX_CTO_LEN];
            let n = cmd_ring.copy_ready(rx_idx, &mut rx_buf);

            let res_slot = res_ring.claim();
            let res_available = res_slot.is_some();
            let mut tx_buf = [0u8; MAX_CTO_LEN];

            let (outcome, len) = dispatch::tick(session, app, Some(&rx_buf[..n]), res_available, &mut tx_buf);

            match outcome {
                TickOutcome::Completed => {
                    cmd_ring.pop_ready(rx_idx);
                    if let Some(slot) = res_slot {
                        res_ring.write(slot, &tx_buf[..len]);
                        res_ring.publish(slot);
                    }
                }
                TickOutcome::MoreToSend => {
                    if let Some(slot) = res_slot {
                        res_ring.write(slot, &tx_buf[..len]);
                        res_ring.publish(slot);
                    }
                    // RX slot intentionally left in place: the dispatcher
                    // re-invokes this same command next tick (block-mode
                    // UPLOAD, spec.md §4.F point 4).
                }
                TickOutcome::MoreToReceive => {
                    cmd_ring.pop_ready(rx_idx);
                }
                TickOutcome::Pending | TickOutcome::Idle | TickOutcome::Backpressure => {}
            }

            if session.take_pending_event() {
                if let Some(idx) = channels.event.claim() {
                    channels.event.write(idx, &[crate::pid::response::EVENT, crate::pid::event_code::EV_CMD_PENDING]);
                    channels.event.publish(idx);
                }
            }
        }
    }

    // ---- Application event ticks --------------------------------------

    /// Drive one DAQ pass for `event_id` across every session (spec.md
    /// §4.H, context 4).
    pub fn on_daq_event<A: ApplicationCallbacks>(&mut self, app: &mut A, event_id: u16) -> DaqOutcome {
        let mut total = DaqOutcome::empty();
        for (session, channels) in self.sessions.iter().zip(self.channels.iter()) {
            let mut sink = RingSink { channels };
            total |= daq_engine::run_event(session, app, &self.clock, event_id, &mut sink);
        }
        total
    }

    /// Drive one STIM pass for `event_id` across every session (spec.md
    /// §4.I, context 4).
    pub fn on_stim_event<A: ApplicationCallbacks>(&mut self, app: &mut A, event_id: u16) -> StimOutcome {
        let mut total = StimOutcome::empty();
        for (session, channels) in self.sessions.iter_mut().zip(self.channels.iter()) {
            let mut source = RingSource { channels };
            total |= stim_engine::run_event(session, app, event_id, &mut source);
        }
        total
    }
}

struct RingSink<'a> {
    channels: &'a SessionChannels,
}

impl<'a> DtoSink for RingSink<'a> {
    fn enqueue(&mut self, list_index: usize, _odt_index: usize, payload: &[u8]) -> bool {
        let ring = &self.channels.daq[list_index];
        match ring.claim() {
            Some(idx) => {
                ring.write(idx, payload);
                ring.publish(idx);
                true
            }
            None => false,
        }
    }
}

struct RingSource<'a> {
    channels: &'a SessionChannels,
}

impl<'a> DtoSource for RingSource<'a> {
    fn peek(&self, list_index: usize, depth: usize) -> Option<[u8; crate::limits::CAN_PAYLOAD_LEN]> {
        let ring = &self.channels.daq[list_index];
        let (idx, _len) = ring.peek_at(depth)?;
        let mut buf = [0u8; crate::limits::CAN_PAYLOAD_LEN];
        ring.copy_ready(idx, &mut buf);
        Some(buf)
    }

    fn pop(&mut self, list_index: usize) {
        let ring = &self.channels.daq[list_index];
        if let Some((idx, _)) = ring.peek_ready() {
            ring.pop_ready(idx);
        }
    }
}
