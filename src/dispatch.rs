//! Command dispatcher (spec.md §4.F, component F).
//!
//! Ticked periodically by the integrator (bounded by the master's
//! `MIN_ST`, spec.md §5 context 3). Each tick, for each session: peek the
//! CMD channel, peek a RES slot, decode the PID, route to a handler in
//! [`crate::commands`], and commit according to the handler's
//! [`DispatchResult`] bitmask.

use bitflags::bitflags;

use crate::app::ApplicationCallbacks;
use crate::session::Session;

bitflags! {
    /// What the dispatcher should commit after a handler call (spec.md §4.F
    /// point 4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DispatchResult: u8 {
        const RX_READY = 0x01;
        const TX_READY = 0x02;
    }
}

/// Sentinel `prev_cmd` value meaning "this is a re-invocation of the
/// command already in progress", distinct from any real PID byte range
/// used on the wire (spec.md §4.F point 3).
pub const CURR_CMD: u16 = 0x100;

/// Outcome of one dispatcher tick for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do: no CMD frame pending.
    Idle,
    /// A command was fully processed (response committed, RX popped).
    Completed,
    /// A command committed a response but wants to run again next tick
    /// (block-mode UPLOAD).
    MoreToSend,
    /// A command consumed input but produced no response this tick
    /// (block-mode DOWNLOAD accepting a segment).
    MoreToReceive,
    /// A command is awaiting an asynchronous application result.
    Pending,
    /// A RES slot was not available; nothing was dequeued this tick
    /// (backpressure, spec.md §4.F point 2).
    Backpressure,
}

/// Drive one dispatcher tick for a single session.
///
/// `rx` is the pending CMD frame (if any) and its length; `tx` is the
/// caller-owned response scratch buffer, at least `session.config.max_cto_len`
/// bytes. Returns the outcome and, when a response was produced, its
/// length. Connection gating (spec.md §4.F: "while disconnected, only
/// CONNECT is dispatched") is enforced here before the command reaches
/// [`crate::commands::dispatch_command`].
pub fn tick<A: ApplicationCallbacks>(
    session: &mut Session,
    app: &mut A,
    rx: Option<&[u8]>,
    res_slot_available: bool,
    tx: &mut [u8],
) -> (TickOutcome, usize) {
    let Some(rx) = rx else {
        return (TickOutcome::Idle, 0);
    };
    if rx.is_empty() {
        return (TickOutcome::Idle, 0);
    }
    if !res_slot_available {
        return (TickOutcome::Backpressure, 0);
    }

    let pid = rx[0];
    let is_resume = session.continuation_active && session.last_cmd == Some(pid);

    if !session.is_connected() && pid != crate::pid::CommandPid::Connect as u8 {
        // Dropped without response (spec.md §4.F connection gate).
        return (TickOutcome::Completed, 0);
    }

    let prev_cmd = if is_resume { CURR_CMD } else { 0 };

    let (result, len) = crate::commands::dispatch_command(session, app, rx, tx, prev_cmd);

    if result.is_empty() {
        session.pending_ticks = session.pending_ticks.saturating_add(1);
        session.last_cmd = Some(pid);
        if session.pending_ticks >= CMD_PENDING_TIMEOUT_TICKS && !session.pending_notified {
            session.pending_notified = true;
        }
        return (TickOutcome::Pending, 0);
    }

    session.pending_ticks = 0;
    session.pending_notified = false;
    let rx_ready = result.contains(DispatchResult::RX_READY);
    let tx_ready = result.contains(DispatchResult::TX_READY);
    session.last_cmd = Some(pid);
    session.continuation_active = !rx_ready && tx_ready;
    match (rx_ready, tx_ready) {
        (true, true) => (TickOutcome::Completed, len),
        (false, true) => (TickOutcome::MoreToSend, len),
        (true, false) => (TickOutcome::MoreToReceive, 0),
        (false, false) => (TickOutcome::Pending, 0),
    }
}

/// Timeout, in dispatcher ticks, before an `EV_CMD_PENDING` event is
/// emitted for a command stuck on the suspend path (spec.md §4.F).
pub const CMD_PENDING_TIMEOUT_TICKS: u16 = 50;
