//! Outbound channel: a single in-flight slot on the interrupt-out endpoint.
//!
//! Non-stop commands that arrive while the slot is busy are dropped. A stop
//! command that arrives while busy sets `stop_pending`, and the completion
//! handler sends exactly one stop as soon as the slot frees up, so the motors
//! are never left running because a stop lost the race for the slot.
//!
//! Encode, mark-busy and dispatch happen under one lock, as do busy-clear and
//! the stop resend. Two submitters can therefore never both see a free slot.
//! A completed buffer is back in the slot before its anchor entry is released,
//! so teardown never frees the slot ahead of it.

use crate::anchor::TransferKind;
use crate::link::LinkCore;
use hid_8bitdo_protocol::{EncodeError, OutputReport, RumbleCommand};
use openpad_usb_common::{
    Completion, DmaBuffer, SubmitError, Transfer, TransferRequest, TransportError,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Why a command was not dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The link is not active.
    Inactive,
    /// The slot's request or buffer has already been released.
    Unavailable,
    Encode(EncodeError),
    Transport(TransportError),
}

/// Result of offering a report to the outbound slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum SubmitOutcome {
    /// A transfer was dispatched.
    Accepted,
    /// A stop arrived while busy; it will be sent when the slot frees up.
    Coalesced,
    /// The slot was busy and the report was discarded.
    Dropped,
    Rejected(RejectReason),
}

#[derive(Debug, Default)]
struct OutboundSlot {
    request: Option<TransferRequest>,
    buffer: Option<DmaBuffer>,
    busy: bool,
    stop_pending: bool,
    /// Teardown has taken the slot's resources.
    retired: bool,
}

/// Snapshot of the slot flags, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotStatus {
    pub busy: bool,
    pub stop_pending: bool,
}

pub struct OutboundChannel {
    core: Arc<LinkCore>,
    slot: Mutex<OutboundSlot>,
}

impl OutboundChannel {
    pub(crate) fn new(core: Arc<LinkCore>) -> Arc<Self> {
        Arc::new(Self {
            core,
            slot: Mutex::new(OutboundSlot::default()),
        })
    }

    pub(crate) fn install_buffer(&self, buffer: DmaBuffer) {
        self.slot.lock().buffer = Some(buffer);
    }

    pub(crate) fn install_request(&self, request: TransferRequest) {
        self.slot.lock().request = Some(request);
    }

    /// Hand back whatever the slot still owns. An in-flight buffer is not
    /// here; it returns through the completion handler.
    pub(crate) fn release_resources(&self) -> (Option<TransferRequest>, Option<DmaBuffer>) {
        let mut slot = self.slot.lock();
        slot.busy = false;
        slot.stop_pending = false;
        slot.retired = true;
        (slot.request.take(), slot.buffer.take())
    }

    /// Returns once no caller is between its activity check and its dispatch.
    pub(crate) fn quiesce(&self) {
        let _slot = self.slot.lock();
    }

    pub fn status(&self) -> SlotStatus {
        let slot = self.slot.lock();
        SlotStatus {
            busy: slot.busy,
            stop_pending: slot.stop_pending,
        }
    }

    /// Offer a rumble command.
    pub fn submit(self: &Arc<Self>, command: RumbleCommand) -> SubmitOutcome {
        let mut slot = self.slot.lock();
        if !self.core.is_active() {
            self.core.counters.inc_outbound_rejected();
            return SubmitOutcome::Rejected(RejectReason::Inactive);
        }
        if slot.busy {
            if command.is_stop() {
                slot.stop_pending = true;
                self.core.counters.inc_outbound_coalesced();
                trace!("stop coalesced behind in-flight transfer");
                return SubmitOutcome::Coalesced;
            }
            self.core.counters.inc_outbound_dropped();
            trace!(weak = command.weak, strong = command.strong, "rumble dropped, slot busy");
            return SubmitOutcome::Dropped;
        }
        self.dispatch_locked(&mut slot, OutputReport::Rumble(command))
    }

    /// Send the announce report that makes the controller start streaming.
    ///
    /// Never coalesced: if the slot is busy the announce is dropped and the
    /// slot flags are left untouched.
    pub fn announce(self: &Arc<Self>) -> SubmitOutcome {
        let mut slot = self.slot.lock();
        if !self.core.is_active() {
            self.core.counters.inc_outbound_rejected();
            return SubmitOutcome::Rejected(RejectReason::Inactive);
        }
        if slot.busy {
            self.core.counters.inc_outbound_dropped();
            return SubmitOutcome::Dropped;
        }
        self.dispatch_locked(&mut slot, OutputReport::Announce)
    }

    fn dispatch_locked(
        self: &Arc<Self>,
        slot: &mut OutboundSlot,
        report: OutputReport,
    ) -> SubmitOutcome {
        let Some(request) = slot.request else {
            self.core.counters.inc_outbound_rejected();
            return SubmitOutcome::Rejected(RejectReason::Unavailable);
        };
        let Some(mut buffer) = slot.buffer.take() else {
            self.core.counters.inc_outbound_rejected();
            return SubmitOutcome::Rejected(RejectReason::Unavailable);
        };

        let length = match report.encode_into(&mut buffer) {
            Ok(length) => length,
            Err(err) => {
                slot.buffer = Some(buffer);
                self.core.counters.inc_outbound_rejected();
                return SubmitOutcome::Rejected(RejectReason::Encode(err));
            }
        };

        slot.busy = true;
        if report.is_stop() {
            slot.stop_pending = false;
        }

        let id = request.id();
        self.core.anchor.anchor(id, TransferKind::Outbound);
        let channel = Arc::clone(self);
        let transfer = Transfer::new(request, buffer, length, move |completion| {
            channel.on_complete(completion);
        });

        match self.core.transport.submit(transfer) {
            Ok(()) => {
                self.core.counters.inc_outbound_accepted();
                debug!(request = %id, ?report, "outbound transfer dispatched");
                SubmitOutcome::Accepted
            }
            Err(SubmitError { error, buffer }) => {
                slot.buffer = Some(buffer);
                slot.busy = false;
                self.core.anchor.release(id);
                self.core.counters.inc_outbound_rejected();
                warn!(request = %id, %error, "outbound dispatch rejected");
                SubmitOutcome::Rejected(RejectReason::Transport(error))
            }
        }
    }

    fn on_complete(self: &Arc<Self>, completion: Completion) {
        let Completion {
            request,
            status,
            buffer,
            ..
        } = completion;

        let mut slot = self.slot.lock();
        if slot.retired {
            self.core.anchor.release(request);
            debug!(request = %request, ?status, "late outbound completion");
            self.core.transport.free_buffer(buffer);
            return;
        }
        slot.busy = false;
        slot.buffer = Some(buffer);

        let resend = std::mem::take(&mut slot.stop_pending) && self.core.is_active();
        if !resend {
            if self.core.anchor.release(request) {
                debug!(request = %request, ?status, "outbound transfer complete");
            } else {
                // Teardown already gave up on this transfer.
                debug!(request = %request, ?status, "late outbound completion");
            }
            return;
        }

        // The resend re-anchors the same request, so the entry is kept.
        debug!(request = %request, ?status, "outbound transfer complete");
        self.core.counters.inc_stop_resend();
        match self.dispatch_locked(&mut slot, OutputReport::Rumble(RumbleCommand::STOP)) {
            SubmitOutcome::Accepted => trace!("coalesced stop resent"),
            outcome => {
                self.core.anchor.release(request);
                warn!(?outcome, "coalesced stop could not be resent");
            }
        }
    }
}

impl std::fmt::Debug for OutboundChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundChannel")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
