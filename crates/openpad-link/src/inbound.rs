//! Inbound channel: the self-rearming read loop on the interrupt-in endpoint.
//!
//! There is no polling task. Each completed read decodes the report,
//! publishes the new state and, while the link is active, resubmits the same
//! request with the same buffer. A non-success status or an inactive link
//! ends the loop and parks the buffer for teardown.
//!
//! Lock order is slot, then anchor. A buffer is always back in the slot (or
//! freed) before its anchor entry is released.

use crate::anchor::TransferKind;
use crate::link::LinkCore;
use crate::sink::{InputSink, SinkDevice, map_state};
use hid_8bitdo_protocol::{ControlState, Decoded, INPUT_REPORT_LEN, decode};
use openpad_usb_common::{
    Completion, DmaBuffer, SubmitError, Transfer, TransferId, TransferRequest, TransportError,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Default)]
struct InboundSlot {
    request: Option<TransferRequest>,
    /// `None` while the read is in flight.
    buffer: Option<DmaBuffer>,
    /// Set once teardown has taken the slot's resources. A buffer that comes
    /// back after this goes straight to the transport.
    retired: bool,
}

pub(crate) struct InboundChannel {
    core: Arc<LinkCore>,
    device: SinkDevice,
    slot: Mutex<InboundSlot>,
    state: RwLock<ControlState>,
    heartbeat: AtomicBool,
    sink: RwLock<Option<Arc<dyn InputSink>>>,
}

impl InboundChannel {
    pub(crate) fn new(core: Arc<LinkCore>, device: SinkDevice) -> Arc<Self> {
        Arc::new(Self {
            core,
            device,
            slot: Mutex::new(InboundSlot::default()),
            state: RwLock::new(ControlState::default()),
            heartbeat: AtomicBool::new(false),
            sink: RwLock::new(None),
        })
    }

    pub(crate) fn install_buffer(&self, buffer: DmaBuffer) {
        self.slot.lock().buffer = Some(buffer);
    }

    pub(crate) fn install_request(&self, request: TransferRequest) {
        self.slot.lock().request = Some(request);
    }

    pub(crate) fn release_resources(&self) -> (Option<TransferRequest>, Option<DmaBuffer>) {
        let mut slot = self.slot.lock();
        slot.retired = true;
        (slot.request.take(), slot.buffer.take())
    }

    /// Returns once no completion handler is between its activity check and
    /// its resubmit.
    pub(crate) fn quiesce(&self) {
        let _slot = self.slot.lock();
    }

    pub(crate) fn attach_sink(&self, sink: Arc<dyn InputSink>) {
        *self.sink.write() = Some(sink);
    }

    /// Waits for a frame that is being reported to finish.
    pub(crate) fn detach_sink(&self) -> Option<Arc<dyn InputSink>> {
        self.sink.write().take()
    }

    pub(crate) fn state(&self) -> ControlState {
        *self.state.read()
    }

    /// Submit the first read.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        let mut slot = self.slot.lock();
        let Some(request) = slot.request else {
            return Err(TransportError::Rejected("read slot not allocated".to_string()));
        };
        let Some(buffer) = slot.buffer.take() else {
            return Err(TransportError::Rejected("read buffer not allocated".to_string()));
        };
        self.submit_locked(&mut slot, request, buffer)
    }

    /// Anchor and submit. On refusal the buffer is back in the slot before
    /// the anchor entry goes.
    fn submit_locked(
        self: &Arc<Self>,
        slot: &mut InboundSlot,
        request: TransferRequest,
        buffer: DmaBuffer,
    ) -> Result<(), TransportError> {
        let id = request.id();
        let length = buffer.len();
        self.core.anchor.anchor(id, TransferKind::Inbound);
        let channel = Arc::clone(self);
        let transfer = Transfer::new(request, buffer, length, move |completion| {
            channel.on_complete(completion);
        });
        match self.core.transport.submit(transfer) {
            Ok(()) => Ok(()),
            Err(SubmitError { error, buffer }) => {
                slot.buffer = Some(buffer);
                self.core.anchor.release(id);
                Err(error)
            }
        }
    }

    /// Settle the buffer of a finished read, then release its anchor entry.
    ///
    /// Teardown frees the slot only after the anchor is empty, so the buffer
    /// must be parked first.
    fn settle_locked(&self, slot: &mut InboundSlot, id: TransferId, buffer: DmaBuffer) {
        if slot.retired {
            self.core.anchor.release(id);
            self.core.transport.free_buffer(buffer);
            return;
        }
        slot.buffer = Some(buffer);
        self.core.anchor.release(id);
    }

    fn on_complete(self: &Arc<Self>, completion: Completion) {
        let Completion {
            request,
            status,
            buffer,
            actual_length,
        } = completion;

        // Teardown already synthesized this completion.
        let late = !self.core.anchor.contains(request);
        if late {
            debug!(request = %request, ?status, "late inbound completion");
        } else {
            self.core.counters.inc_inbound_completion();
            if status.is_success() {
                trace!(request = %request, actual_length, "inbound report");
                self.process(&buffer);
            } else {
                self.core.counters.inc_inbound_error();
                debug!(request = %request, ?status, "read loop ended");
            }
        }

        let mut slot = self.slot.lock();
        let rearm = !late && status.is_success() && !slot.retired && self.core.is_active();
        let next = slot.request.filter(|_| rearm);
        let Some(next) = next else {
            self.settle_locked(&mut slot, request, buffer);
            return;
        };
        // The anchor entry is kept across the resubmit so the anchor never
        // looks drained while the read loop is still running.
        if let Err(error) = self.submit_locked(&mut slot, next, buffer) {
            warn!(request = %next.id(), %error, "read resubmit rejected, read loop ended");
        }
    }

    fn process(&self, data: &[u8]) {
        let mut packet = [0u8; INPUT_REPORT_LEN];
        let len = data.len().min(INPUT_REPORT_LEN);
        if let (Some(dst), Some(src)) = (packet.get_mut(..len), data.get(..len)) {
            dst.copy_from_slice(src);
        }

        let previous = self.state();
        match decode(&packet, &previous) {
            Decoded::State(state) => {
                *self.state.write() = state;
                self.core.counters.inc_report_decoded();
                // The read guard is held across the report so teardown cannot
                // unregister the device mid-frame.
                if let Some(sink) = self.sink.read().as_ref() {
                    sink.report(&self.device, &map_state(&state));
                }
                self.track_heartbeat(state.heartbeat);
            }
            Decoded::NotApplicable => {
                self.core.counters.inc_report_ignored();
                trace!(tag = packet[0], "report ignored");
            }
        }
    }

    /// Log on the rising edge only.
    fn track_heartbeat(&self, level: bool) {
        let was = self.heartbeat.swap(level, Ordering::Relaxed);
        if level && !was && self.core.config.heartbeat_logging {
            info!(device = %self.device.phys, "heartbeat chord pressed");
        }
    }
}
